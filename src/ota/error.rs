use core::fmt;

/// Terminal failure kinds for one update attempt.
///
/// Every variant ends the attempt; the orchestrator reports it and the device
/// keeps running the firmware it booted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// Version or firmware request answered with a non-200, non-zero status.
    StatusError(u16),
    /// Firmware request still had status 0 after the single retry.
    RequestError,
    /// Server reported a zero-byte firmware payload.
    EmptySize,
    /// Storage could not reserve room for the image.
    InsufficientStorage { requested: usize },
    /// Too many consecutive empty reads mid-stream.
    StallTimeout { bytes_written: usize, expected_size: usize },
    /// Loop exited short of the declared size, or finalize rejected the image.
    SizeMismatch { bytes_written: usize, expected_size: usize },
    /// Transport refused the target resource (still tearing down the last session).
    TargetSetupError,
    /// Storage rejected a chunk.
    WriteFailed { offset: usize },
}

impl OtaError {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtaError::StatusError(_) => "STATUS_ERROR",
            OtaError::RequestError => "REQUEST_ERROR",
            OtaError::EmptySize => "EMPTY_SIZE",
            OtaError::InsufficientStorage { .. } => "INSUFFICIENT_STORAGE",
            OtaError::StallTimeout { .. } => "STALL_TIMEOUT",
            OtaError::SizeMismatch { .. } => "SIZE_MISMATCH",
            OtaError::TargetSetupError => "TARGET_SETUP_ERROR",
            OtaError::WriteFailed { .. } => "WRITE_FAILED",
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::StatusError(code) => write!(f, "{}: HTTP code {}", self.as_str(), code),
            OtaError::RequestError => write!(f, "{}: no response after retry", self.as_str()),
            OtaError::EmptySize => write!(f, "{}: firmware size is 0 bytes", self.as_str()),
            OtaError::InsufficientStorage { requested } => {
                write!(f, "{}: cannot reserve {} bytes", self.as_str(), requested)
            }
            OtaError::StallTimeout { bytes_written, expected_size } => write!(
                f,
                "{}: timeout waiting for data at {} / {} bytes",
                self.as_str(),
                bytes_written,
                expected_size
            ),
            OtaError::SizeMismatch { bytes_written, expected_size } => write!(
                f,
                "{}: total read {} / {} bytes",
                self.as_str(),
                bytes_written,
                expected_size
            ),
            OtaError::TargetSetupError => {
                write!(f, "{}: failed to set target URL (modem busy?)", self.as_str())
            }
            OtaError::WriteFailed { offset } => {
                write!(f, "{}: storage rejected chunk at offset {}", self.as_str(), offset)
            }
        }
    }
}

impl std::error::Error for OtaError {}
