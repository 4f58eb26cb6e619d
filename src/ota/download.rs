// Chunked firmware transfer: transport -> storage with bounded stall tolerance

use embedded_hal::delay::DelayNs;
use sha2::{Digest, Sha256};

use super::error::OtaError;
use super::flash::FlashWriter;
use super::policy::RetryPolicy;
use super::transport::TransportClient;

/// Largest single read requested from the transport.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Progress is reported each time this many more bytes have been written.
pub const PROGRESS_REPORT_INTERVAL: usize = 10 * 1024;

/// Outcome of feeding one read result into [`DownloadProgress::apply_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStep {
    Streaming,
    Stalled,
    Complete,
    Failed(OtaError),
}

/// Transfer state threaded through the streaming loop.
///
/// `bytes_written <= expected_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_written: usize,
    pub expected_size: usize,
    pub consecutive_stalls: u32,
    /// Total `read_chunk` calls, empty ones included.
    pub reads: u32,
    next_report_at: usize,
}

impl DownloadProgress {
    pub fn new(expected_size: usize) -> Self {
        Self {
            bytes_written: 0,
            expected_size,
            consecutive_stalls: 0,
            reads: 0,
            next_report_at: PROGRESS_REPORT_INTERVAL,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_written == self.expected_size
    }

    pub fn remaining(&self) -> usize {
        self.expected_size - self.bytes_written
    }

    pub fn percent(&self) -> u8 {
        if self.expected_size == 0 {
            return 0;
        }
        ((self.bytes_written as u64 * 100) / self.expected_size as u64) as u8
    }

    /// Account for one read that returned `n` bytes.
    pub fn apply_read(&mut self, n: usize, stall_limit: u32) -> StreamStep {
        self.reads += 1;

        if n > 0 {
            self.bytes_written += n.min(self.remaining());
            self.consecutive_stalls = 0;
            if self.is_complete() {
                StreamStep::Complete
            } else {
                StreamStep::Streaming
            }
        } else {
            self.consecutive_stalls += 1;
            if self.consecutive_stalls > stall_limit {
                StreamStep::Failed(OtaError::StallTimeout {
                    bytes_written: self.bytes_written,
                    expected_size: self.expected_size,
                })
            } else {
                StreamStep::Stalled
            }
        }
    }

    /// `Some(bytes_written)` once per crossed reporting boundary.
    pub fn take_report(&mut self) -> Option<usize> {
        if self.bytes_written < self.next_report_at {
            return None;
        }
        while self.next_report_at <= self.bytes_written {
            self.next_report_at += PROGRESS_REPORT_INTERVAL;
        }
        Some(self.bytes_written)
    }
}

/// A transfer that delivered exactly `expected_size` bytes into an open
/// storage span. The caller finalizes or aborts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub progress: DownloadProgress,
    /// SHA-256 of the streamed bytes, for the log only.
    pub sha256: [u8; 32],
}

pub struct DownloadEngine<'p> {
    policy: &'p RetryPolicy,
}

impl<'p> DownloadEngine<'p> {
    pub fn new(policy: &'p RetryPolicy) -> Self {
        Self { policy }
    }

    /// Expects an open session with the firmware target set. On error any
    /// storage span opened here has already been aborted.
    pub fn download<T, F, D>(
        &self,
        transport: &mut T,
        sink: &mut F,
        delay: &mut D,
    ) -> Result<CompletedDownload, OtaError>
    where
        T: TransportClient,
        F: FlashWriter,
        D: DelayNs,
    {
        let expected_size = self.request_size(transport, delay)?;
        log::info!("Firmware found! Size: {} bytes", expected_size);

        if !sink.begin(expected_size) {
            log::error!("Not enough space for {} byte image", expected_size);
            return Err(OtaError::InsufficientStorage { requested: expected_size });
        }

        let result = self.stream(transport, sink, delay, DownloadProgress::new(expected_size));
        if result.is_err() {
            sink.abort();
        }
        result
    }

    /// Status 0 earns `request_retry_count` more attempts; anything else is final.
    fn request_size<T: TransportClient, D: DelayNs>(
        &self,
        transport: &mut T,
        delay: &mut D,
    ) -> Result<usize, OtaError> {
        log::info!("Requesting firmware size...");
        let mut head = transport.request();
        let mut retries = 0;

        while head.is_transient() && retries < self.policy.request_retry_count {
            retries += 1;
            log::warn!(
                "Download warning: code 0. Retrying in {}ms...",
                self.policy.request_retry_delay_ms
            );
            delay.delay_ms(self.policy.request_retry_delay_ms);
            head = transport.request();
        }

        if head.is_transient() {
            return Err(OtaError::RequestError);
        }
        if !head.is_ok() {
            log::error!("Download request failed. HTTP code: {}", head.status);
            return Err(OtaError::StatusError(head.status));
        }
        if head.content_size == 0 {
            return Err(OtaError::EmptySize);
        }
        Ok(head.content_size)
    }

    /// Never asks for bytes past `expected_size`.
    pub fn stream<T, F, D>(
        &self,
        transport: &mut T,
        sink: &mut F,
        delay: &mut D,
        mut progress: DownloadProgress,
    ) -> Result<CompletedDownload, OtaError>
    where
        T: TransportClient,
        F: FlashWriter,
        D: DelayNs,
    {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let mut hasher = Sha256::new();

        while !progress.is_complete() {
            let want = progress.remaining().min(buf.len());
            let n = transport.read_chunk(&mut buf[..want]).min(want);

            if n > 0 {
                if !sink.write(&buf[..n]) {
                    return Err(OtaError::WriteFailed { offset: progress.bytes_written });
                }
                hasher.update(&buf[..n]);
            }

            match progress.apply_read(n, self.policy.stall_limit) {
                StreamStep::Streaming | StreamStep::Complete => {
                    if let Some(written) = progress.take_report() {
                        log::info!(
                            "Progress: {} / {} bytes ({}%)",
                            written,
                            progress.expected_size,
                            progress.percent()
                        );
                    }
                }
                StreamStep::Stalled => {
                    log::debug!(
                        "No data from modem ({}/{}), waiting",
                        progress.consecutive_stalls,
                        self.policy.stall_limit
                    );
                    delay.delay_ms(self.policy.stall_backoff_ms);
                }
                StreamStep::Failed(e) => {
                    log::error!("Timeout waiting for data");
                    return Err(e);
                }
            }
        }

        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&hasher.finalize());
        Ok(CompletedDownload { progress, sha256 })
    }
}

/// Lowercase hex rendering for digests in log lines.
pub fn hex(bytes: &[u8]) -> String {
    use core::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
