// Decides from the remote version marker whether the running build is stale

use super::error::OtaError;
use super::transport::TransportClient;

/// Read size for the small version payload.
const VERSION_READ_CHUNK: usize = 128;

/// Larger bodies are not a version marker and are never buffered.
pub const VERSION_MAX_LEN: usize = 256;

/// Whitespace-trimmed version token. Compared byte-exact, never ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion(String);

impl FirmwareVersion {
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDecision {
    UpdateNeeded(FirmwareVersion),
    UpToDate,
}

/// An empty remote token means nothing valid is published.
pub fn decide(remote_raw: &str, local: &str) -> VersionDecision {
    let remote = FirmwareVersion::parse(remote_raw);
    if !remote.is_empty() && remote.as_str() != local.trim() {
        VersionDecision::UpdateNeeded(remote)
    } else {
        VersionDecision::UpToDate
    }
}

pub struct VersionGate<'a> {
    local_version: &'a str,
    version_url: &'a str,
}

impl<'a> VersionGate<'a> {
    pub fn new(local_version: &'a str, version_url: &'a str) -> Self {
        Self { local_version, version_url }
    }

    /// Expects an open session. Issues exactly one request; no retry here.
    pub fn resolve_update_needed<T: TransportClient>(
        &self,
        transport: &mut T,
    ) -> Result<VersionDecision, OtaError> {
        if !transport.set_target(self.version_url) {
            return Err(OtaError::TargetSetupError);
        }

        let head = transport.request();
        if !head.is_ok() {
            log::warn!("Version check failed. Code: {}", head.status);
            return Err(OtaError::StatusError(head.status));
        }

        if head.content_size > VERSION_MAX_LEN {
            log::warn!(
                "Version body is {} bytes (max {}), skipping update",
                head.content_size,
                VERSION_MAX_LEN
            );
            return Ok(VersionDecision::UpToDate);
        }

        let body = read_body(transport, head.content_size);
        log::info!("Server: {} | Device: {}", body.trim(), self.local_version);
        Ok(decide(&body, self.local_version))
    }
}

/// Reads up to `content_size` bytes, stopping at the first empty read.
fn read_body<T: TransportClient>(transport: &mut T, content_size: usize) -> String {
    let content_size = content_size.min(VERSION_MAX_LEN);
    let mut body = Vec::with_capacity(content_size);
    let mut buf = [0u8; VERSION_READ_CHUNK];

    while body.len() < content_size {
        let want = (content_size - body.len()).min(buf.len());
        let n = transport.read_chunk(&mut buf[..want]).min(want);
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    String::from_utf8_lossy(&body).into_owned()
}
