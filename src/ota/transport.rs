// Session-oriented HTTP(S) client as seen by the update core

/// Status reported when the transport got no response at all.
pub const STATUS_NO_RESPONSE: u16 = 0;
pub const STATUS_OK: u16 = 200;

/// Result of issuing a request: status code plus the declared content length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_size: usize,
}

impl ResponseHead {
    pub fn no_response() -> Self {
        Self { status: STATUS_NO_RESPONSE, content_size: 0 }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Status 0 is the only transient outcome.
    pub fn is_transient(&self) -> bool {
        self.status == STATUS_NO_RESPONSE
    }
}

/// Modem code for TLS 1.2 in `sslversion` settings.
pub const TLS_1_2: u8 = 3;

/// One named TLS configuration operation applied to an SSL context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritySetting {
    SslVersion { context: u8, version: u8 },
    Sni { context: u8, enabled: bool },
    IgnoreInvalidCert { context: u8, enabled: bool },
    CipherSuite { context: u8, mask: u16 },
}

impl SecuritySetting {
    pub fn context(&self) -> u8 {
        match *self {
            SecuritySetting::SslVersion { context, .. }
            | SecuritySetting::Sni { context, .. }
            | SecuritySetting::IgnoreInvalidCert { context, .. }
            | SecuritySetting::CipherSuite { context, .. } => context,
        }
    }
}

/// TLS 1.2 with SNI, no certificate validation and all cipher suites, for the
/// given contexts. Object storage endpoints reject handshakes without SNI.
pub fn sni_profile(contexts: &[u8]) -> Vec<SecuritySetting> {
    contexts
        .iter()
        .flat_map(|&context| {
            [
                SecuritySetting::SslVersion { context, version: TLS_1_2 },
                SecuritySetting::Sni { context, enabled: true },
                SecuritySetting::IgnoreInvalidCert { context, enabled: true },
                SecuritySetting::CipherSuite { context, mask: 0xFFFF },
            ]
        })
        .collect()
}

/// Session-oriented client over an unreliable link.
///
/// Implementations fold link-level errors into the contract: no response is
/// status 0, an unavailable body is a zero-length read.
pub trait TransportClient {
    /// Apply TLS settings. Called once before any request.
    fn configure_security(&mut self, settings: &[SecuritySetting]);

    fn begin_session(&mut self);

    /// The link may still be tearing the session down when this returns.
    fn end_session(&mut self);

    /// `false` when the client was not ready to accept a target.
    fn set_target(&mut self, resource: &str) -> bool;

    fn request(&mut self) -> ResponseHead;

    /// Read up to `buf.len()` body bytes. `0` means nothing available right now,
    /// not end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> usize;
}

impl<T: TransportClient + ?Sized> TransportClient for &mut T {
    fn configure_security(&mut self, settings: &[SecuritySetting]) {
        T::configure_security(self, settings)
    }

    fn begin_session(&mut self) {
        T::begin_session(self)
    }

    fn end_session(&mut self) {
        T::end_session(self)
    }

    fn set_target(&mut self, resource: &str) -> bool {
        T::set_target(self, resource)
    }

    fn request(&mut self) -> ResponseHead {
        T::request(self)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        T::read_chunk(self, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sni_profile_covers_each_context() {
        let settings = sni_profile(&[0, 1]);
        assert_eq!(settings.len(), 8);
        assert!(settings[..4].iter().all(|s| s.context() == 0));
        assert!(settings[4..].iter().all(|s| s.context() == 1));
        assert!(settings.contains(&SecuritySetting::Sni { context: 1, enabled: true }));
        assert!(settings.contains(&SecuritySetting::SslVersion { context: 0, version: TLS_1_2 }));
    }

    #[test]
    fn only_status_zero_is_transient() {
        assert!(ResponseHead::no_response().is_transient());
        assert!(!ResponseHead { status: 503, content_size: 0 }.is_transient());
        assert!(ResponseHead { status: 200, content_size: 5 }.is_ok());
    }
}
