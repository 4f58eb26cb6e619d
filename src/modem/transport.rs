// TransportClient over the modem's built-in HTTP(S) stack (A7670 AT+HTTP* commands)

use std::time::Duration;

use super::at::{parse_http_action, parse_http_read_len, security_command, AtClient, SerialPort};
use crate::ota::{ResponseHead, SecuritySetting, TransportClient};

#[derive(Debug, Clone, Copy)]
pub struct ModemTimeouts {
    /// Plain commands answered with OK/ERROR.
    pub command: Duration,
    /// From `+HTTPACTION` until its result line; covers DNS, TLS and headers.
    pub action: Duration,
    /// One `+HTTPREAD` round trip.
    pub read: Duration,
}

impl Default for ModemTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(5),
            action: Duration::from_secs(60),
            read: Duration::from_secs(5),
        }
    }
}

pub struct ModemTransport<P> {
    at: AtClient<P>,
    timeouts: ModemTimeouts,
    /// Body bytes consumed from the current response.
    read_offset: usize,
    content_size: usize,
}

impl<P: SerialPort> ModemTransport<P> {
    pub fn new(at: AtClient<P>, timeouts: ModemTimeouts) -> Self {
        Self { at, timeouts, read_offset: 0, content_size: 0 }
    }

    /// Runs a command expecting OK; link errors count as failure.
    fn expect_ok(&mut self, cmd: &str) -> bool {
        match self.at.command(cmd, self.timeouts.command) {
            Ok(reply) if reply.is_ok() => true,
            Ok(reply) => {
                log::warn!("AT{} -> {:?}", cmd, reply.status);
                false
            }
            Err(e) => {
                log::warn!("AT{} failed: {:?}", cmd, e);
                false
            }
        }
    }

    fn try_request(&mut self) -> anyhow::Result<ResponseHead> {
        let reply = self.at.command("+HTTPACTION=0", self.timeouts.command)?;
        if !reply.is_ok() {
            log::warn!("HTTPACTION rejected: {:?}", reply.status);
            return Ok(ResponseHead::no_response());
        }

        let head = self
            .at
            .wait_for("+HTTPACTION:", self.timeouts.action)?
            .and_then(|payload| parse_http_action(&payload))
            .unwrap_or_else(ResponseHead::no_response);
        Ok(head)
    }

    fn try_read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let want = buf.len().min(self.content_size.saturating_sub(self.read_offset));
        if want == 0 {
            return Ok(0);
        }

        self.at.send(&format!("+HTTPREAD={},{}", self.read_offset, want))?;
        let announced = match self.at.wait_for("+HTTPREAD:", self.timeouts.read)? {
            Some(payload) => parse_http_read_len(&payload).unwrap_or(0),
            None => return Ok(0),
        };
        if announced == 0 {
            return Ok(0);
        }

        let take = announced.min(want);
        let got = self.at.read_raw(&mut buf[..take], self.timeouts.read)?;

        // Drop whatever of the announced payload was not kept, so none of it is
        // parsed as reply lines
        let mut scratch = [0u8; 64];
        let mut extra = announced - got;
        while extra > 0 {
            let n = self.at.read_raw(&mut scratch[..extra.min(64)], self.timeouts.read)?;
            if n == 0 {
                break;
            }
            extra -= n;
        }

        // Trailing "+HTTPREAD: 0" closes the chunk
        let _ = self.at.wait_for("+HTTPREAD:", self.timeouts.read)?;

        self.read_offset += got;
        Ok(got)
    }
}

impl<P: SerialPort> TransportClient for ModemTransport<P> {
    fn configure_security(&mut self, settings: &[SecuritySetting]) {
        for setting in settings {
            let cmd = security_command(setting);
            if !self.expect_ok(&cmd) {
                log::warn!("SSL setting not applied: {:?}", setting);
            }
        }
    }

    fn begin_session(&mut self) {
        self.read_offset = 0;
        self.content_size = 0;
        if !self.expect_ok("+HTTPINIT") {
            log::warn!("HTTPINIT failed, previous session may still be closing");
        }
    }

    fn end_session(&mut self) {
        let _ = self.expect_ok("+HTTPTERM");
    }

    fn set_target(&mut self, resource: &str) -> bool {
        self.expect_ok(&format!("+HTTPPARA=\"URL\",\"{}\"", resource))
    }

    fn request(&mut self) -> ResponseHead {
        let head = self.try_request().unwrap_or_else(|e| {
            log::warn!("HTTP request failed: {:?}", e);
            ResponseHead::no_response()
        });
        self.read_offset = 0;
        self.content_size = if head.is_ok() { head.content_size } else { 0 };
        head
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        self.try_read(buf).unwrap_or_else(|e| {
            log::warn!("HTTP read failed: {:?}", e);
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sim::ScriptedPort;

    fn quick() -> ModemTimeouts {
        let t = Duration::from_millis(30);
        ModemTimeouts { command: t, action: t, read: t }
    }

    #[test]
    fn request_reports_status_and_size() {
        let mut port = ScriptedPort::new();
        port.reply("AT+HTTPINIT", "\r\nOK\r\n");
        port.reply("AT+HTTPPARA=\"URL\",\"https://b/version.txt\"", "\r\nOK\r\n");
        port.reply("AT+HTTPACTION=0", "\r\nOK\r\n\r\n+HTTPACTION: 0,200,6\r\n");
        port.reply_bytes("AT+HTTPREAD=0,6", b"\r\nOK\r\n\r\n+HTTPREAD: 6\r\n2.0.0\n\r\n+HTTPREAD: 0\r\n");

        let mut transport = ModemTransport::new(AtClient::new(&mut port), quick());
        transport.begin_session();
        assert!(transport.set_target("https://b/version.txt"));
        assert_eq!(transport.request(), ResponseHead { status: 200, content_size: 6 });

        let mut buf = [0u8; 128];
        assert_eq!(transport.read_chunk(&mut buf), 6);
        assert_eq!(&buf[..6], b"2.0.0\n");
        // Nothing left of the declared size, so no further command is sent
        assert_eq!(transport.read_chunk(&mut buf), 0);
        drop(transport);

        assert_eq!(port.written().len(), 4);
    }

    #[test]
    fn missing_action_result_is_status_zero() {
        let mut port = ScriptedPort::new();
        port.reply("AT+HTTPACTION=0", "\r\nOK\r\n");

        let mut transport = ModemTransport::new(AtClient::new(&mut port), quick());
        assert_eq!(transport.request(), ResponseHead::no_response());
    }

    #[test]
    fn rejected_url_fails_target() {
        let mut port = ScriptedPort::new();
        port.reply("AT+HTTPPARA=\"URL\",\"https://b/fw.bin\"", "\r\nERROR\r\n");

        let mut transport = ModemTransport::new(AtClient::new(&mut port), quick());
        assert!(!transport.set_target("https://b/fw.bin"));
    }

    #[test]
    fn empty_read_is_a_stall() {
        let mut port = ScriptedPort::new();
        port.reply("AT+HTTPACTION=0", "\r\nOK\r\n\r\n+HTTPACTION: 0,200,100\r\n");
        port.reply("AT+HTTPREAD=0,64", "\r\nOK\r\n\r\n+HTTPREAD: 0\r\n");

        let mut transport = ModemTransport::new(AtClient::new(&mut port), quick());
        assert!(transport.request().is_ok());
        let mut buf = [0u8; 64];
        assert_eq!(transport.read_chunk(&mut buf), 0);
    }

    #[test]
    fn late_chunk_tail_is_not_parsed_as_replies() {
        let mut port = ScriptedPort::new();
        port.reply("AT+HTTPACTION=0", "\r\nOK\r\n\r\n+HTTPACTION: 0,200,12\r\n");
        // The body tail looks like an error reply and shows up after the read timeout
        port.reply_split(
            "AT+HTTPREAD=0,12",
            b"\r\nOK\r\n\r\n+HTTPREAD: 12\r\nabcd",
            Duration::from_millis(150),
            b"\nERROR\r\n\r\n+HTTPREAD: 0\r\n",
        );
        port.reply_bytes("AT+HTTPREAD=4,8", b"\r\nOK\r\n\r\n+HTTPREAD: 8\r\n\nERROR\r\n\r\n+HTTPREAD: 0\r\n");

        let t = Duration::from_millis(100);
        let timeouts = ModemTimeouts { command: t, action: t, read: t };
        let mut transport = ModemTransport::new(AtClient::new(&mut port), timeouts);
        assert!(transport.request().is_ok());

        let mut buf = [0u8; 12];
        assert_eq!(transport.read_chunk(&mut buf), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert_eq!(transport.read_chunk(&mut buf), 8);
        assert_eq!(&buf[..8], b"\nERROR\r\n");
        drop(transport);

        assert_eq!(port.written().last().map(String::as_str), Some("AT+HTTPREAD=4,8"));
    }

    #[test]
    fn security_settings_become_csslcfg_commands() {
        let mut port = ScriptedPort::new();
        port.reply("AT+CSSLCFG=\"sni\",0,1", "\r\nOK\r\n");

        let mut transport = ModemTransport::new(AtClient::new(&mut port), quick());
        transport.configure_security(&[SecuritySetting::Sni { context: 0, enabled: true }]);
        drop(transport);
        assert_eq!(port.written(), vec!["AT+CSSLCFG=\"sni\",0,1".to_string()]);
    }
}
