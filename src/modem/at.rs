// AT command channel to the cellular modem, plus parsers for the replies we use

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::ota::{ResponseHead, SecuritySetting};

/// Longest reply line kept; the rest of an overlong line is dropped.
pub const AT_LINE_MAX: usize = 256;

/// Upper bound for one blocking read on the serial port.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Byte transport to the modem (a UART on the device).
pub trait SerialPort {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Returns 0 when nothing arrived within `timeout`.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<P: SerialPort + ?Sized> SerialPort for &mut P {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        P::write_all(self, bytes)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        P::read_timeout(self, buf, timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtStatus {
    Ok,
    Error(String),
    Timeout,
}

/// Final status of a command plus the information lines before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtReply {
    pub status: AtStatus,
    pub lines: Vec<String>,
}

impl AtReply {
    pub fn is_ok(&self) -> bool {
        self.status == AtStatus::Ok
    }

    /// Payload of the first line starting with `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|l| l.strip_prefix(prefix))
            .map(str::trim)
    }
}

pub struct AtClient<P> {
    port: P,
    pending: VecDeque<u8>,
}

impl<P: SerialPort> AtClient<P> {
    pub fn new(port: P) -> Self {
        Self { port, pending: VecDeque::new() }
    }

    /// Sends `AT<cmd>\r\n`. An empty `cmd` is the bare `AT` probe.
    pub fn send(&mut self, cmd: &str) -> Result<()> {
        log::trace!(">> AT{}", cmd);
        self.port.write_all(b"AT")?;
        self.port.write_all(cmd.as_bytes())?;
        self.port.write_all(b"\r\n")
    }

    pub fn command(&mut self, cmd: &str, timeout: Duration) -> Result<AtReply> {
        self.send(cmd)?;
        self.wait_response(timeout)
    }

    /// Collects lines until `OK`, an error line, or the timeout.
    pub fn wait_response(&mut self, timeout: Duration) -> Result<AtReply> {
        let deadline = Instant::now() + timeout;
        let mut lines = Vec::new();

        while let Some(line) = self.read_line(deadline)? {
            if line == "OK" {
                return Ok(AtReply { status: AtStatus::Ok, lines });
            }
            if is_error_line(&line) {
                return Ok(AtReply { status: AtStatus::Error(line), lines });
            }
            lines.push(line);
        }

        Ok(AtReply { status: AtStatus::Timeout, lines })
    }

    /// Waits for an unsolicited line starting with `prefix` and returns what
    /// follows it. `None` on an error line or timeout.
    pub fn wait_for(&mut self, prefix: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;

        while let Some(line) = self.read_line(deadline)? {
            if let Some(payload) = line.strip_prefix(prefix) {
                return Ok(Some(payload.trim().to_string()));
            }
            if is_error_line(&line) {
                log::debug!("<< {} while waiting for {}", line, prefix);
                return Ok(None);
            }
        }

        Ok(None)
    }

    /// Next non-empty line without its terminator, or `None` at the deadline.
    pub fn read_line(&mut self, deadline: Instant) -> Result<Option<String>> {
        let mut line: heapless::Vec<u8, AT_LINE_MAX> = heapless::Vec::new();

        loop {
            while let Some(b) = self.pending.pop_front() {
                match b {
                    b'\n' => {
                        let text = String::from_utf8_lossy(&line).trim().to_string();
                        if !text.is_empty() {
                            log::trace!("<< {}", text);
                            return Ok(Some(text));
                        }
                        line.clear();
                    }
                    b'\r' => {}
                    _ => {
                        // Overlong lines are clipped
                        let _ = line.push(b);
                    }
                }
            }

            if !self.fill(deadline)? {
                // Put back a partial line so the next call can finish it
                for &b in line.iter().rev() {
                    self.pending.push_front(b);
                }
                return Ok(None);
            }
        }
    }

    /// Reads raw bytes (binary body data) until `buf` is full or the deadline.
    pub fn read_raw(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            while filled < buf.len() {
                match self.pending.pop_front() {
                    Some(b) => {
                        buf[filled] = b;
                        filled += 1;
                    }
                    None => break,
                }
            }
            if filled < buf.len() && !self.fill(deadline)? {
                break;
            }
        }

        Ok(filled)
    }

    /// Moves whatever the port has into `pending`. False once the deadline passed.
    fn fill(&mut self, deadline: Instant) -> Result<bool> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        let mut chunk = [0u8; 64];
        let wait = (deadline - now).min(POLL_INTERVAL);
        let n = self.port.read_timeout(&mut chunk, wait)?;
        self.pending.extend(&chunk[..n]);
        Ok(true)
    }
}

fn is_error_line(line: &str) -> bool {
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

/// Renders a security setting as its `+CSSLCFG` command.
pub fn security_command(setting: &SecuritySetting) -> String {
    match *setting {
        SecuritySetting::SslVersion { context, version } => {
            format!("+CSSLCFG=\"sslversion\",{},{}", context, version)
        }
        SecuritySetting::Sni { context, enabled } => {
            format!("+CSSLCFG=\"sni\",{},{}", context, u8::from(enabled))
        }
        SecuritySetting::IgnoreInvalidCert { context, enabled } => {
            format!("+CSSLCFG=\"ignoreinvalidcert\",{},{}", context, u8::from(enabled))
        }
        SecuritySetting::CipherSuite { context, mask } => {
            format!("+CSSLCFG=\"ciphersuite\",{},0x{:04X}", context, mask)
        }
    }
}

/// `+HTTPACTION: <method>,<status>,<datalen>` payload.
pub fn parse_http_action(payload: &str) -> Option<ResponseHead> {
    let mut fields = payload.split(',').map(str::trim);
    let _method = fields.next()?;
    let status = fields.next()?.parse().ok()?;
    let content_size = fields.next()?.parse().ok()?;
    Some(ResponseHead { status, content_size })
}

/// `+HTTPREAD: <len>` payload.
pub fn parse_http_read_len(payload: &str) -> Option<usize> {
    payload.trim().parse().ok()
}

/// `+CREG: <n>,<stat>` / `+CEREG: <n>,<stat>[,...]` payload; home or roaming.
pub fn parse_registered(payload: &str) -> bool {
    matches!(
        payload.split(',').nth(1).map(str::trim),
        Some("1") | Some("5")
    )
}
