mod command;
mod relay;
mod request;
mod stream;

use std::collections::BTreeMap;
use std::thread;

use tracing::{info, trace, warn};

use crate::error::{BridgeError, Result};
use crate::transport::Transport;
use stream::Connector;

pub(crate) const SOH: u8 = 0x01;
pub(crate) const STX: u8 = 0x02;
pub(crate) const EOT: u8 = 0x04;
pub(crate) const XON: u8 = 0x11;
pub(crate) const XOFF: u8 = 0x13;

const HTTP_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "TRACE", "CONNECT", "PATCH",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowControl {
    Off,
    XonXoff,
}

/// Session configuration mutated by SLAPI commands.
struct SessionState {
    domain: Option<String>,
    send_headers: bool,
    flow: FlowControl,
    default_headers: BTreeMap<String, String>,
    jsonpath: Option<String>,
    /// None = auto-detect from the scheme prefix on the host value
    use_ssl: Option<bool>,
    paused: bool,
}

impl Default for SessionState {
    fn default() -> SessionState {
        SessionState {
            domain: None,
            send_headers: true,
            flow: FlowControl::Off,
            default_headers: BTreeMap::new(),
            jsonpath: None,
            use_ssl: None,
            paused: false,
        }
    }
}

/// One SLAPI session: owns the local transport for the program's lifetime
/// and serves one request at a time.
pub struct Session {
    transport: Box<dyn Transport>,
    state: SessionState,
    connector: Connector,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>) -> Session {
        Session {
            transport,
            state: SessionState::default(),
            connector: Connector::new(),
        }
    }

    /// Runs the control loop until the local transport disconnects.
    pub fn run(&mut self) -> Result<()> {
        info!("slapi session started");
        self.write_all(b"SLAPI/1.0 READY\r\n")?;

        loop {
            self.transport.set_read_mode()?;
            let line = match self.read_line() {
                Ok(line) => line,
                Err(BridgeError::Disconnected) => {
                    info!("local transport disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(%e, "transport error while waiting for a request");
                    self.slapi_error(500, &e.to_string())?;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let verb = line.split(' ').next().unwrap_or_default();
            if HTTP_METHODS.contains(&verb) {
                match self.handle_request(&line) {
                    Ok(()) => {}
                    Err(BridgeError::Disconnected) => {
                        info!("local transport disconnected");
                        return Ok(());
                    }
                    Err(BridgeError::Protocol(msg)) => self.slapi_error(400, &msg)?,
                    Err(BridgeError::Network(msg)) => self.slapi_error(500, &msg)?,
                    Err(e) => {
                        warn!(%e, "request failed");
                        self.slapi_error(500, &e.to_string())?;
                    }
                }
            } else {
                self.handle_command(&line)?;
            }
        }
    }

    fn handle_request(&mut self, line: &str) -> Result<()> {
        let mut parts = line.splitn(3, ' ');
        let method = parts.next().unwrap_or_default().to_string();
        let path = match parts.next() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => {
                return Err(BridgeError::Protocol(format!(
                    "malformed request line: {line}"
                )));
            }
        };
        // A trailing HTTP version token is accepted but not used.

        let (headers, body) = self.read_http_request(&method)?;
        // Keep spurious VALID strobes off the bus while replying.
        self.transport.set_write_mode()?;
        self.send_http(&method, &path, &headers, &body, None, 0)
    }

    /// Reads one CRLF-terminated line, stripping the terminator. Flow
    /// control bytes are consumed here and never reach the returned line.
    fn read_line(&mut self) -> Result<String> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            if self.transport.read(&mut byte)? == 0 {
                continue;
            }
            let b = byte[0];

            if self.state.flow == FlowControl::XonXoff {
                match b {
                    XOFF => {
                        trace!("flow: XOFF");
                        self.state.paused = true;
                        continue;
                    }
                    XON => {
                        trace!("flow: XON");
                        self.state.paused = false;
                        continue;
                    }
                    _ => {}
                }
            }

            buf.push(b);
            if buf.ends_with(b"\r\n") {
                buf.truncate(buf.len() - 2);
                let line = String::from_utf8_lossy(&buf).into_owned();
                trace!(line = %redact(&line), "local line");
                return Ok(line);
            }
        }
    }

    /// Writes the whole chunk, stalling first while the peer holds the
    /// output paused via XOFF.
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.state.flow == FlowControl::XonXoff {
            self.scan_flow()?;
            while self.state.paused {
                match self.transport.poll_byte()? {
                    Some(XON) => {
                        trace!("flow: XON");
                        self.state.paused = false;
                    }
                    Some(XOFF) => {}
                    Some(other) => trace!(byte = other, "dropped byte while output is paused"),
                    None => thread::yield_now(),
                }
            }
        }

        let mut written = 0;
        while written < data.len() {
            written += self.transport.write(&data[written..])?;
        }
        Ok(())
    }

    /// Consumes any pending flow-control bytes without blocking.
    fn scan_flow(&mut self) -> Result<()> {
        while let Some(b) = self.transport.poll_byte()? {
            match b {
                XOFF => {
                    trace!("flow: XOFF");
                    self.state.paused = true;
                }
                XON => {
                    trace!("flow: XON");
                    self.state.paused = false;
                }
                other => trace!(byte = other, "unexpected byte during response emission"),
            }
        }
        Ok(())
    }

    fn ok_reply(&mut self) -> Result<()> {
        self.write_all(b"OK\r\n")
    }

    fn slapi_error(&mut self, code: u16, msg: &str) -> Result<()> {
        trace!(code, msg, "slapi error reply");
        self.write_all(format!("SLAPI/1.0 {code} {msg}\r\n").as_bytes())
    }
}

/// Masks bearer tokens in the wire trace; the real bytes still reach the
/// command dispatcher.
fn redact(line: &str) -> String {
    const PREFIX: &str = "HEADERS Authorization Bearer ";
    match line.strip_prefix(PREFIX) {
        Some(secret) => format!("{PREFIX}{}", "*".repeat(secret.len())),
        None => line.to_string(),
    }
}
