//! Shared test helpers: a scripted in-memory transport and a canned local
//! HTTP server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use slapi_bridge_lib::config::SerialSettings;
use slapi_bridge_lib::{BridgeError, Result, Transport};

/// Transport that replays a byte script and records everything the session
/// writes. When the script runs out, reads report a disconnect, which ends
/// the session loop.
pub struct ScriptedTransport {
    input: VecDeque<u8>,
    /// Script for `poll_byte`, i.e. what the peer sends while the bridge is
    /// mid-response (flow control). `None` entries model instants with
    /// nothing pending.
    flow: VecDeque<Option<u8>>,
    output: Arc<Mutex<Vec<u8>>>,
    reconfigured: Arc<Mutex<Vec<SerialSettings>>>,
}

impl ScriptedTransport {
    pub fn new(input: impl AsRef<[u8]>) -> (ScriptedTransport, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            input: input.as_ref().iter().copied().collect(),
            flow: VecDeque::new(),
            output: output.clone(),
            reconfigured: Arc::new(Mutex::new(Vec::new())),
        };
        (transport, output)
    }

    pub fn with_flow_script(mut self, script: &[Option<u8>]) -> ScriptedTransport {
        self.flow = script.iter().copied().collect();
        self
    }

    pub fn reconfigured(&self) -> Arc<Mutex<Vec<SerialSettings>>> {
        self.reconfigured.clone()
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.input.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => Err(BridgeError::Disconnected),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn poll_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.flow.pop_front().flatten())
    }

    fn reconfigure(&mut self, settings: &SerialSettings) -> Result<()> {
        self.reconfigured.lock().unwrap().push(*settings);
        Ok(())
    }
}

/// Runs a full scripted session and returns everything it wrote.
pub fn run_session(input: impl AsRef<[u8]>) -> Vec<u8> {
    let (transport, output) = ScriptedTransport::new(input);
    slapi_bridge_lib::Session::new(Box::new(transport))
        .run()
        .unwrap();
    let bytes = output.lock().unwrap().clone();
    bytes
}

/// Serves exactly one connection with a canned response and returns the full
/// request (headers plus any Content-Length body).
pub fn spawn_server(response: Vec<u8>) -> (u16, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut sock, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];

        let header_end = loop {
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = sock.read(&mut buf).unwrap();
            if n == 0 {
                break request.len();
            }
            request.extend_from_slice(&buf[..n]);
        };

        let content_length = String::from_utf8_lossy(&request[..header_end])
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.trim().eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);

        while request.len() < header_end + content_length {
            let n = sock.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        sock.write_all(&response).unwrap();
        request
    });

    (port, handle)
}

/// Builds a minimal HTTP response with a correct Content-Length.
pub fn http_response(status: &str, content_type: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}
