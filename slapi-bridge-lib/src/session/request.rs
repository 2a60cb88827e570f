use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{BridgeError, Result};

use super::Session;

impl Session {
    /// Reads the header block and, for methods that carry one, the
    /// line-oriented body. Both are terminated by a blank line; the body is
    /// rejoined with CRLF and ends with a double CRLF.
    pub(super) fn read_http_request(
        &mut self,
        method: &str,
    ) -> Result<(BTreeMap<String, String>, Vec<u8>)> {
        let mut headers = BTreeMap::new();
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                BridgeError::Protocol(format!("invalid header line (missing colon): {line}"))
            })?;
            let name = name.trim();
            // Light guard against a JSON body spilling into the header block.
            if name.is_empty() || matches!(name.chars().next(), Some('{' | '[' | '<' | '"')) {
                return Err(BridgeError::Protocol(format!("invalid header name: {name}")));
            }
            headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
        }

        let mut body = Vec::new();
        if matches!(method, "POST" | "PUT" | "PATCH") {
            let mut lines: Vec<String> = Vec::new();
            loop {
                let line = self.read_line()?;
                if line.is_empty() {
                    break;
                }
                lines.push(line);
            }
            if !lines.is_empty() {
                body = format!("{}\r\n\r\n", lines.join("\r\n")).into_bytes();
            }
        }

        debug!(
            method,
            headers = headers.len(),
            body_bytes = body.len(),
            "request read from host"
        );
        Ok((headers, body))
    }
}
