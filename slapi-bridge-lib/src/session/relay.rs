use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::jsonpath;

use super::stream::Upstream;
use super::{Session, EOT, SOH, STX};

const MAX_REDIRECTS: u32 = 5;
const RECV_CHUNK: usize = 4096;

impl Session {
    /// Relays one request upstream and frames the response back onto the
    /// local transport. Redirects recurse with the `Location` value standing
    /// in for the host; the original path is reused.
    pub(super) fn send_http(
        &mut self,
        method: &str,
        path: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
        redirected_host: Option<String>,
        redirects: u32,
    ) -> Result<()> {
        // Merge defaults under the per-request headers.
        let mut req_headers = self.state.default_headers.clone();
        for (name, value) in headers {
            req_headers.insert(name.clone(), value.clone());
        }

        let mut host = match redirected_host.or_else(|| headers.get("host").cloned()) {
            Some(host) => host,
            None => self
                .state
                .domain
                .clone()
                .ok_or_else(|| {
                    BridgeError::Protocol("DOMAIN not set and no Host header provided".into())
                })?,
        };

        // A scheme prefix on the host value picks TLS and the default port.
        let mut use_ssl = false;
        let mut port: u16 = 80;
        if let Some(rest) = host.strip_prefix("https://") {
            use_ssl = true;
            port = 443;
            host = rest.to_string();
        } else if let Some(rest) = host.strip_prefix("http://") {
            host = rest.to_string();
        }

        if let Some(forced) = self.state.use_ssl {
            use_ssl = forced;
            port = if forced { 443 } else { 80 };
        }

        if let Some(stripped) = host.strip_suffix('/') {
            host = stripped.to_string();
        }

        // An explicit port beats the scheme default.
        if let Some((name, p)) = host.rsplit_once(':') {
            if let Ok(explicit) = p.parse::<u16>() {
                host = name.to_string();
                port = explicit;
            }
        }

        let host_header = if use_ssl || port != 80 {
            format!("{host}:{port}")
        } else {
            host.clone()
        };
        req_headers.insert("host".into(), host_header);

        if !body.is_empty() {
            req_headers.insert("content-length".into(), body.len().to_string());
        }

        let mut upstream = self.connector.connect(&host, port, use_ssl)?;
        debug!(method, path, %host, port, tls = use_ssl, redirects, "sending request");

        let mut req = format!("{method} {path} HTTP/1.1\r\n");
        for (name, value) in &req_headers {
            req.push_str(name);
            req.push_str(": ");
            req.push_str(value);
            req.push_str("\r\n");
        }
        req.push_str("\r\n");
        upstream.write_all(req.as_bytes()).map_err(net_err)?;
        if !body.is_empty() {
            upstream.write_all(body).map_err(net_err)?;
        }
        upstream.flush().map_err(net_err)?;

        // The first recv only guarantees the status line; keep reading until
        // the blank line that ends the header block.
        let mut raw = Vec::new();
        let status_end = recv_until(&mut upstream, b"\r\n", &mut raw)?;
        let status_line = String::from_utf8_lossy(&raw[..status_end]).into_owned();
        debug!(status = %status_line, "status received");
        self.write_all(status_line.as_bytes())?;
        self.write_all(b"\r\n")?;

        let header_end = recv_until(&mut upstream, b"\r\n\r\n", &mut raw)?;
        let headers_start = status_end + 2;
        let resp_headers = if header_end > headers_start {
            raw[headers_start..header_end].to_vec()
        } else {
            Vec::new()
        };
        // Bytes already received past the header block start the body.
        let mut body_buf = raw[header_end + 4..].to_vec();

        let status_code = status_line.split(' ').nth(1).and_then(|s| s.parse::<u16>().ok());
        let mut content_length = 0usize;
        let mut content_type: Option<String> = None;
        let mut location: Option<String> = None;
        for line in resp_headers.split(|&b| b == b'\n') {
            let text = String::from_utf8_lossy(line);
            let text = text.trim_end_matches('\r');
            let lower = text.to_ascii_lowercase();
            if lower.starts_with("content-length") {
                content_length = text
                    .split_once(':')
                    .and_then(|(_, v)| v.trim().parse().ok())
                    .unwrap_or(0);
            } else if lower.starts_with("content-type") {
                content_type = text.split_once(':').map(|(_, v)| v.trim().to_string());
            } else if lower.starts_with("location") {
                location = text.split_once(':').map(|(_, v)| v.trim().to_string());
            }
        }

        if let (Some(code), Some(target)) = (status_code, location) {
            if matches!(code, 301 | 302 | 303 | 307 | 308) {
                if redirects >= MAX_REDIRECTS {
                    return Err(BridgeError::Network("Too many redirects".into()));
                }
                // Release the connection before chasing the redirect.
                drop(upstream);
                let new_method = if code == 303 { "GET" } else { method };
                let new_body = if new_method == "GET" { &[][..] } else { body };
                let mut merged = req_headers;
                if new_body.is_empty() {
                    // The reissued request carries no body; advertising the
                    // old length would leave the server waiting for bytes
                    // that never come.
                    merged.remove("content-length");
                }
                debug!(code, location = %target, "following redirect");
                return self.send_http(
                    new_method,
                    path,
                    &merged,
                    new_body,
                    Some(target),
                    redirects + 1,
                );
            }
        }

        if self.state.send_headers {
            self.write_all(&[SOH])?;
            let mut block = resp_headers;
            block.extend_from_slice(b"\r\n");
            self.write_all(&block)?;
        }

        // Drain the rest of the advertised body, then give the socket back.
        let mut remaining = content_length.saturating_sub(body_buf.len());
        let mut chunk = [0u8; RECV_CHUNK];
        while remaining > 0 {
            let n = upstream
                .read(&mut chunk[..remaining.min(RECV_CHUNK)])
                .map_err(net_err)?;
            if n == 0 {
                warn!(remaining, "upstream closed before the advertised content length");
                break;
            }
            body_buf.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        drop(upstream);

        if let Some(expr) = self.state.jsonpath.clone() {
            if content_type
                .as_deref()
                .is_some_and(|ct| ct.contains("application/json"))
            {
                body_buf = match serde_json::from_slice::<Value>(&body_buf) {
                    Ok(doc) => {
                        jsonpath::to_ascii_json(&jsonpath::apply(&doc, &expr)).into_bytes()
                    }
                    Err(e) => {
                        debug!(%e, "response body is not valid JSON, dropping it");
                        Vec::new()
                    }
                };
            }
        }

        self.write_all(&[STX])?;
        self.write_all(&body_buf)?;
        self.write_all(b"\r\n\r\n")?;
        self.write_all(&[EOT])?;
        debug!(body_bytes = body_buf.len(), "response framed");
        Ok(())
    }
}

fn net_err(e: std::io::Error) -> BridgeError {
    BridgeError::Network(format!("upstream I/O error: {e}"))
}

/// Appends to `buf` until `marker` appears; returns the marker's offset.
fn recv_until(stream: &mut Upstream, marker: &[u8], buf: &mut Vec<u8>) -> Result<usize> {
    let mut chunk = [0u8; RECV_CHUNK];
    loop {
        if let Some(pos) = find(buf, marker) {
            return Ok(pos);
        }
        let n = stream.read(&mut chunk).map_err(net_err)?;
        if n == 0 {
            return Err(BridgeError::Network(
                "connection closed while reading response".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find(buf: &[u8], marker: &[u8]) -> Option<usize> {
    buf.windows(marker.len()).position(|w| w == marker)
}
