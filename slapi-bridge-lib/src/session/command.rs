use crate::config::{Parity, SerialSettings};
use crate::error::Result;

use super::{FlowControl, Session};

impl Session {
    /// Dispatches one SLAPI configuration command. Every command either
    /// completes and replies `OK`/a listing, or fails before mutating any
    /// state.
    pub(super) fn handle_command(&mut self, line: &str) -> Result<()> {
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, Some(rest.trim())),
            None => (line, None),
        };

        match cmd {
            "DOMAIN" => match rest.filter(|host| !host.is_empty()) {
                Some(host) => {
                    self.state.domain = Some(host.to_string());
                    self.ok_reply()
                }
                None => self.slapi_error(400, "DOMAIN requires an argument"),
            },
            "RESPONSE" => self.handle_response(rest),
            "FLOW" => match rest {
                Some("OFF") => {
                    self.state.flow = FlowControl::Off;
                    self.ok_reply()
                }
                Some("X") => {
                    self.state.flow = FlowControl::XonXoff;
                    self.ok_reply()
                }
                _ => self.slapi_error(400, "FLOW mode must be OFF or X"),
            },
            "SERIAL" => match rest.and_then(parse_serial_spec) {
                Some(settings) => match self.transport.reconfigure(&settings) {
                    Ok(()) => self.ok_reply(),
                    Err(e) => self.slapi_error(500, &e.to_string()),
                },
                None => self.slapi_error(400, "SERIAL requires baud,bits,parity,stop"),
            },
            "HEADERS" => self.handle_headers(rest),
            "HTTPS" => {
                self.state.use_ssl = Some(true);
                self.ok_reply()
            }
            "HTTP" => {
                self.state.use_ssl = Some(false);
                self.ok_reply()
            }
            _ => self.slapi_error(400, "Unknown command"),
        }
    }

    fn handle_response(&mut self, rest: Option<&str>) -> Result<()> {
        let Some(rest) = rest else {
            return self.slapi_error(400, "RESPONSE requires an argument");
        };

        let (sub, arg) = match rest.split_once(' ') {
            Some((sub, arg)) => (sub, Some(arg.trim())),
            None => (rest, None),
        };

        match sub {
            "HDRS_ON" => {
                self.state.send_headers = true;
                self.ok_reply()
            }
            "HDRS_OFF" => {
                self.state.send_headers = false;
                self.ok_reply()
            }
            "JSONPATH" => {
                // Without an expression the filter is cleared.
                self.state.jsonpath = arg.filter(|a| !a.is_empty()).map(str::to_string);
                self.ok_reply()
            }
            _ => self.slapi_error(400, "Unknown RESPONSE subcommand"),
        }
    }

    fn handle_headers(&mut self, rest: Option<&str>) -> Result<()> {
        let Some(rest) = rest.filter(|r| !r.is_empty()) else {
            // No arguments: list the current defaults.
            if self.state.default_headers.is_empty() {
                return self.write_all(b"(no default headers)\r\n");
            }
            let listing: String = self
                .state
                .default_headers
                .iter()
                .map(|(name, value)| format!("{name}: {value}\r\n"))
                .collect();
            return self.write_all(listing.as_bytes());
        };

        let (name, value) = match rest.split_once(' ') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (rest, ""),
        };

        if name == "CLEAR" {
            self.state.default_headers.clear();
            return self.ok_reply();
        }
        if name.is_empty() || value.is_empty() {
            return self.slapi_error(400, "HEADERS requires header name and value");
        }

        self.state
            .default_headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self.ok_reply()
    }
}

fn parse_serial_spec(spec: &str) -> Option<SerialSettings> {
    let fields: Vec<&str> = spec.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return None;
    }
    Some(SerialSettings {
        baud: fields[0].parse().ok()?,
        data_bits: fields[1].parse().ok()?,
        parity: Parity::from_flag(fields[2])?,
        stop_bits: fields[3].parse().ok()?,
    })
}
