use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use tracing::{debug, trace};

use crate::error::{BridgeError, Result};

const DNS_CACHE_TTL: Duration = Duration::from_secs(60);

/// Outbound connection to the origin server, plain or TLS-wrapped.
pub(crate) enum Upstream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for Upstream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Upstream::Plain(s) => s.read(buf),
            Upstream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Upstream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Upstream::Plain(s) => s.write(buf),
            Upstream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Upstream::Plain(s) => s.flush(),
            Upstream::Tls(s) => s.flush(),
        }
    }
}

struct CacheEntry {
    addresses: Vec<SocketAddr>,
    expires_at: Instant,
}

/// Per-request connector with a small TTL-bounded DNS cache. The session
/// engine is single-threaded, so a plain map suffices.
pub(crate) struct Connector {
    dns: HashMap<String, CacheEntry>,
    tls: Option<Arc<ClientConfig>>,
}

impl Connector {
    pub(crate) fn new() -> Connector {
        Connector {
            dns: HashMap::new(),
            tls: None,
        }
    }

    pub(crate) fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<Upstream> {
        let addrs = self.resolve(host, port)?;
        let stream = TcpStream::connect(&addrs[..])
            .map_err(|e| BridgeError::Network(format!("Connection failed to {host}:{port}: {e}")))?;

        if !tls {
            return Ok(Upstream::Plain(stream));
        }

        let name = ServerName::try_from(host.to_string())
            .map_err(|e| BridgeError::Network(format!("invalid TLS server name '{host}': {e}")))?;
        let conn = ClientConnection::new(self.tls_config(), name)
            .map_err(|e| BridgeError::Network(format!("TLS setup failed for {host}: {e}")))?;
        Ok(Upstream::Tls(Box::new(StreamOwned::new(conn, stream))))
    }

    fn resolve(&mut self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let key = format!("{host}:{port}");
        if let Some(entry) = self.dns.get(&key) {
            if Instant::now() < entry.expires_at {
                trace!(%host, "dns cache hit");
                return Ok(entry.addresses.clone());
            }
        }

        debug!(%host, port, "resolving");
        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| BridgeError::Network(format!("DNS resolution failed for {host}: {e}")))?
            .collect();
        if addresses.is_empty() {
            return Err(BridgeError::Network(format!("no addresses found for {host}")));
        }

        self.dns.insert(
            key,
            CacheEntry {
                addresses: addresses.clone(),
                expires_at: Instant::now() + DNS_CACHE_TTL,
            },
        );
        Ok(addresses)
    }

    fn tls_config(&mut self) -> Arc<ClientConfig> {
        self.tls
            .get_or_insert_with(|| {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                Arc::new(
                    ClientConfig::builder()
                        .with_root_certificates(roots)
                        .with_no_client_auth(),
                )
            })
            .clone()
    }
}
