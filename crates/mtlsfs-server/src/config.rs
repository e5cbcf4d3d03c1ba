//! Server configuration.

use crate::error::{ServerError, ServerResult};
use crate::tls::TlsConfig;
use mtlsfs_core::AdminConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address (all interfaces, port 8443).
pub const DEFAULT_LISTEN: &str = ":8443";

/// Default time allowed for the TLS handshake and request headers.
pub const DEFAULT_HEADER_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for the file server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (port 0 = auto-assign).
    pub listen: SocketAddr,
    /// Base directory of the served tree.
    pub root: PathBuf,
    /// Organization allowed to write and delete.
    pub admin: AdminConfig,
    /// Certificate and key material.
    pub tls: TlsConfig,
    /// Limit for the TLS handshake and for reading request headers.
    pub header_read_timeout: Duration,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the TLS material.
    pub fn new(tls: TlsConfig) -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8443),
            root: PathBuf::from("."),
            admin: AdminConfig::default(),
            tls,
            header_read_timeout: DEFAULT_HEADER_READ_TIMEOUT,
        }
    }
}

/// Parse a listen address.
///
/// Accepts `:port` for all interfaces, `ip:port`, and `host:port` (resolved,
/// first address wins).
pub fn parse_listen_addr(listen: &str) -> ServerResult<SocketAddr> {
    let invalid = |reason: String| ServerError::InvalidListenAddress {
        addr: listen.to_string(),
        reason,
    };

    let candidate = if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    };

    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Ok(addr);
    }

    candidate
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("address did not resolve".to_string()))
}
