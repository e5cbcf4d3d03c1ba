//! Mutual-TLS HTTPS transport for the certificate-scoped file server.
//!
//! This crate wraps [`mtlsfs_core`] in a network server:
//! 1. Accepts TCP connections and runs a TLS 1.3 handshake that requires a
//!    client certificate signed by the configured CA bundle
//! 2. Derives the caller's [`Identity`](mtlsfs_core::Identity) from the
//!    verified certificate
//! 3. Serves `GET`, `POST` and `DELETE` over HTTP/1.1 or HTTP/2, recording an
//!    audit entry for every request
//!
//! # Example
//!
//! ```ignore
//! use mtlsfs_server::{FileServer, ServerConfig, TlsConfig};
//!
//! let config = ServerConfig::new(TlsConfig {
//!     ca_file: "ca.pem".into(),
//!     cert_file: "server.pem".into(),
//!     key_file: "server.key".into(),
//! });
//!
//! let server = FileServer::start(config).await?;
//! println!("Serving on {}", server.url());
//! // ...
//! server.stop().await;
//! ```

mod audit;
mod config;
mod credential;
mod error;
mod handler;
mod server;
mod tls;

// Public exports
pub use audit::{AuditEntry, AuditLog, TracingAuditLog, AUDIT_TARGET};
pub use config::{parse_listen_addr, ServerConfig, DEFAULT_HEADER_READ_TIMEOUT, DEFAULT_LISTEN};
pub use credential::{extract_identity, peer_subject, PeerInfo, RejectedPeer};
pub use error::{RequestError, ServerError, ServerResult};
pub use handler::{FileService, ResponseBody, SERVER_NAME};
pub use server::FileServer;
pub use tls::{build_server_config, load_certs, load_client_roots, load_private_key, TlsConfig};
