//! Identity extraction from an established TLS session.

use mtlsfs_core::{CertificateSubject, CredentialError, Identity};
use rustls::ServerConnection;
use std::net::SocketAddr;
use std::sync::Arc;

/// The authenticated peer behind a connection.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub remote_addr: SocketAddr,
    pub identity: Arc<Identity>,
}

impl PeerInfo {
    pub fn new(remote_addr: SocketAddr, identity: Identity) -> Self {
        Self {
            remote_addr,
            identity: Arc::new(identity),
        }
    }
}

/// A verified peer whose certificate cannot be mapped to an organization.
///
/// Requests on its connection are audited and then refused; the peer is
/// never given a default scope.
#[derive(Debug, Clone)]
pub struct RejectedPeer {
    pub remote_addr: SocketAddr,
    pub certificate: CertificateSubject,
    /// Why the identity could not be derived.
    pub reason: String,
}

/// Read the caller's identity from the verified peer certificate chain.
///
/// The handshake has already verified the chain. A session without a
/// certificate, or whose certificate names no organization, is an error:
/// such a peer is refused rather than served under a default scope.
pub fn extract_identity(conn: &ServerConnection) -> Result<Identity, CredentialError> {
    let chain = conn
        .peer_certificates()
        .ok_or(CredentialError::MissingCertificate)?;
    Identity::from_chain(chain)
}

/// Subject and serial of the peer's leaf certificate, if it can be parsed.
pub fn peer_subject(conn: &ServerConnection) -> Option<CertificateSubject> {
    conn.peer_certificates()
        .and_then(|chain| CertificateSubject::from_chain(chain).ok())
}
