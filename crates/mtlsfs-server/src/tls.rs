//! TLS configuration for mutual authentication.
//!
//! Every client must present a certificate that chains to one of the CA
//! certificates in the configured bundle; the handshake fails otherwise.
//! Only TLS 1.3 is offered.

use crate::error::{ServerError, ServerResult};
use rustls::RootCertStore;
use rustls::server::WebPkiClientVerifier;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Paths of the PEM files the server needs.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// CA bundle used to verify client certificates.
    pub ca_file: PathBuf,
    /// Server certificate chain.
    pub cert_file: PathBuf,
    /// Server private key.
    pub key_file: PathBuf,
}

fn open(what: &'static str, path: &Path) -> ServerResult<BufReader<File>> {
    let file = File::open(path).map_err(|source| ServerError::Load {
        what,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Load every certificate from a PEM file.
pub fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let mut reader = open("certificates", path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ServerError::Load {
            what: "certificates",
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(ServerError::Missing {
            what: "certificates",
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let mut reader = open("private key", path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ServerError::Load {
            what: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| ServerError::Missing {
            what: "private key",
            path: path.to_path_buf(),
        })
}

/// Load the CA bundle that client certificates are verified against.
///
/// Certificates that fail to parse are skipped; a bundle with no usable
/// certificate at all is an error.
pub fn load_client_roots(path: &Path) -> ServerResult<RootCertStore> {
    let certs = load_certs(path)?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!(path = %path.display(), ignored, "Skipped unparsable CA certificates");
    }
    if added == 0 {
        return Err(ServerError::Missing {
            what: "usable CA certificates",
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), added, "Loaded client CA certificates");
    Ok(roots)
}

/// Build the rustls server configuration.
pub fn build_server_config(tls: &TlsConfig) -> ServerResult<Arc<rustls::ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let roots = load_client_roots(&tls.ca_file)?;
    let certs = load_certs(&tls.cert_file)?;
    let key = load_private_key(&tls.key_file)?;

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
