//! Test server harness for file server integration tests.
//!
//! Provides a `TestServer` running over real mutual TLS against a temporary
//! tree, plus reqwest clients holding certificates for different
//! organizations.

use crate::common::pki::{IssuedCert, TestCa};
use crate::common::audit::MemoryAuditLog;
use mtlsfs_core::{AccessRouter, AdminConfig};
use mtlsfs_server::{build_server_config, FileServer, FileService, ServerConfig, TlsConfig};
use reqwest::{Certificate, Client, Identity};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Organizations with a directory in the test tree.
pub const ORGANIZATIONS: [&str; 3] = ["Admin", "Idnaf", "OtherOrg"];

/// Lay out the standard test tree under `root`.
pub fn populate_tree(root: &Path) {
    for org in ORGANIZATIONS {
        fs::create_dir_all(root.join(org)).expect("Failed to create org dir");
    }
    fs::write(root.join("Idnaf/readme.txt"), b"idnaf readme").unwrap();
    fs::create_dir_all(root.join("Idnaf/docs")).unwrap();
    fs::write(root.join("Idnaf/docs/guide.txt"), b"guide").unwrap();
    fs::write(root.join("OtherOrg/secret.txt"), b"other secret").unwrap();
    fs::write(root.join("Admin/admin.txt"), b"admin only").unwrap();
}

/// A running server with its CA, temporary tree and TLS material.
pub struct TestServer {
    server: FileServer,
    ca: TestCa,
    /// Every audit entry the server recorded.
    pub audit: Arc<MemoryAuditLog>,
    /// Root of the served tree.
    pub root: TempDir,
    _pki_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let root = TempDir::new().expect("Failed to create temp root");
        populate_tree(root.path());

        let ca = TestCa::new("mtlsfs test CA");
        let server_cert = ca.server_cert();

        let pki_dir = TempDir::new().expect("Failed to create pki dir");
        let tls = TlsConfig {
            ca_file: pki_dir.path().join("ca.pem"),
            cert_file: pki_dir.path().join("server.pem"),
            key_file: pki_dir.path().join("server.key"),
        };
        fs::write(&tls.ca_file, ca.cert_pem()).unwrap();
        fs::write(&tls.cert_file, &server_cert.cert_pem).unwrap();
        fs::write(&tls.key_file, &server_cert.key_pem).unwrap();

        let mut config = ServerConfig::new(tls);
        config.listen = "127.0.0.1:0".parse().unwrap();
        config.root = root.path().to_path_buf();
        config.admin = AdminConfig::default();

        let tls = build_server_config(&config.tls).expect("Failed to build TLS config");
        let audit = Arc::new(MemoryAuditLog::default());
        let service = FileService::with_audit(
            AccessRouter::new(config.root.clone(), config.admin.clone()),
            audit.clone(),
        );
        let server = FileServer::start_with(&config, tls, service)
            .await
            .expect("Failed to start file server");

        Self {
            server,
            ca,
            audit,
            root,
            _pki_dir: pki_dir,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.addr
    }

    /// URL for `path`, addressed by the name in the server certificate.
    pub fn url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.addr().port(), path)
    }

    pub fn ca(&self) -> &TestCa {
        &self.ca
    }

    /// Client presenting a certificate for `organization`.
    pub fn client_for(&self, organization: &str) -> Client {
        let cert = self
            .ca
            .client_cert(&format!("{} client", organization.to_lowercase()), Some(organization));
        self.client_with(Some(&cert))
    }

    /// Client trusting the server, optionally presenting `cert`.
    pub fn client_with(&self, cert: Option<&IssuedCert>) -> Client {
        let root = Certificate::from_pem(self.ca.cert_pem().as_bytes()).expect("CA cert");
        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(root)
            .resolve("localhost", self.addr())
            .timeout(Duration::from_secs(10));
        if let Some(cert) = cert {
            let identity = Identity::from_pem(&cert.identity_pem()).expect("client identity");
            builder = builder.identity(identity);
        }
        builder.build().expect("Failed to create HTTP client")
    }

    pub async fn stop(self) {
        self.server.stop().await;
    }
}
