//! HTTPS server lifecycle management.
//!
//! This module owns the listener, the accept loop and the per-connection
//! pipeline: TLS handshake, identity extraction, then HTTP/1.1 or HTTP/2
//! serving through [`FileService`].

use crate::config::ServerConfig;
use crate::credential::{extract_identity, peer_subject, PeerInfo, RejectedPeer};
use crate::error::{ServerError, ServerResult};
use crate::handler::FileService;
use crate::tls::build_server_config;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use mtlsfs_core::AccessRouter;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// State shared by every connection task.
struct ConnectionContext {
    acceptor: TlsAcceptor,
    service: FileService,
    header_read_timeout: Duration,
}

/// Who the requests on a connection come from.
enum Caller {
    Authenticated(PeerInfo),
    /// Verified by the CA, but without a usable organization.
    Rejected(RejectedPeer),
}

/// A running file server instance.
pub struct FileServer {
    /// The actual bound address.
    pub addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle.
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl FileServer {
    /// Load the TLS material, bind the listener and start serving.
    ///
    /// Fails before accepting any connection if the CA bundle, certificate
    /// or key cannot be loaded, or the address cannot be bound.
    pub async fn start(config: ServerConfig) -> ServerResult<Self> {
        let tls = build_server_config(&config.tls)?;
        let router = AccessRouter::new(config.root.clone(), config.admin.clone());
        Self::start_with(&config, tls, FileService::new(router)).await
    }

    /// Start serving with prepared TLS configuration and service.
    pub async fn start_with(
        config: &ServerConfig,
        tls: Arc<rustls::ServerConfig>,
        service: FileService,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        let actual_addr = listener.local_addr()?;

        info!(
            addr = %actual_addr,
            root = %service.router().root().display(),
            admin = service.router().admin().organization(),
            "Starting mTLS file server"
        );

        let context = Arc::new(ConnectionContext {
            acceptor: TlsAcceptor::from(tls),
            service,
            header_read_timeout: config.header_read_timeout,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            tokio::select! {
                () = run_server(listener, context) => {
                    debug!("Server loop ended");
                }
                _ = shutdown_rx => {
                    info!("Received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Get the URL for this server.
    pub fn url(&self) -> String {
        format!("https://{}", self.addr)
    }

    /// Stop the server.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("mTLS file server stopped");
    }

    /// Stop the server synchronously (for use in Drop).
    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

/// Run the server accept loop.
async fn run_server(listener: TcpListener, context: Arc<ConnectionContext>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                tokio::spawn(serve_connection(stream, peer_addr, context.clone()));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Handshake, authenticate and serve one connection.
async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, context: Arc<ConnectionContext>) {
    let handshake = tokio::time::timeout(context.header_read_timeout, context.acceptor.accept(stream)).await;
    let tls_stream = match handshake {
        Ok(Ok(tls_stream)) => tls_stream,
        Ok(Err(e)) => {
            warn!(peer = %peer_addr, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            warn!(peer = %peer_addr, "TLS handshake timed out");
            return;
        }
    };

    let (_, conn) = tls_stream.get_ref();
    let caller = match extract_identity(conn) {
        Ok(identity) => {
            debug!(
                peer = %peer_addr,
                organization = identity.organization(),
                serial = identity.serial(),
                "Client authenticated"
            );
            Caller::Authenticated(PeerInfo::new(peer_addr, identity))
        }
        Err(e) => match peer_subject(conn) {
            // Still serve HTTP so each request is audited before it is refused.
            Some(certificate) => {
                warn!(
                    peer = %peer_addr,
                    subject = %certificate.subject,
                    error = %e,
                    "Client certificate carries no usable organization"
                );
                Caller::Rejected(RejectedPeer {
                    remote_addr: peer_addr,
                    certificate,
                    reason: e.to_string(),
                })
            }
            None => {
                error!(peer = %peer_addr, error = %e, "Refusing connection without a readable client certificate");
                return;
            }
        },
    };

    let caller = Arc::new(caller);
    let header_read_timeout = context.header_read_timeout;
    let service = service_fn(move |req: Request<Incoming>| {
        let context = context.clone();
        let caller = caller.clone();
        async move {
            let response = match caller.as_ref() {
                Caller::Authenticated(peer) => context.service.handle(peer, req).await,
                Caller::Rejected(peer) => context.service.reject(peer, &req),
            };
            Ok::<_, Infallible>(response)
        }
    });

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    if let Err(e) = builder
        .serve_connection(TokioIo::new(tls_stream), service)
        .await
    {
        // Clients closing mid-request land here as well.
        warn!(peer = %peer_addr, error = %e, "HTTP connection error");
    }
}
