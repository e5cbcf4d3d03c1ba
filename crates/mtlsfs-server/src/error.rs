//! Error types for the server.
//!
//! [`ServerError`] covers startup: loading TLS material and binding the
//! listener. Any of these halts the server before it accepts a connection.
//! [`RequestError`] covers a single request and always becomes a response.

use hyper::StatusCode;
use mtlsfs_core::AccessError;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A PEM file could not be opened or parsed.
    #[error("failed to load {what} from '{}': {source}", path.display())]
    Load {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A PEM file contained nothing usable.
    #[error("no {what} found in '{}'", path.display())]
    Missing { what: &'static str, path: PathBuf },

    /// rustls rejected the assembled configuration.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// The listen address could not be parsed or resolved.
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidListenAddress { addr: String, reason: String },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for server startup.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while serving one request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Authorization, lookup, rendering or filesystem failure.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// A blocking filesystem task panicked or was cancelled.
    #[error("filesystem task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RequestError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Access(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text sent to the caller.
    pub fn client_message(&self) -> String {
        match self {
            Self::Access(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}
