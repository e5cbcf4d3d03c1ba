//! Error taxonomy for request handling.
//!
//! Every failure a request can hit maps onto exactly one HTTP status code.
//! The transport layer turns an [`AccessError`] into a response with
//! [`AccessError::status_code`] and [`AccessError::client_message`]; nothing
//! here is retried.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while authorizing and executing a request.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The caller's organization may not perform this operation.
    #[error("organization '{organization}' denied: {reason}")]
    Forbidden { organization: String, reason: String },

    /// The target path does not exist.
    #[error("path not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// The HTTP method is outside {GET, POST, DELETE}.
    #[error("method not allowed: {method}")]
    MethodNotAllowed { method: String },

    /// The request path could not be decoded.
    #[error("invalid request path: {0}")]
    InvalidPath(String),

    /// The directory listing could not be generated.
    #[error("failed to render listing: {0}")]
    Render(String),

    /// Any other filesystem failure.
    #[error("IO error for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AccessError {
    /// Classify a filesystem error raised while operating on `path`.
    ///
    /// Missing entries (and path prefixes that are files rather than
    /// directories) become [`AccessError::NotFound`]; everything else is an
    /// internal error.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// HTTP status code reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPath(_) => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Render(_) | Self::Io { .. } => 500,
        }
    }

    /// Body text sent to the caller.
    ///
    /// Authorization and lookup failures use fixed texts so responses never
    /// reveal server-side paths; render and I/O failures carry the diagnostic.
    pub fn client_message(&self) -> String {
        match self {
            Self::Forbidden { .. } => "Invalid privilege".to_string(),
            Self::NotFound { .. } => "404 page not found".to_string(),
            Self::MethodNotAllowed { .. } => "405 method not allowed".to_string(),
            Self::InvalidPath(_) => "400 bad request".to_string(),
            Self::Render(msg) => msg.clone(),
            Self::Io { source, .. } => source.to_string(),
        }
    }

    /// Returns true if this error is an authorization refusal.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// Result type for request handling.
pub type AccessResult<T> = Result<T, AccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let forbidden = AccessError::Forbidden {
            organization: "Idnaf".to_string(),
            reason: "mutation requires admin".to_string(),
        };
        assert_eq!(forbidden.status_code(), 403);
        assert_eq!(forbidden.client_message(), "Invalid privilege");

        let missing = AccessError::NotFound { path: PathBuf::from("x") };
        assert_eq!(missing.status_code(), 404);

        let method = AccessError::MethodNotAllowed { method: "PATCH".to_string() };
        assert_eq!(method.status_code(), 405);
        assert_eq!(method.client_message(), "405 method not allowed");

        assert_eq!(AccessError::Render("boom".to_string()).status_code(), 500);
        assert_eq!(AccessError::InvalidPath("%ff".to_string()).status_code(), 400);
    }

    #[test]
    fn test_io_error_mapping() {
        let e = AccessError::from_io("a", io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(matches!(e, AccessError::NotFound { .. }));

        let e = AccessError::from_io("a", io::Error::from(io::ErrorKind::NotADirectory));
        assert!(matches!(e, AccessError::NotFound { .. }));

        let e = AccessError::from_io("a", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(e.status_code(), 500);
        assert_eq!(e.client_message(), "denied");
    }

    #[test]
    fn test_render_error_carries_diagnostic() {
        let e = AccessError::Render("template exploded".to_string());
        assert_eq!(e.client_message(), "template exploded");
    }
}
