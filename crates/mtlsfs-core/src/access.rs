//! Request authorization and routing.
//!
//! Authorization depends only on the caller's [`Identity`], the configured
//! [`AdminConfig`] and the request [`Method`]; there is no session state and
//! no per-path ACL. Routing then turns an authorized request path into a
//! [`Route`] naming the filesystem action to run.
//!
//! # Scope
//!
//! Reads are confined to `<root>/<organization>/`. Mutations are admin-only
//! and resolve against `<root>/` itself, so the admin organization can write
//! into any tenant's tree while every other organization only ever reads its
//! own.

use crate::error::{AccessError, AccessResult};
use crate::identity::Identity;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default name of the privileged organization.
pub const DEFAULT_ADMIN_ORGANIZATION: &str = "Admin";

/// HTTP methods understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
    /// Anything else. Always answered with 405.
    Unsupported,
}

impl Method {
    /// Returns true for methods that change the served tree.
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Post | Self::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Unsupported => "UNSUPPORTED",
        }
    }
}

impl From<&str> for Method {
    /// Method tokens are case-sensitive, as in HTTP.
    fn from(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "DELETE" => Self::Delete,
            _ => Self::Unsupported,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The organization granted cross-tenant write and delete.
///
/// Fixed at startup and passed into the router explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminConfig {
    organization: String,
}

impl AdminConfig {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Returns true if `identity` belongs to the admin organization.
    pub fn is_admin(&self, identity: &Identity) -> bool {
        identity.organization() == self.organization
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_ORGANIZATION)
    }
}

/// Outcome of [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Read inside the caller's own organization.
    Read,
    /// Write or delete anywhere in the served tree.
    Mutate,
    /// Mutation attempted by a non-admin organization.
    Forbidden,
    /// Unsupported method, regardless of identity.
    MethodNotAllowed,
}

/// Decide whether `identity` may perform `method`.
pub fn authorize(identity: &Identity, admin: &AdminConfig, method: Method) -> Decision {
    match method {
        Method::Get => Decision::Read,
        Method::Post | Method::Delete if admin.is_admin(identity) => Decision::Mutate,
        Method::Post | Method::Delete => Decision::Forbidden,
        Method::Unsupported => Decision::MethodNotAllowed,
    }
}

/// An authorized filesystem action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Render a listing of `dir`. `request_path` is the decoded request path
    /// the entry links are built from.
    List { dir: PathBuf, request_path: String },
    /// Stream the file at `path`.
    File { path: PathBuf },
    /// Create or overwrite `path` with the request body.
    Store { path: PathBuf },
    /// Remove the single file or empty directory at `path`.
    Remove { path: PathBuf },
}

impl Route {
    /// Local filesystem path the route operates on.
    pub fn path(&self) -> &Path {
        match self {
            Self::List { dir, .. } => dir,
            Self::File { path } | Self::Store { path } | Self::Remove { path } => path,
        }
    }
}

/// Percent-decode the path component of a request URI.
pub fn decode_request_path(raw: &str) -> AccessResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|e| AccessError::InvalidPath(format!("{raw}: {e}")))
}

/// Maps authenticated requests onto filesystem actions.
#[derive(Debug, Clone)]
pub struct AccessRouter {
    root: PathBuf,
    admin: AdminConfig,
}

impl AccessRouter {
    /// Create a router serving the tree below `root`.
    pub fn new(root: impl Into<PathBuf>, admin: AdminConfig) -> Self {
        Self {
            root: root.into(),
            admin,
        }
    }

    /// Base directory of the served tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn admin(&self) -> &AdminConfig {
        &self.admin
    }

    /// Directory the identity may read from.
    pub fn scope_root(&self, identity: &Identity) -> PathBuf {
        self.root.join(identity.organization())
    }

    /// Authorize `method` for `identity` and resolve the raw (still
    /// percent-encoded) request path into a [`Route`].
    ///
    /// Authorization runs before the path is even decoded, and the router
    /// performs no I/O, so a refused request never touches the filesystem.
    pub fn route(&self, method: Method, raw_path: &str, identity: &Identity) -> AccessResult<Route> {
        match authorize(identity, &self.admin, method) {
            Decision::MethodNotAllowed => Err(AccessError::MethodNotAllowed {
                method: method.to_string(),
            }),
            Decision::Forbidden => {
                warn!(
                    organization = identity.organization(),
                    subject = identity.subject(),
                    method = %method,
                    path = raw_path,
                    "Invalid privilege"
                );
                Err(forbidden(identity, "mutation requires the admin organization"))
            }
            Decision::Read => {
                check_organization(identity)?;
                let request_path = decode_request_path(raw_path)?;
                let path = resolve(&self.scope_root(identity), &request_path, identity)?;
                debug!(organization = identity.organization(), path = %path.display(), "Local path");
                if request_path.ends_with('/') {
                    Ok(Route::List { dir: path, request_path })
                } else {
                    Ok(Route::File { path })
                }
            }
            Decision::Mutate => {
                let request_path = decode_request_path(raw_path)?;
                let path = resolve(&self.root, &request_path, identity)?;
                if path == self.root {
                    return Err(forbidden(identity, "the served root cannot be replaced or removed"));
                }
                debug!(organization = identity.organization(), path = %path.display(), "Local path");
                if method == Method::Delete {
                    Ok(Route::Remove { path })
                } else {
                    Ok(Route::Store { path })
                }
            }
        }
    }
}

fn forbidden(identity: &Identity, reason: &str) -> AccessError {
    AccessError::Forbidden {
        organization: identity.organization().to_string(),
        reason: reason.to_string(),
    }
}

/// The organization names a directory, so it must be a single plain name.
fn check_organization(identity: &Identity) -> AccessResult<()> {
    let org = identity.organization();
    if org.is_empty() || org == "." || org == ".." || org.contains(['/', '\\']) {
        return Err(forbidden(identity, "organization is not a valid directory name"));
    }
    Ok(())
}

/// Append the segments of `request_path` to `base`, refusing `..`.
fn resolve(base: &Path, request_path: &str, identity: &Identity) -> AccessResult<PathBuf> {
    let mut path = base.to_path_buf();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                warn!(
                    organization = identity.organization(),
                    path = request_path,
                    "Rejected path escaping the served tree"
                );
                return Err(forbidden(identity, "path escapes the served tree"));
            }
            name if name.contains('\\') => {
                return Err(forbidden(identity, "path escapes the served tree"));
            }
            name => path.push(name),
        }
    }
    Ok(path)
}
