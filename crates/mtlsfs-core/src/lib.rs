//! Certificate-scoped file access for the mTLS file server.
//!
//! This crate holds the request decision logic of the server and nothing
//! else: it knows nothing about TLS handshakes or HTTP connections.
//!
//! # How It Works
//!
//! 1. The transport verifies the client certificate and hands the leaf
//!    certificate to [`Identity::from_chain`].
//! 2. The certificate's first Organization (`O`) attribute names the
//!    caller's tenant directory.
//! 3. [`AccessRouter::route`] authorizes the method and resolves the request
//!    path into a [`Route`]:
//!    - `GET` reads under `<root>/<organization>/`
//!    - `POST` and `DELETE` are reserved for the admin organization and
//!      resolve against `<root>/` directly
//! 4. The caller executes the route with [`read_directory`], [`store_file`]
//!    or [`remove_entry`] and renders listings through [`Listing`].
//!
//! # Example
//!
//! ```
//! use mtlsfs_core::{AccessRouter, AdminConfig, Identity, Method, Route};
//!
//! let router = AccessRouter::new("/srv/files", AdminConfig::default());
//! let identity = Identity::new("Idnaf", "CN=client,O=Idnaf", "42");
//!
//! let route = router.route(Method::Get, "/reports/", &identity).unwrap();
//! assert!(matches!(route, Route::List { .. }));
//! ```

pub mod access;
pub mod error;
pub mod identity;
pub mod listing;
pub mod ops;

pub use access::{authorize, decode_request_path, AccessRouter, AdminConfig, Decision, Method, Route};
pub use error::{AccessError, AccessResult};
pub use identity::{CertificateSubject, CredentialError, Identity};
pub use listing::{read_directory, DirectoryEntry, Listing};
pub use ops::{remove_entry, store_file, store_from};
