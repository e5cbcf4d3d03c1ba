//! Request handling.
//!
//! [`FileService::handle`] runs one request end to end: audit, route,
//! execute, render. Filesystem work runs on tokio's blocking pool; file
//! downloads are delegated to `tower-http`'s [`ServeFile`], which takes care
//! of content types, byte ranges and conditional requests.

use crate::audit::{request_uri, AuditEntry, AuditLog, TracingAuditLog};
use crate::credential::{PeerInfo, RejectedPeer};
use crate::error::RequestError;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use mtlsfs_core::{
    read_directory, remove_entry, store_from, AccessError, AccessRouter, Listing, Method, Route,
};
use std::fmt;
use std::io::{self, Read};
use std::pin::pin;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = "MTLS File Server";

/// Body chunks buffered between the connection and the upload writer.
const UPLOAD_CHANNEL_DEPTH: usize = 8;

/// Response body type produced by the handler.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Serves authenticated requests against the routed filesystem tree.
#[derive(Clone)]
pub struct FileService {
    router: Arc<AccessRouter>,
    audit: Arc<dyn AuditLog>,
}

impl fmt::Debug for FileService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileService")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl FileService {
    /// Create a service that audits through `tracing`.
    pub fn new(router: AccessRouter) -> Self {
        Self::with_audit(router, Arc::new(TracingAuditLog))
    }

    /// Create a service with a custom audit sink.
    pub fn with_audit(router: AccessRouter, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            router: Arc::new(router),
            audit,
        }
    }

    pub fn router(&self) -> &AccessRouter {
        &self.router
    }

    /// Handle one request from `peer`.
    ///
    /// Never fails: every error becomes a response with the matching status.
    pub async fn handle<B>(&self, peer: &PeerInfo, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: fmt::Display,
    {
        self.audit.record(&AuditEntry::from_request(peer, &req));

        let mut response = match self.dispatch(peer, req).await {
            Ok(response) => response,
            Err(err) => {
                let status = err.status();
                warn!(
                    organization = peer.identity.organization(),
                    subject = peer.identity.subject(),
                    peer = %peer.remote_addr,
                    status = status.as_u16(),
                    error = %err,
                    "Request failed"
                );
                text_response(status, &err.client_message())
            }
        };

        response
            .headers_mut()
            .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
        response
    }

    /// Answer a request from a peer whose certificate names no organization.
    ///
    /// The request is audited like any other, then refused: 405 for methods
    /// nobody may use, 403 otherwise.
    pub fn reject<B>(&self, peer: &RejectedPeer, req: &Request<B>) -> Response<ResponseBody> {
        self.audit.record(&AuditEntry::from_rejected(peer, req));

        let err = match Method::from(req.method().as_str()) {
            Method::Unsupported => AccessError::MethodNotAllowed {
                method: req.method().to_string(),
            },
            _ => AccessError::Forbidden {
                organization: String::new(),
                reason: peer.reason.clone(),
            },
        };
        warn!(
            subject = %peer.certificate.subject,
            serial = %peer.certificate.serial,
            peer = %peer.remote_addr,
            reason = %peer.reason,
            "Refusing request from certificate without organization"
        );

        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::FORBIDDEN);
        let mut response = text_response(status, &err.client_message());
        response
            .headers_mut()
            .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
        response
    }

    async fn dispatch<B>(&self, peer: &PeerInfo, req: Request<B>) -> Result<Response<ResponseBody>, RequestError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: fmt::Display,
    {
        let method = Method::from(req.method().as_str());
        let route = self.router.route(method, req.uri().path(), &peer.identity)?;
        if method.is_mutation() {
            info!(
                organization = peer.identity.organization(),
                method = %method,
                path = %route.path().display(),
                "Admin mutation authorized"
            );
        }

        match route {
            Route::List { dir, request_path } => {
                let title = request_uri(&req);
                list_directory(peer, dir, request_path, title).await
            }
            Route::File { path } => serve_file(req, path).await,
            Route::Store { path } => store(req.into_body(), path).await,
            Route::Remove { path } => remove(path).await,
        }
    }
}

async fn list_directory(
    peer: &PeerInfo,
    dir: PathBuf,
    request_path: String,
    title: String,
) -> Result<Response<ResponseBody>, RequestError> {
    let entries = spawn_blocking(move || read_directory(&dir, &request_path)).await??;
    let listing = Listing::new(title, peer.identity.subject(), entries);
    let html = listing.render()?;

    let mut response = Response::new(full(html));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Ok(response)
}

async fn serve_file<B>(req: Request<B>, path: PathBuf) -> Result<Response<ResponseBody>, RequestError> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| AccessError::from_io(&path, e))?;

    // Directories are only listed under their canonical `/`-terminated URL.
    if metadata.is_dir() {
        let location = format!("{}/", req.uri().path());
        debug!(location = %location, "Redirecting directory request");
        let location = HeaderValue::from_str(&location)
            .map_err(|e| AccessError::InvalidPath(e.to_string()))?;
        let mut response = Response::new(full(Bytes::new()));
        *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
        response.headers_mut().insert(header::LOCATION, location);
        return Ok(response);
    }

    let (parts, _body) = req.into_parts();
    let req = Request::from_parts(parts, Empty::<Bytes>::new());
    let response = match ServeFile::new(&path).oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(BodyExt::boxed_unsync))
}

/// Stream the request body into `path`.
///
/// Frames are handed to a blocking writer through a bounded channel, so an
/// upload never sits in memory as a whole.
async fn store<B>(body: B, path: PathBuf) -> Result<Response<ResponseBody>, RequestError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display,
{
    let (tx, rx) = mpsc::channel(UPLOAD_CHANNEL_DEPTH);
    let writer = spawn_blocking(move || store_from(&path, ChannelReader::new(rx)));

    let mut body = pin!(body);
    let mut body_error = None;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                if data.is_empty() {
                    continue;
                }
                // The writer has already failed; its error is reported below.
                if tx.send(Ok(data)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let message = e.to_string();
                let _ = tx
                    .send(Err(io::Error::new(io::ErrorKind::ConnectionAborted, message.clone())))
                    .await;
                body_error = Some(message);
                break;
            }
        }
    }
    if body_error.is_none() {
        // End of body. Without it the writer treats the closed channel as an
        // interrupted upload.
        let _ = tx.send(Ok(Bytes::new())).await;
    }
    drop(tx);

    let written = writer.await?;
    if let Some(message) = body_error {
        return Err(RequestError::Body(message));
    }
    let written = written?;
    Ok(text_response(StatusCode::OK, &format!("{written} bytes written")))
}

/// Blocking reader over body chunks arriving on a channel.
///
/// An empty chunk marks the end of the body; the channel closing before that
/// is an error.
struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
    finished: bool,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
            finished: false,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) if chunk.is_empty() => self.finished = true,
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upload interrupted",
                    ));
                }
            }
        }
        let n = buf.len().min(self.current.len());
        let chunk = self.current.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        Ok(n)
    }
}


async fn remove(path: PathBuf) -> Result<Response<ResponseBody>, RequestError> {
    spawn_blocking(move || remove_entry(&path)).await??;
    Ok(Response::new(full(Bytes::new())))
}

fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into())
        .map_err(|never| -> io::Error { match never {} })
        .boxed_unsync()
}

/// Plain-text response; the message is terminated with a newline.
fn text_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
    let mut response = Response::new(full(format!("{message}\n")));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
