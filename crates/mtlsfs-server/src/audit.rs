//! Per-request audit trail.
//!
//! One [`AuditEntry`] is recorded for every request, before the request is
//! authorized, so refused and failed requests leave the same trace as
//! successful ones.

use crate::credential::{PeerInfo, RejectedPeer};
use hyper::Request;
use hyper::header::USER_AGENT;
use std::net::SocketAddr;
use tracing::info;

/// Target used for audit events, so they can be filtered separately.
pub const AUDIT_TARGET: &str = "mtlsfs::audit";

/// What is recorded about each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub remote_addr: SocketAddr,
    pub method: String,
    /// Request URI as sent, including any query string.
    pub uri: String,
    pub user_agent: String,
    pub organization: String,
    pub subject: String,
    pub serial: String,
}

impl AuditEntry {
    pub fn from_request<B>(peer: &PeerInfo, req: &Request<B>) -> Self {
        Self::build(
            peer.remote_addr,
            peer.identity.organization(),
            peer.identity.subject(),
            peer.identity.serial(),
            req,
        )
    }

    /// Entry for a request from a peer without an organization; the
    /// organization field is left empty.
    pub fn from_rejected<B>(peer: &RejectedPeer, req: &Request<B>) -> Self {
        Self::build(
            peer.remote_addr,
            "",
            &peer.certificate.subject,
            &peer.certificate.serial,
            req,
        )
    }

    fn build<B>(
        remote_addr: SocketAddr,
        organization: &str,
        subject: &str,
        serial: &str,
        req: &Request<B>,
    ) -> Self {
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            remote_addr,
            method: req.method().as_str().to_string(),
            uri: request_uri(req),
            user_agent,
            organization: organization.to_string(),
            subject: subject.to_string(),
            serial: serial.to_string(),
        }
    }
}

/// Path and query of the request URI, as the client sent it.
pub(crate) fn request_uri<B>(req: &Request<B>) -> String {
    req.uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string())
}

/// Sink for audit entries. Shared by all connections, so it must be safe
/// for concurrent use.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Writes audit entries as `tracing` events on [`AUDIT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: &AuditEntry) {
        info!(
            target: AUDIT_TARGET,
            peer = %entry.remote_addr,
            method = %entry.method,
            uri = %entry.uri,
            user_agent = %entry.user_agent,
            organization = %entry.organization,
            subject = %entry.subject,
            serial = %entry.serial,
            "{} - {} {} - {}",
            entry.remote_addr,
            entry.method,
            entry.uri,
            entry.user_agent
        );
    }
}
