//! Caller identity derived from a verified client certificate.
//!
//! The transport layer has already validated the chain against the trusted
//! CA set by the time an [`Identity`] is built. This module only reads the
//! subject fields of the leaf certificate.

use std::fmt;
use thiserror::Error;
use x509_parser::prelude::*;

/// Errors raised while deriving an [`Identity`] from a certificate.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The connection presented no certificate at all.
    #[error("peer presented no client certificate")]
    MissingCertificate,

    /// The leaf certificate is not valid DER.
    #[error("malformed client certificate: {0}")]
    Malformed(String),

    /// The subject carries no Organization attribute.
    #[error("client certificate subject '{subject}' has no Organization attribute")]
    MissingOrganization { subject: String },

    /// The Organization attribute is not a readable string.
    #[error("unreadable Organization attribute: {0}")]
    InvalidAttribute(String),
}

/// Subject and serial of a certificate, available even when the subject
/// names no organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    pub subject: String,
    pub serial: String,
}

impl CertificateSubject {
    pub fn from_der(der: &[u8]) -> Result<Self, CredentialError> {
        let cert = parse_certificate(der)?;
        Ok(Self {
            subject: rfc4514_subject(cert.subject()),
            serial: cert.serial.to_string(),
        })
    }

    /// Read the leaf of a peer certificate chain.
    pub fn from_chain<C: AsRef<[u8]>>(chain: &[C]) -> Result<Self, CredentialError> {
        let leaf = chain.first().ok_or(CredentialError::MissingCertificate)?;
        Self::from_der(leaf.as_ref())
    }
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, CredentialError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| CredentialError::Malformed(e.to_string()))
}

/// Who is making a request, as stated by their certificate.
///
/// Built once per connection after the handshake completes and never shared
/// with another connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    organization: String,
    subject: String,
    serial: String,
}

impl Identity {
    /// Create an identity from already-extracted subject fields.
    pub fn new(
        organization: impl Into<String>,
        subject: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            subject: subject.into(),
            serial: serial.into(),
        }
    }

    /// Parse the identity out of a DER-encoded X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, CredentialError> {
        let cert = parse_certificate(der)?;

        let subject = rfc4514_subject(cert.subject());
        let organization = match cert.subject().iter_organization().next() {
            Some(attr) => attr
                .as_str()
                .map_err(|e| CredentialError::InvalidAttribute(e.to_string()))?
                .to_string(),
            None => return Err(CredentialError::MissingOrganization { subject }),
        };
        if organization.is_empty() {
            return Err(CredentialError::MissingOrganization { subject });
        }

        Ok(Self {
            organization,
            subject,
            serial: cert.serial.to_string(),
        })
    }

    /// Parse the identity from a peer certificate chain (leaf first).
    pub fn from_chain<C: AsRef<[u8]>>(chain: &[C]) -> Result<Self, CredentialError> {
        let leaf = chain.first().ok_or(CredentialError::MissingCertificate)?;
        Self::from_der(leaf.as_ref())
    }

    /// First Organization attribute of the certificate subject.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Human-readable form of the full subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Certificate serial number in decimal.
    pub fn serial(&self) -> &str {
        &self.serial
    }
}

/// Render a distinguished name the way RFC 4514 orders it: last RDN first,
/// RDNs joined by `,`, multi-valued RDNs joined by `+`.
fn rfc4514_subject(name: &X509Name<'_>) -> String {
    let rdns: Vec<String> = name
        .iter_rdn()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let value = match attr.as_str() {
                        Ok(text) => escape_attribute_value(text),
                        Err(_) => format!("#{}", hex(attr.attr_value().data)),
                    };
                    format!("{}={value}", attribute_name(attr))
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();
    rdns.into_iter().rev().collect::<Vec<_>>().join(",")
}

fn attribute_name(attr: &AttributeTypeAndValue<'_>) -> String {
    let dotted = attr.attr_type().to_id_string();
    let short = match dotted.as_str() {
        "2.5.4.3" => "CN",
        "2.5.4.5" => "SERIALNUMBER",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.9" => "STREET",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "2.5.4.17" => "POSTALCODE",
        _ => return dotted,
    };
    short.to_string()
}

fn escape_attribute_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && matches!(c, ' ' | '#'))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (serial {})", self.subject, self.serial)
    }
}
