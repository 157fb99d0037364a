//! Wire-level transport collaborator interface.
//!
//! The binding owns the SAML protocol logic; the actual SOAP/HTTPS call is
//! delegated to an implementation of [`SoapTransport`]. A call blocks until
//! a raw response or an error is available. Timeouts, connection reuse and
//! the SOAP envelope wrapping are the transport's responsibility.

use std::path::PathBuf;
use thiserror::Error;

/// Default content type sent with SOAP requests.
pub const CONTENT_TYPE: &str = "text/xml";

/// Content types an implementation should accept in responses.
pub const RESPONSE_CONTENT_TYPES: &[&str] = &["text/xml", "application/soap+xml"];

/// Transport-level errors, surfaced to the binding caller wrapped in a
/// stage-tagged [`crate::error::BindingError::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to the remote service failed
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server returned a non-success HTTP status
    #[error("server returned HTTP error code {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// The response content type was not a recognized SOAP type
    #[error("unexpected response content type {0:?}")]
    ContentType(String),

    /// I/O failure reading the response
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-call TLS material for mutually-authenticated requests.
///
/// Built fresh for every send so a destination host change between calls
/// can never reuse a stale context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsContext {
    /// Hostname the server certificate is expected to match, derived from
    /// the destination URI
    pub expected_hostname: String,
    /// Client certificate file (PEM)
    pub certificate_file: PathBuf,
    /// Client private key file (PEM)
    pub private_key_file: PathBuf,
    /// Directory of trusted CA certificates
    pub ca_cert_dir: Option<PathBuf>,
}

/// Blocking SOAP transport.
pub trait SoapTransport {
    /// Send a serialized query to `destination` and return the raw response
    /// body.
    ///
    /// `headers` holds HTTP header name/value pairs (at minimum the content
    /// type). `tls` is present only for mutually-authenticated calls and is
    /// valid for this call alone.
    fn send(
        &self,
        body: &[u8],
        destination: &str,
        headers: &[(String, String)],
        tls: Option<&TlsContext>,
    ) -> Result<Vec<u8>, TransportError>;
}
