//! SAML 2.0 SOAP binding client.
//!
//! Issues SAML attribute and authorization decision queries to a remote
//! query service over a blocking SOAP transport, and validates the returned
//! responses: status code, correlation of `InResponseTo` against the sent
//! query ID, and issue-instant / assertion time-condition checks with a
//! configurable clock-skew tolerance.
//!
//! # Features
//!
//! - Attribute and authorization decision query documents
//! - Fresh correlation ID and issue instant stamped per send
//! - Pre-send structural validation (issuer name and format required)
//! - Response status, correlation and time-condition validation
//! - Pluggable XML codec and transport collaborators
//! - Mutual-TLS variant with per-call client certificate context
//!
//! # Example
//!
//! ```ignore
//! use saml_soap_binding::{BindingConfig, RequestSoapBinding};
//! use saml_soap_binding::model::{Issuer, Query, Subject};
//!
//! let binding = RequestSoapBinding::new(transport, BindingConfig::default());
//! let mut query = Query::attribute_query(
//!     Issuer::new(Issuer::X509_SUBJECT_NAME_FORMAT, "/O=Site A/CN=Authority"),
//!     Subject::new("https://openid.localhost/philip.kershaw", "urn:esg:openid"),
//! );
//! let response = binding.send(&mut query, "https://attributeservice.localhost/saml")?;
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod model;
pub mod transport;
pub mod validator;
pub mod xml;

pub use binding::{MutualTlsSoapBinding, RequestSoapBinding};
pub use config::{BindingConfig, TlsConfig};
pub use error::{BindingError, ResponseError, SendStage};
pub use transport::{SoapTransport, TlsContext, TransportError};
pub use validator::TimeConditionValidator;
