//! Minimal SAML 2.0 object model consumed by the SOAP binding.
//!
//! Covers the subset of the SAML core schema the query client needs:
//! queries (attribute and authorization decision), responses, assertions
//! and their validity conditions. Queries are modeled as a tagged union
//! rather than a class hierarchy; field validation happens in the binding
//! layer, not in per-field setters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SAML 2.0 assertion namespace URI.
pub const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// SAML 2.0 protocol namespace URI.
pub const SAML_PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
/// SAML version attribute value stamped on every query.
pub const SAML_VERSION: &str = "2.0";

/// Entity asserting a query or assertion, with an optional name format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// Issuer name value (e.g. an X.509 subject name)
    pub value: Option<String>,
    /// Name format URI
    pub format: Option<String>,
}

impl Issuer {
    /// X.509 subject name format URI.
    pub const X509_SUBJECT_NAME_FORMAT: &'static str =
        "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName";

    /// Create an issuer with both value and format set.
    pub fn new(format: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            format: Some(format.into()),
        }
    }
}

/// Subject name identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// Identifier value
    pub value: String,
    /// Name format URI
    pub format: Option<String>,
}

/// Query subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject name identifier
    pub name_id: NameId,
}

impl Subject {
    /// Create a subject from a name identifier value and format.
    pub fn new(value: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name_id: NameId {
                value: value.into(),
                format: Some(format.into()),
            },
        }
    }
}

/// A SAML attribute, possibly multi-valued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Name format URI
    pub name_format: Option<String>,
    /// Human-readable name
    pub friendly_name: Option<String>,
    /// Attribute values as strings
    pub values: Vec<String>,
}

impl Attribute {
    /// Create a named attribute with no values.
    pub fn new(name: impl Into<String>, name_format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            name_format: Some(name_format.into()),
            friendly_name: None,
            values: Vec::new(),
        }
    }
}

/// An action in an authorization decision query or statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action namespace URI
    pub namespace: String,
    /// Action value (e.g. "Read")
    pub value: String,
}

impl Action {
    /// Read/Write/Execute/Delete/Control action namespace.
    pub const RWEDC_NS: &'static str = "urn:oasis:names:tc:SAML:1.0:action:rwedc";
    /// RWEDC with negation action namespace.
    pub const RWEDC_NEGATION_NS: &'static str =
        "urn:oasis:names:tc:SAML:1.0:action:rwedc-negation";

    /// Create an action in the RWEDC-negation namespace.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            namespace: Self::RWEDC_NEGATION_NS.to_string(),
            value: value.into(),
        }
    }
}

/// Type-specific payload of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryBody {
    /// Attribute query: which attributes to return for the subject
    Attribute {
        /// Requested attributes (empty = all available)
        attributes: Vec<Attribute>,
    },
    /// Authorization decision query for a resource
    AuthzDecision {
        /// Resource URI the decision is requested for
        resource: String,
        /// Actions to be authorized
        actions: Vec<Action>,
    },
}

/// An outbound SAML query.
///
/// `id` and `issue_instant` are left unset by the caller; the binding
/// stamps both immediately before each send so every attempt has a fresh
/// correlation identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Correlation ID, assigned by the binding at send time
    pub id: Option<String>,
    /// Issue instant, assigned by the binding at send time
    pub issue_instant: Option<DateTime<Utc>>,
    /// Query issuer; name and format are required for sending
    pub issuer: Option<Issuer>,
    /// Query subject
    pub subject: Option<Subject>,
    /// Type-specific payload
    pub body: QueryBody,
}

impl Query {
    /// Create an attribute query shell with no attributes requested.
    pub fn attribute_query(issuer: Issuer, subject: Subject) -> Self {
        Self {
            id: None,
            issue_instant: None,
            issuer: Some(issuer),
            subject: Some(subject),
            body: QueryBody::Attribute {
                attributes: Vec::new(),
            },
        }
    }

    /// Create an authorization decision query for a resource.
    pub fn authz_decision_query(
        issuer: Issuer,
        subject: Subject,
        resource: impl Into<String>,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            id: None,
            issue_instant: None,
            issuer: Some(issuer),
            subject: Some(subject),
            body: QueryBody::AuthzDecision {
                resource: resource.into(),
                actions,
            },
        }
    }

    /// Add a requested attribute. No-op for authorization decision queries.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        if let QueryBody::Attribute { attributes } = &mut self.body {
            attributes.push(attribute);
        }
    }
}

/// Top-level status code of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// Status code URI
    pub value: String,
}

impl StatusCode {
    /// Request succeeded.
    pub const SUCCESS_URI: &'static str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// Request could not be performed due to an error on the requester side.
    pub const REQUESTER_URI: &'static str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// Request could not be performed due to an error on the responder side.
    pub const RESPONDER_URI: &'static str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
    /// The principal named in the request is unknown to the responder.
    pub const UNKNOWN_PRINCIPAL_URI: &'static str =
        "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal";

    /// Success status code.
    pub fn success() -> Self {
        Self {
            value: Self::SUCCESS_URI.to_string(),
        }
    }

    /// True if this code is the success URI.
    pub fn is_success(&self) -> bool {
        self.value == Self::SUCCESS_URI
    }
}

/// Response status: code plus optional human-readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status code
    pub status_code: StatusCode,
    /// Optional status message
    pub status_message: Option<String>,
}

/// Assertion validity window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Instant before which the assertion is not valid
    pub not_before: Option<DateTime<Utc>>,
    /// Instant on or after which the assertion is no longer valid
    pub not_on_or_after: Option<DateTime<Utc>>,
}

/// Authorization decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionType {
    /// The requested action is permitted
    Permit,
    /// The requested action is denied
    Deny,
    /// No decision could be reached
    Indeterminate,
}

/// Attribute statement within an assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// Asserted attributes
    pub attributes: Vec<Attribute>,
}

/// Authorization decision statement within an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzDecisionStatement {
    /// Resource the decision applies to
    pub resource: String,
    /// Decision outcome
    pub decision: DecisionType,
    /// Actions the decision covers
    pub actions: Vec<Action>,
}

/// A SAML assertion returned in a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Assertion ID
    pub id: Option<String>,
    /// Issue instant; an assertion without one is always invalid
    pub issue_instant: Option<DateTime<Utc>>,
    /// Assertion issuer
    pub issuer: Option<Issuer>,
    /// Validity window, if stated
    pub conditions: Option<Conditions>,
    /// Attribute statements
    pub attribute_statements: Vec<AttributeStatement>,
    /// Authorization decision statements
    pub authz_decision_statements: Vec<AuthzDecisionStatement>,
}

/// A SAML response as returned by the remote query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Response ID
    pub id: Option<String>,
    /// Correlation ID: must match the ID of the query that produced it
    pub in_response_to: Option<String>,
    /// Response issue instant
    pub issue_instant: DateTime<Utc>,
    /// Response issuer
    pub issuer: Option<Issuer>,
    /// Outcome status
    pub status: Status,
    /// Assertions, in document order
    pub assertions: Vec<Assertion>,
}

impl Response {
    /// Create a success response shell correlated to a query ID.
    pub fn success(in_response_to: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: Some(format!("_{}", uuid::Uuid::new_v4())),
            in_response_to: Some(in_response_to.into()),
            issue_instant,
            issuer: None,
            status: Status {
                status_code: StatusCode::success(),
                status_message: None,
            },
            assertions: Vec::new(),
        }
    }
}
