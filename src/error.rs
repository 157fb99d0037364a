//! Error types for the SAML SOAP binding client.

use crate::model::Response;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Phase of the send cycle a transport-level failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    /// Serializing the query to XML
    Serialize,
    /// The wire-level SOAP call
    Transport,
    /// Deserializing the raw response
    Deserialize,
}

impl std::fmt::Display for SendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Serialize => "query serialization",
            Self::Transport => "transport send",
            Self::Deserialize => "response deserialization",
        };
        f.write_str(s)
    }
}

/// Errors raised by the request binding.
#[derive(Debug, Error)]
pub enum BindingError {
    /// Pre-send structural validation failed. Lists every missing required
    /// attribute, not just the first.
    #[error("missing attribute(s) for SAML query: {}", .missing.join(", "))]
    InvalidQuery {
        /// Names of all missing required attributes
        missing: Vec<String>,
    },

    /// A transport-level fault, tagged with the stage it occurred in.
    #[error("{stage} failed: {message}")]
    Transport {
        /// Send-cycle stage that failed
        stage: SendStage,
        /// Underlying failure description
        message: String,
    },

    /// Post-receipt semantic validation of the response failed.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Required client certificate material is absent or unusable.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// The destination URI could not be parsed or has no host component.
    #[error("invalid destination URI {uri:?}: {reason}")]
    InvalidDestination {
        /// The offending URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },
}

impl BindingError {
    /// Wrap a failure from one stage of the send cycle.
    pub fn at_stage(stage: SendStage, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            stage,
            message: err.to_string(),
        }
    }
}

/// Semantic validation failures for a received response.
///
/// Every variant carries the full offending [`Response`] so callers can
/// inspect or log it; use [`ResponseError::response`] to retrieve it.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The response status code was not the success URI.
    #[error("return status code flagged an error, {code:?}; the message is {message:?}")]
    ErrorStatus {
        /// Returned status code URI
        code: String,
        /// Status message, empty string when the server sent none
        message: String,
        /// The offending response
        response: Box<Response>,
    },

    /// The response does not correlate to the query that was sent.
    #[error(
        "response in-response-to ID {in_response_to:?} doesn't match the original query ID {query_id:?}"
    )]
    CorrelationMismatch {
        /// `InResponseTo` value from the response, if any
        in_response_to: Option<String>,
        /// ID assigned to the query at send time
        query_id: String,
        /// The offending response
        response: Box<Response>,
    },

    /// The response issue instant is after the skewed clock time.
    #[error("response issue instant [{issue_instant}] is after the clock time [{skewed_now}]")]
    ResponseIssueInstantInvalid {
        /// Issue instant from the response
        issue_instant: DateTime<Utc>,
        /// Upper bound: now plus the skew tolerance
        skewed_now: DateTime<Utc>,
        /// The offending response
        response: Box<Response>,
    },

    /// An assertion issue instant is missing or after the skewed clock time.
    #[error(
        "assertion issue instant {issue_instant:?} is invalid against the clock time [{skewed_now}]"
    )]
    AssertionIssueInstantInvalid {
        /// Issue instant from the assertion; `None` when not set at all
        issue_instant: Option<DateTime<Utc>>,
        /// Upper bound: now plus the skew tolerance
        skewed_now: DateTime<Utc>,
        /// The offending response
        response: Box<Response>,
    },

    /// The skewed clock time is before an assertion's notBefore time.
    #[error(
        "the clock time [{skewed_now}] is before the assertion conditions not-before time [{not_before}]"
    )]
    AssertionConditionNotBeforeInvalid {
        /// notBefore condition from the assertion
        not_before: DateTime<Utc>,
        /// Upper bound: now plus the skew tolerance
        skewed_now: DateTime<Utc>,
        /// The offending response
        response: Box<Response>,
    },

    /// The skewed clock time is on or after an assertion's notOnOrAfter time.
    #[error(
        "the clock time [{skewed_now}] is on or after the assertion conditions not-on-or-after time [{not_on_or_after}]"
    )]
    AssertionConditionNotOnOrAfterInvalid {
        /// notOnOrAfter condition from the assertion
        not_on_or_after: DateTime<Utc>,
        /// Lower bound: now minus the skew tolerance
        skewed_now: DateTime<Utc>,
        /// The offending response
        response: Box<Response>,
    },
}

impl ResponseError {
    /// The response that failed validation.
    pub fn response(&self) -> &Response {
        match self {
            Self::ErrorStatus { response, .. }
            | Self::CorrelationMismatch { response, .. }
            | Self::ResponseIssueInstantInvalid { response, .. }
            | Self::AssertionIssueInstantInvalid { response, .. }
            | Self::AssertionConditionNotBeforeInvalid { response, .. }
            | Self::AssertionConditionNotOnOrAfterInvalid { response, .. } => response,
        }
    }
}
