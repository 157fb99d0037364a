//! Integration tests for the saml-soap-binding crate.
//!
//! These tests exercise the public API surface end-to-end: query
//! construction, the send/correlate driver, response validation and the
//! mutual-TLS variant, all over a mock transport.

use chrono::{Duration, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use saml_soap_binding::config::{BindingConfig, TlsConfig};
use saml_soap_binding::error::{BindingError, ResponseError, SendStage};
use saml_soap_binding::model::{
    Assertion, Attribute, AttributeStatement, Conditions, Issuer, Query, Response, Status,
    StatusCode, Subject,
};
use saml_soap_binding::transport::{SoapTransport, TlsContext, TransportError};
use saml_soap_binding::xml::XmlCodec;
use saml_soap_binding::{MutualTlsSoapBinding, RequestSoapBinding};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock transport
// ============================================================================

/// State captured by the mock transport, shared with the test body.
#[derive(Clone, Default)]
struct Capture {
    query_ids: Arc<Mutex<Vec<String>>>,
    tls: Arc<Mutex<Option<TlsContext>>>,
    headers: Arc<Mutex<Vec<(String, String)>>>,
}

/// Transport that parses the outbound query ID and answers with a canned
/// response built by the `respond` hook.
struct MockTransport {
    capture: Capture,
    respond: Box<dyn Fn(&str) -> Response + Send + Sync>,
}

impl MockTransport {
    fn new(respond: impl Fn(&str) -> Response + Send + Sync + 'static) -> (Self, Capture) {
        let capture = Capture::default();
        (
            Self {
                capture: capture.clone(),
                respond: Box::new(respond),
            },
            capture,
        )
    }
}

impl SoapTransport for MockTransport {
    fn send(
        &self,
        body: &[u8],
        _destination: &str,
        headers: &[(String, String)],
        tls: Option<&TlsContext>,
    ) -> Result<Vec<u8>, TransportError> {
        let query_id = extract_query_id(body);
        self.capture.query_ids.lock().unwrap().push(query_id.clone());
        *self.capture.tls.lock().unwrap() = tls.cloned();
        *self.capture.headers.lock().unwrap() = headers.to_vec();

        let response = (self.respond)(&query_id);
        Ok(XmlCodec.response_to_xml(&response).unwrap())
    }
}

/// Transport that fails every call.
struct FailingTransport;

impl SoapTransport for FailingTransport {
    fn send(
        &self,
        _body: &[u8],
        _destination: &str,
        _headers: &[(String, String)],
        _tls: Option<&TlsContext>,
    ) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::HttpStatus { status: 500 })
    }
}

/// Transport that returns a body the deserializer cannot parse.
struct GarbageTransport;

impl SoapTransport for GarbageTransport {
    fn send(
        &self,
        _body: &[u8],
        _destination: &str,
        _headers: &[(String, String)],
        _tls: Option<&TlsContext>,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(b"<html>502 Bad Gateway</html>".to_vec())
    }
}

/// Pull the ID attribute off the root query element.
fn extract_query_id(body: &[u8]) -> String {
    let xml = std::str::from_utf8(body).expect("query body is UTF-8");
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().expect("query body parses") {
            Event::Start(e) | Event::Empty(e) => {
                for attr in e.attributes().with_checks(false).flatten() {
                    if attr.key.local_name().as_ref() == b"ID" {
                        return String::from_utf8_lossy(&attr.value).into_owned();
                    }
                }
            }
            Event::Eof => panic!("no ID attribute found in query"),
            _ => {}
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

const DESTINATION: &str = "https://attributeservice.localhost/saml/attribute-authority";

fn attribute_query() -> Query {
    let mut query = Query::attribute_query(
        Issuer::new(Issuer::X509_SUBJECT_NAME_FORMAT, "/O=Site A/CN=Authority"),
        Subject::new("https://openid.localhost/philip.kershaw", "urn:esg:openid"),
    );
    query.add_attribute(Attribute::new(
        "urn:esg:email:address",
        "http://www.w3.org/2001/XMLSchema#string",
    ));
    query
}

/// A well-formed success response echoing the given query ID.
fn good_response(query_id: &str) -> Response {
    let now = Utc::now();
    let mut response = Response::success(query_id, now);
    response.issuer = Some(Issuer::new(
        Issuer::X509_SUBJECT_NAME_FORMAT,
        "/O=Site A/CN=Authority",
    ));
    response.assertions.push(Assertion {
        id: Some("_a1".to_string()),
        issue_instant: Some(now),
        issuer: response.issuer.clone(),
        conditions: Some(Conditions {
            not_before: Some(now - Duration::minutes(2)),
            not_on_or_after: Some(now + Duration::hours(8)),
        }),
        attribute_statements: vec![AttributeStatement {
            attributes: vec![Attribute {
                name: "urn:esg:email:address".to_string(),
                name_format: Some("http://www.w3.org/2001/XMLSchema#string".to_string()),
                friendly_name: None,
                values: vec!["pjk@somewhere.ac.uk".to_string()],
            }],
        }],
        authz_decision_statements: Vec::new(),
    });
    response
}

// ============================================================================
// End-to-end success path
// ============================================================================

#[test]
fn test_e2e_attribute_query_success() {
    let (transport, _capture) = MockTransport::new(good_response);
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let mut query = attribute_query();
    let response = binding.send(&mut query, DESTINATION).unwrap();

    assert!(response.status.status_code.is_success());
    assert_eq!(response.in_response_to, query.id);
    assert_eq!(response.assertions.len(), 1);
    assert_eq!(
        response.assertions[0].attribute_statements[0].attributes[0].values[0],
        "pjk@somewhere.ac.uk"
    );
}

#[test]
fn test_send_stamps_fresh_id_and_instant() {
    let (transport, _capture) = MockTransport::new(good_response);
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let mut query = attribute_query();
    assert!(query.id.is_none());

    let before = Utc::now();
    binding.send(&mut query, DESTINATION).unwrap();

    assert!(query.id.is_some());
    let instant = query.issue_instant.unwrap();
    assert!(instant >= before && instant <= Utc::now());
}

#[test]
fn test_consecutive_sends_use_distinct_correlation_ids() {
    let (transport, capture) = MockTransport::new(good_response);
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let mut query = attribute_query();
    binding.send(&mut query, DESTINATION).unwrap();
    binding.send(&mut query, DESTINATION).unwrap();

    let seen = capture.query_ids.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0], seen[1]);
}

#[test]
fn test_content_type_header_is_sent() {
    let (transport, capture) = MockTransport::new(good_response);
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    binding.send(&mut attribute_query(), DESTINATION).unwrap();

    let headers = capture.headers.lock().unwrap();
    assert!(headers
        .iter()
        .any(|(name, value)| name == "Content-Type" && value == "text/xml"));
}

// ============================================================================
// Pre-send validation
// ============================================================================

#[test]
fn test_missing_issuer_fields_reported_together() {
    let (transport, capture) = MockTransport::new(good_response);
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let mut query = attribute_query();
    query.issuer = None;

    let err = binding.send(&mut query, DESTINATION).unwrap_err();
    match err {
        BindingError::InvalidQuery { missing } => {
            assert!(missing.contains(&"issuer name".to_string()));
            assert!(missing.contains(&"issuer format".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Never reached the wire
    assert!(capture.query_ids.lock().unwrap().is_empty());
}

// ============================================================================
// Status and correlation checks
// ============================================================================

#[test]
fn test_error_status_raises_with_code_and_empty_message() {
    let (transport, _capture) = MockTransport::new(|query_id| {
        let mut response = Response::success(query_id, Utc::now());
        response.status = Status {
            status_code: StatusCode {
                value: StatusCode::REQUESTER_URI.to_string(),
            },
            status_message: None,
        };
        response
    });
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    match err {
        BindingError::Response(ResponseError::ErrorStatus { code, message, .. }) => {
            assert_eq!(code, StatusCode::REQUESTER_URI);
            assert_eq!(message, "");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_error_status_carries_server_message() {
    let (transport, _capture) = MockTransport::new(|query_id| {
        let mut response = Response::success(query_id, Utc::now());
        response.status = Status {
            status_code: StatusCode {
                value: StatusCode::UNKNOWN_PRINCIPAL_URI.to_string(),
            },
            status_message: Some("no such principal".to_string()),
        };
        response
    });
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    match err {
        BindingError::Response(ResponseError::ErrorStatus { message, response, .. }) => {
            assert_eq!(message, "no such principal");
            assert!(response.assertions.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_correlation_mismatch_names_both_ids() {
    let (transport, capture) =
        MockTransport::new(|_query_id| good_response("some-stale-id"));
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    let sent_id = capture.query_ids.lock().unwrap()[0].clone();

    match err {
        BindingError::Response(ResponseError::CorrelationMismatch {
            in_response_to,
            query_id,
            ..
        }) => {
            assert_eq!(in_response_to.as_deref(), Some("some-stale-id"));
            assert_eq!(query_id, sent_id);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Time-condition validation through the driver
// ============================================================================

#[test]
fn test_future_response_instant_rejected_with_zero_skew() {
    let (transport, _capture) = MockTransport::new(|query_id| {
        Response::success(query_id, Utc::now() + Duration::seconds(30))
    });
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    assert!(matches!(
        err,
        BindingError::Response(ResponseError::ResponseIssueInstantInvalid { .. })
    ));
}

#[test]
fn test_future_response_instant_allowed_within_skew() {
    let (transport, _capture) = MockTransport::new(|query_id| {
        let mut response = good_response(query_id);
        response.issue_instant = Utc::now() + Duration::seconds(3);
        response
    });
    let config = BindingConfig {
        clock_skew_secs: 5,
        verify_time_conditions: true,
    };
    let binding = RequestSoapBinding::new(transport, config);

    assert!(binding.send(&mut attribute_query(), DESTINATION).is_ok());
}

#[test]
fn test_expired_assertion_rejected() {
    let (transport, _capture) = MockTransport::new(|query_id| {
        let now = Utc::now();
        let mut response = good_response(query_id);
        response.assertions[0].conditions = Some(Conditions {
            not_before: Some(now - Duration::hours(9)),
            not_on_or_after: Some(now - Duration::hours(1)),
        });
        response
    });
    let binding = RequestSoapBinding::new(transport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    match err {
        BindingError::Response(err @ ResponseError::AssertionConditionNotOnOrAfterInvalid { .. }) => {
            // Offending response travels with the error for diagnostics
            assert_eq!(err.response().assertions.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_disabled_time_verification_accepts_stale_response() {
    let (transport, _capture) = MockTransport::new(|query_id| {
        let mut response = good_response(query_id);
        response.issue_instant = Utc::now() + Duration::hours(1);
        response.assertions[0].issue_instant = None;
        response
    });
    let config = BindingConfig {
        clock_skew_secs: 0,
        verify_time_conditions: false,
    };
    let binding = RequestSoapBinding::new(transport, config);

    assert!(binding.send(&mut attribute_query(), DESTINATION).is_ok());
}

// ============================================================================
// Transport faults
// ============================================================================

#[test]
fn test_transport_failure_tagged_with_stage() {
    let binding = RequestSoapBinding::new(FailingTransport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    match err {
        BindingError::Transport { stage, message } => {
            assert_eq!(stage, SendStage::Transport);
            assert!(message.contains("500"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unparseable_response_tagged_as_deserialization_failure() {
    let binding = RequestSoapBinding::new(GarbageTransport, BindingConfig::default());

    let err = binding.send(&mut attribute_query(), DESTINATION).unwrap_err();
    match err {
        BindingError::Transport { stage, .. } => assert_eq!(stage, SendStage::Deserialize),
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Mutual TLS
// ============================================================================

fn temp_pem(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("saml-soap-binding-test-{name}-{}", std::process::id()));
    std::fs::write(&path, "-----BEGIN TEST-----\n-----END TEST-----\n").unwrap();
    path
}

#[test]
fn test_mutual_tls_builds_per_call_context() {
    let cert = temp_pem("cert");
    let key = temp_pem("key");

    let (transport, capture) = MockTransport::new(good_response);
    let binding = MutualTlsSoapBinding::new(
        transport,
        BindingConfig::default(),
        TlsConfig {
            certificate_file: cert.clone(),
            private_key_file: key.clone(),
            ca_cert_dir: None,
        },
    );

    binding
        .send(&mut attribute_query(), "https://attributeservice.localhost:5443/saml")
        .unwrap();

    let tls = capture.tls.lock().unwrap().clone().expect("TLS context passed");
    assert_eq!(tls.expected_hostname, "attributeservice.localhost");
    assert_eq!(tls.certificate_file, cert);
    assert_eq!(tls.private_key_file, key);

    let _ = std::fs::remove_file(cert);
    let _ = std::fs::remove_file(key);
}

#[test]
fn test_mutual_tls_fails_without_certificate_material() {
    let (transport, capture) = MockTransport::new(good_response);
    let binding = MutualTlsSoapBinding::new(
        transport,
        BindingConfig::default(),
        TlsConfig::default(),
    );

    let err = binding
        .send(&mut attribute_query(), "https://attributeservice.localhost/saml")
        .unwrap_err();
    assert!(matches!(err, BindingError::TlsConfig(_)));
    // Failed before the query was initialized or sent
    assert!(capture.query_ids.lock().unwrap().is_empty());
}

#[test]
fn test_mutual_tls_missing_key_file_reported() {
    let cert = temp_pem("cert-only");

    let (transport, _capture) = MockTransport::new(good_response);
    let binding = MutualTlsSoapBinding::new(
        transport,
        BindingConfig::default(),
        TlsConfig {
            certificate_file: cert.clone(),
            private_key_file: std::path::PathBuf::from("/nonexistent/client.key"),
            ca_cert_dir: None,
        },
    );

    let err = binding
        .send(&mut attribute_query(), "https://attributeservice.localhost/saml")
        .unwrap_err();
    match err {
        BindingError::TlsConfig(message) => assert!(message.contains("client private key file")),
        other => panic!("unexpected error: {other}"),
    }

    let _ = std::fs::remove_file(cert);
}
