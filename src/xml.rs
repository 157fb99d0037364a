//! XML (de)serialization for queries and responses.
//!
//! Defines the pluggable [`QuerySerializer`] / [`ResponseDeserializer`]
//! collaborator traits and a default implementation, [`XmlCodec`], built on
//! quick-xml. The codec covers the subset of the SAML protocol schema the
//! binding needs: AttributeQuery and AuthzDecisionQuery documents on the
//! way out, Response documents (status, assertions, conditions, statements)
//! on the way in. [`XmlCodec`] can also write a Response, which services
//! answering queries and the test suite rely on.

use crate::model::{
    Action, Assertion, Attribute, AttributeStatement, AuthzDecisionStatement, Conditions,
    DecisionType, Issuer, NameId, Query, QueryBody, Response, Status, StatusCode, Subject,
    SAML_ASSERTION_NS, SAML_PROTOCOL_NS, SAML_VERSION,
};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum XmlCodecError {
    /// Input was not valid UTF-8
    #[error("invalid UTF-8 in document: {0}")]
    InvalidUtf8(String),

    /// Malformed XML
    #[error("XML parse error: {0}")]
    Parse(String),

    /// XML write failure
    #[error("XML write error: {0}")]
    Write(String),

    /// A required element was absent
    #[error("missing element: {0}")]
    MissingElement(&'static str),

    /// A required attribute or field was absent
    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),

    /// An attribute held a value outside its vocabulary
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Attribute name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// A timestamp attribute could not be parsed
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// Serializes an outbound query to bytes.
pub trait QuerySerializer {
    /// Serialize the query to an XML document.
    fn to_xml(&self, query: &Query) -> Result<Vec<u8>, XmlCodecError>;
}

/// Deserializes a raw response body into a [`Response`].
pub trait ResponseDeserializer {
    /// Parse an XML document into a response.
    fn from_xml(&self, data: &[u8]) -> Result<Response, XmlCodecError>;
}

/// Default quick-xml based codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

/// Wire format for xs:dateTime values.
fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, XmlCodecError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| XmlCodecError::InvalidTimestamp(value.to_string()))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Fetch an attribute by local name, ignoring namespace prefixes.
fn attr_value(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, XmlCodecError> {
    for attr in e.attributes().with_checks(false).flatten() {
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| XmlCodecError::Parse(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn write_err(err: quick_xml::Error) -> XmlCodecError {
    XmlCodecError::Write(err.to_string())
}

impl XmlCodec {
    fn write_issuer(
        writer: &mut Writer<Vec<u8>>,
        issuer: &Issuer,
    ) -> Result<(), XmlCodecError> {
        let mut start = BytesStart::new("saml:Issuer");
        if let Some(format) = &issuer.format {
            start.push_attribute(("Format", format.as_str()));
        }
        writer.write_event(Event::Start(start)).map_err(write_err)?;
        if let Some(value) = &issuer.value {
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(write_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("saml:Issuer")))
            .map_err(write_err)?;
        Ok(())
    }

    fn write_subject(
        writer: &mut Writer<Vec<u8>>,
        subject: &Subject,
    ) -> Result<(), XmlCodecError> {
        writer
            .write_event(Event::Start(BytesStart::new("saml:Subject")))
            .map_err(write_err)?;

        let mut name_id = BytesStart::new("saml:NameID");
        if let Some(format) = &subject.name_id.format {
            name_id.push_attribute(("Format", format.as_str()));
        }
        writer
            .write_event(Event::Start(name_id))
            .map_err(write_err)?;
        writer
            .write_event(Event::Text(BytesText::new(&subject.name_id.value)))
            .map_err(write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("saml:NameID")))
            .map_err(write_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("saml:Subject")))
            .map_err(write_err)?;
        Ok(())
    }

    fn write_attribute(
        writer: &mut Writer<Vec<u8>>,
        attribute: &Attribute,
    ) -> Result<(), XmlCodecError> {
        let mut start = BytesStart::new("saml:Attribute");
        start.push_attribute(("Name", attribute.name.as_str()));
        if let Some(name_format) = &attribute.name_format {
            start.push_attribute(("NameFormat", name_format.as_str()));
        }
        if let Some(friendly_name) = &attribute.friendly_name {
            start.push_attribute(("FriendlyName", friendly_name.as_str()));
        }

        if attribute.values.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(write_err)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(write_err)?;
        for value in &attribute.values {
            writer
                .write_event(Event::Start(BytesStart::new("saml:AttributeValue")))
                .map_err(write_err)?;
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(write_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("saml:AttributeValue")))
                .map_err(write_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("saml:Attribute")))
            .map_err(write_err)?;
        Ok(())
    }

    fn write_action(writer: &mut Writer<Vec<u8>>, action: &Action) -> Result<(), XmlCodecError> {
        let mut start = BytesStart::new("saml:Action");
        start.push_attribute(("Namespace", action.namespace.as_str()));
        writer.write_event(Event::Start(start)).map_err(write_err)?;
        writer
            .write_event(Event::Text(BytesText::new(&action.value)))
            .map_err(write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("saml:Action")))
            .map_err(write_err)?;
        Ok(())
    }

    /// Serialize a response document. The client binding never sends
    /// responses; this is the counterpart a query service (or a test
    /// transport) uses to answer.
    pub fn response_to_xml(&self, response: &Response) -> Result<Vec<u8>, XmlCodecError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;

        let mut root = BytesStart::new("samlp:Response");
        root.push_attribute(("xmlns:samlp", SAML_PROTOCOL_NS));
        root.push_attribute(("xmlns:saml", SAML_ASSERTION_NS));
        if let Some(id) = &response.id {
            root.push_attribute(("ID", id.as_str()));
        }
        if let Some(in_response_to) = &response.in_response_to {
            root.push_attribute(("InResponseTo", in_response_to.as_str()));
        }
        root.push_attribute(("Version", SAML_VERSION));
        root.push_attribute(("IssueInstant", format_instant(response.issue_instant).as_str()));
        writer.write_event(Event::Start(root)).map_err(write_err)?;

        if let Some(issuer) = &response.issuer {
            Self::write_issuer(&mut writer, issuer)?;
        }

        writer
            .write_event(Event::Start(BytesStart::new("samlp:Status")))
            .map_err(write_err)?;
        let mut status_code = BytesStart::new("samlp:StatusCode");
        status_code.push_attribute(("Value", response.status.status_code.value.as_str()));
        writer
            .write_event(Event::Empty(status_code))
            .map_err(write_err)?;
        if let Some(message) = &response.status.status_message {
            writer
                .write_event(Event::Start(BytesStart::new("samlp:StatusMessage")))
                .map_err(write_err)?;
            writer
                .write_event(Event::Text(BytesText::new(message)))
                .map_err(write_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("samlp:StatusMessage")))
                .map_err(write_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("samlp:Status")))
            .map_err(write_err)?;

        for assertion in &response.assertions {
            Self::write_assertion(&mut writer, assertion)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("samlp:Response")))
            .map_err(write_err)?;
        Ok(writer.into_inner())
    }

    fn write_assertion(
        writer: &mut Writer<Vec<u8>>,
        assertion: &Assertion,
    ) -> Result<(), XmlCodecError> {
        let mut start = BytesStart::new("saml:Assertion");
        if let Some(id) = &assertion.id {
            start.push_attribute(("ID", id.as_str()));
        }
        start.push_attribute(("Version", SAML_VERSION));
        if let Some(instant) = assertion.issue_instant {
            start.push_attribute(("IssueInstant", format_instant(instant).as_str()));
        }
        writer.write_event(Event::Start(start)).map_err(write_err)?;

        if let Some(issuer) = &assertion.issuer {
            Self::write_issuer(writer, issuer)?;
        }

        if let Some(conditions) = &assertion.conditions {
            let mut cond = BytesStart::new("saml:Conditions");
            if let Some(not_before) = conditions.not_before {
                cond.push_attribute(("NotBefore", format_instant(not_before).as_str()));
            }
            if let Some(not_on_or_after) = conditions.not_on_or_after {
                cond.push_attribute(("NotOnOrAfter", format_instant(not_on_or_after).as_str()));
            }
            writer.write_event(Event::Empty(cond)).map_err(write_err)?;
        }

        for statement in &assertion.attribute_statements {
            writer
                .write_event(Event::Start(BytesStart::new("saml:AttributeStatement")))
                .map_err(write_err)?;
            for attribute in &statement.attributes {
                Self::write_attribute(writer, attribute)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("saml:AttributeStatement")))
                .map_err(write_err)?;
        }

        for statement in &assertion.authz_decision_statements {
            let mut start = BytesStart::new("saml:AuthzDecisionStatement");
            start.push_attribute(("Resource", statement.resource.as_str()));
            let decision = match statement.decision {
                DecisionType::Permit => "Permit",
                DecisionType::Deny => "Deny",
                DecisionType::Indeterminate => "Indeterminate",
            };
            start.push_attribute(("Decision", decision));
            writer.write_event(Event::Start(start)).map_err(write_err)?;
            for action in &statement.actions {
                Self::write_action(writer, action)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("saml:AuthzDecisionStatement")))
                .map_err(write_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("saml:Assertion")))
            .map_err(write_err)?;
        Ok(())
    }
}

impl QuerySerializer for XmlCodec {
    fn to_xml(&self, query: &Query) -> Result<Vec<u8>, XmlCodecError> {
        let id = query
            .id
            .as_deref()
            .ok_or(XmlCodecError::MissingAttribute("ID"))?;
        let issue_instant = query
            .issue_instant
            .ok_or(XmlCodecError::MissingAttribute("IssueInstant"))?;

        let root_name = match &query.body {
            QueryBody::Attribute { .. } => "samlp:AttributeQuery",
            QueryBody::AuthzDecision { .. } => "samlp:AuthzDecisionQuery",
        };

        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;

        let mut root = BytesStart::new(root_name);
        root.push_attribute(("xmlns:samlp", SAML_PROTOCOL_NS));
        root.push_attribute(("xmlns:saml", SAML_ASSERTION_NS));
        root.push_attribute(("ID", id));
        root.push_attribute(("Version", SAML_VERSION));
        root.push_attribute(("IssueInstant", format_instant(issue_instant).as_str()));
        if let QueryBody::AuthzDecision { resource, .. } = &query.body {
            root.push_attribute(("Resource", resource.as_str()));
        }
        writer.write_event(Event::Start(root)).map_err(write_err)?;

        if let Some(issuer) = &query.issuer {
            Self::write_issuer(&mut writer, issuer)?;
        }
        if let Some(subject) = &query.subject {
            Self::write_subject(&mut writer, subject)?;
        }

        match &query.body {
            QueryBody::Attribute { attributes } => {
                for attribute in attributes {
                    Self::write_attribute(&mut writer, attribute)?;
                }
            }
            QueryBody::AuthzDecision { actions, .. } => {
                for action in actions {
                    Self::write_action(&mut writer, action)?;
                }
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new(root_name)))
            .map_err(write_err)?;
        Ok(writer.into_inner())
    }
}

impl ResponseDeserializer for XmlCodec {
    fn from_xml(&self, data: &[u8]) -> Result<Response, XmlCodecError> {
        let xml = std::str::from_utf8(data)
            .map_err(|e| XmlCodecError::InvalidUtf8(e.to_string()))?;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut response: Option<Response> = None;
        let mut assertions: Vec<Assertion> = Vec::new();

        let mut current_assertion: Option<Assertion> = None;
        let mut current_statement: Option<AttributeStatement> = None;
        let mut current_authz: Option<AuthzDecisionStatement> = None;
        let mut current_attribute: Option<Attribute> = None;
        let mut current_action_ns: Option<String> = None;
        let mut current_element = String::new();

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(ref event @ Event::Start(ref e)) | Ok(ref event @ Event::Empty(ref e)) => {
                    let name = local_name(e);
                    let is_empty = matches!(event, Event::Empty(_));
                    if !is_empty {
                        current_element = name.clone();
                    }

                    match name.as_str() {
                        "Response" => {
                            if let Some(version) = attr_value(e, "Version")? {
                                if version != SAML_VERSION {
                                    return Err(XmlCodecError::InvalidValue {
                                        name: "Version",
                                        value: version,
                                    });
                                }
                            }
                            let issue_instant = attr_value(e, "IssueInstant")?
                                .ok_or(XmlCodecError::MissingAttribute("IssueInstant"))?;
                            response = Some(Response {
                                id: attr_value(e, "ID")?,
                                in_response_to: attr_value(e, "InResponseTo")?,
                                issue_instant: parse_instant(&issue_instant)?,
                                issuer: None,
                                status: Status::default(),
                                assertions: Vec::new(),
                            });
                        }
                        "StatusCode" => {
                            let value = attr_value(e, "Value")?
                                .ok_or(XmlCodecError::MissingAttribute("Value"))?;
                            if let Some(resp) = response.as_mut() {
                                resp.status.status_code = StatusCode { value };
                            }
                        }
                        "Issuer" => {
                            let issuer = Issuer {
                                value: None,
                                format: attr_value(e, "Format")?,
                            };
                            if let Some(assertion) = current_assertion.as_mut() {
                                assertion.issuer = Some(issuer);
                            } else if let Some(resp) = response.as_mut() {
                                resp.issuer = Some(issuer);
                            }
                        }
                        "Assertion" => {
                            let issue_instant = match attr_value(e, "IssueInstant")? {
                                Some(value) => Some(parse_instant(&value)?),
                                None => None,
                            };
                            current_assertion = Some(Assertion {
                                id: attr_value(e, "ID")?,
                                issue_instant,
                                issuer: None,
                                conditions: None,
                                attribute_statements: Vec::new(),
                                authz_decision_statements: Vec::new(),
                            });
                        }
                        "Conditions" => {
                            let not_before = match attr_value(e, "NotBefore")? {
                                Some(value) => Some(parse_instant(&value)?),
                                None => None,
                            };
                            let not_on_or_after = match attr_value(e, "NotOnOrAfter")? {
                                Some(value) => Some(parse_instant(&value)?),
                                None => None,
                            };
                            if let Some(assertion) = current_assertion.as_mut() {
                                assertion.conditions = Some(Conditions {
                                    not_before,
                                    not_on_or_after,
                                });
                            }
                        }
                        "AttributeStatement" => {
                            current_statement = Some(AttributeStatement::default());
                        }
                        "AuthzDecisionStatement" => {
                            let resource = attr_value(e, "Resource")?
                                .ok_or(XmlCodecError::MissingAttribute("Resource"))?;
                            let decision_raw = attr_value(e, "Decision")?
                                .ok_or(XmlCodecError::MissingAttribute("Decision"))?;
                            let decision = match decision_raw.as_str() {
                                "Permit" => DecisionType::Permit,
                                "Deny" => DecisionType::Deny,
                                "Indeterminate" => DecisionType::Indeterminate,
                                _ => {
                                    return Err(XmlCodecError::InvalidValue {
                                        name: "Decision",
                                        value: decision_raw,
                                    })
                                }
                            };
                            current_authz = Some(AuthzDecisionStatement {
                                resource,
                                decision,
                                actions: Vec::new(),
                            });
                        }
                        "Attribute" => {
                            current_attribute = Some(Attribute {
                                name: attr_value(e, "Name")?
                                    .ok_or(XmlCodecError::MissingAttribute("Name"))?,
                                name_format: attr_value(e, "NameFormat")?,
                                friendly_name: attr_value(e, "FriendlyName")?,
                                values: Vec::new(),
                            });
                        }
                        "Action" => {
                            current_action_ns = attr_value(e, "Namespace")?;
                        }
                        _ => {}
                    }

                    // Self-closing elements get no End event; close out the
                    // ones that carry state.
                    if is_empty {
                        if name == "Attribute" {
                            if let (Some(statement), Some(attribute)) =
                                (current_statement.as_mut(), current_attribute.take())
                            {
                                statement.attributes.push(attribute);
                            }
                        }
                        if name == "Action" {
                            current_action_ns = None;
                        }
                    }
                }

                Ok(Event::Text(ref e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| XmlCodecError::Parse(err.to_string()))?
                        .into_owned();

                    match current_element.as_str() {
                        "Issuer" => {
                            if let Some(assertion) = current_assertion.as_mut() {
                                if let Some(issuer) = assertion.issuer.as_mut() {
                                    issuer.value = Some(text);
                                }
                            } else if let Some(issuer) =
                                response.as_mut().and_then(|r| r.issuer.as_mut())
                            {
                                issuer.value = Some(text);
                            }
                        }
                        "StatusMessage" => {
                            if let Some(resp) = response.as_mut() {
                                resp.status.status_message = Some(text);
                            }
                        }
                        "AttributeValue" => {
                            if let Some(attribute) = current_attribute.as_mut() {
                                attribute.values.push(text);
                            }
                        }
                        "Action" => {
                            if let Some(authz) = current_authz.as_mut() {
                                authz.actions.push(Action {
                                    namespace: current_action_ns
                                        .clone()
                                        .unwrap_or_else(|| Action::RWEDC_NEGATION_NS.to_string()),
                                    value: text,
                                });
                            }
                        }
                        _ => {}
                    }
                }

                Ok(Event::End(ref e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    current_element.clear();

                    match name.as_str() {
                        "Attribute" => {
                            if let (Some(statement), Some(attribute)) =
                                (current_statement.as_mut(), current_attribute.take())
                            {
                                statement.attributes.push(attribute);
                            }
                        }
                        "AttributeStatement" => {
                            if let (Some(assertion), Some(statement)) =
                                (current_assertion.as_mut(), current_statement.take())
                            {
                                assertion.attribute_statements.push(statement);
                            }
                        }
                        "AuthzDecisionStatement" => {
                            if let (Some(assertion), Some(authz)) =
                                (current_assertion.as_mut(), current_authz.take())
                            {
                                assertion.authz_decision_statements.push(authz);
                            }
                        }
                        "Assertion" => {
                            if let Some(assertion) = current_assertion.take() {
                                assertions.push(assertion);
                            }
                        }
                        "Action" => {
                            current_action_ns = None;
                        }
                        _ => {}
                    }
                }

                Ok(Event::Eof) => break,

                Err(e) => return Err(XmlCodecError::Parse(e.to_string())),

                _ => {}
            }

            buf.clear();
        }

        let mut response = response.ok_or(XmlCodecError::MissingElement("Response"))?;
        if response.status.status_code.value.is_empty() {
            return Err(XmlCodecError::MissingElement("StatusCode"));
        }
        response.assertions = assertions;
        Ok(response)
    }
}
