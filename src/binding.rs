//! Send/correlate protocol driver for SAML queries over SOAP.
//!
//! [`RequestSoapBinding`] owns the full request cycle: pre-send structural
//! validation, stamping of a fresh correlation ID and issue instant,
//! delegation to the transport, then status, correlation and time-condition
//! checks on the returned response. [`MutualTlsSoapBinding`] layers a
//! per-call client-certificate TLS context on top.

use crate::config::{BindingConfig, TlsConfig};
use crate::error::{BindingError, ResponseError, SendStage};
use crate::model::{Query, Response};
use crate::transport::{SoapTransport, TlsContext, CONTENT_TYPE};
use crate::validator::TimeConditionValidator;
use crate::xml::{QuerySerializer, ResponseDeserializer, XmlCodec};
use chrono::Utc;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// SAML request SOAP binding client.
///
/// One instance per remote service is typical; instances hold no mutable
/// state across calls and may be shared between threads, provided each
/// caller owns the `Query` it sends.
pub struct RequestSoapBinding<T: SoapTransport> {
    transport: T,
    config: BindingConfig,
    validator: TimeConditionValidator,
    serializer: Box<dyn QuerySerializer + Send + Sync>,
    deserializer: Box<dyn ResponseDeserializer + Send + Sync>,
}

impl<T: SoapTransport> RequestSoapBinding<T> {
    /// Create a binding with the default XML codec.
    pub fn new(transport: T, config: BindingConfig) -> Self {
        Self::with_codec(transport, config, Box::new(XmlCodec), Box::new(XmlCodec))
    }

    /// Create a binding with explicit serializer/deserializer collaborators.
    pub fn with_codec(
        transport: T,
        config: BindingConfig,
        serializer: Box<dyn QuerySerializer + Send + Sync>,
        deserializer: Box<dyn ResponseDeserializer + Send + Sync>,
    ) -> Self {
        let validator = TimeConditionValidator::from_config(&config);
        Self {
            transport,
            config,
            validator,
            serializer,
            deserializer,
        }
    }

    /// The binding configuration.
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Sanity check immediately before initializing and sending the query.
    ///
    /// Collects every missing required attribute so the error names the
    /// complete set in one pass. Pure: the query is not modified.
    pub fn validate_query(query: &Query) -> Result<(), BindingError> {
        let mut missing = Vec::new();

        if query.issuer.as_ref().and_then(|i| i.value.as_ref()).map_or(true, |v| v.is_empty()) {
            missing.push("issuer name".to_string());
        }
        if query.issuer.as_ref().and_then(|i| i.format.as_ref()).map_or(true, |f| f.is_empty()) {
            missing.push("issuer format".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BindingError::InvalidQuery { missing })
        }
    }

    /// Final initialization prior to sending: stamp the issue instant and a
    /// fresh correlation ID. A retry must come back through here so it
    /// never reuses an earlier ID.
    pub fn init_send(query: &mut Query) {
        query.issue_instant = Some(Utc::now());
        query.id = Some(Uuid::new_v4().to_string());
    }

    /// Send `query` to the service at `destination` and validate the
    /// response.
    ///
    /// Mutates the query's `id` and `issue_instant`. No retries are
    /// performed; a failed call leaves the caller free to `send` again,
    /// which establishes a new correlation identity.
    pub fn send(&self, query: &mut Query, destination: &str) -> Result<Response, BindingError> {
        self.send_with_tls(query, destination, None)
    }

    /// Send with an optional per-call TLS context (mutual-TLS variant).
    pub(crate) fn send_with_tls(
        &self,
        query: &mut Query,
        destination: &str,
        tls: Option<&TlsContext>,
    ) -> Result<Response, BindingError> {
        Self::validate_query(query)?;
        Self::init_send(query);

        // Set by init_send just above
        let query_id = query.id.clone().unwrap_or_default();
        debug!(query_id = %query_id, destination, "sending SAML query");

        let body = self
            .serializer
            .to_xml(query)
            .map_err(|e| BindingError::at_stage(SendStage::Serialize, e))?;

        let headers = vec![("Content-Type".to_string(), CONTENT_TYPE.to_string())];
        let raw = self
            .transport
            .send(&body, destination, &headers, tls)
            .map_err(|e| BindingError::at_stage(SendStage::Transport, e))?;

        let response = self
            .deserializer
            .from_xml(&raw)
            .map_err(|e| BindingError::at_stage(SendStage::Deserialize, e))?;

        if !response.status.status_code.is_success() {
            // Server response may omit the status message
            let message = response.status.status_message.clone().unwrap_or_default();
            return Err(ResponseError::ErrorStatus {
                code: response.status.status_code.value.clone(),
                message,
                response: Box::new(response),
            }
            .into());
        }

        if response.in_response_to.as_deref() != Some(query_id.as_str()) {
            return Err(ResponseError::CorrelationMismatch {
                in_response_to: response.in_response_to.clone(),
                query_id,
                response: Box::new(response),
            }
            .into());
        }

        self.validator.verify(&response, Utc::now())?;

        debug!(query_id = %query_id, "SAML query succeeded");
        Ok(response)
    }
}

/// Mutually-authenticated variant of [`RequestSoapBinding`].
///
/// Before each send the expected server hostname is derived from the
/// destination URI and combined with the configured client certificate
/// material into a [`TlsContext`] scoped to that single call, so a change
/// of destination host between calls can never reuse stale material.
pub struct MutualTlsSoapBinding<T: SoapTransport> {
    inner: RequestSoapBinding<T>,
    tls: TlsConfig,
}

impl<T: SoapTransport> MutualTlsSoapBinding<T> {
    /// Create a mutual-TLS binding.
    pub fn new(transport: T, config: BindingConfig, tls: TlsConfig) -> Self {
        Self {
            inner: RequestSoapBinding::new(transport, config),
            tls,
        }
    }

    /// The client certificate configuration.
    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls
    }

    /// Build the per-call TLS context for `destination`.
    ///
    /// Fails if the URI has no host component or the configured certificate
    /// material is absent at call time.
    fn tls_context(&self, destination: &str) -> Result<TlsContext, BindingError> {
        let url = Url::parse(destination).map_err(|e| BindingError::InvalidDestination {
            uri: destination.to_string(),
            reason: e.to_string(),
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| BindingError::InvalidDestination {
                uri: destination.to_string(),
                reason: "no host component".to_string(),
            })?;

        for (label, path) in [
            ("client certificate file", &self.tls.certificate_file),
            ("client private key file", &self.tls.private_key_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(BindingError::TlsConfig(format!("{label} is not set")));
            }
            if !path.exists() {
                return Err(BindingError::TlsConfig(format!(
                    "{label} {} does not exist",
                    path.display()
                )));
            }
        }

        Ok(TlsContext {
            expected_hostname: host.to_string(),
            certificate_file: self.tls.certificate_file.clone(),
            private_key_file: self.tls.private_key_file.clone(),
            ca_cert_dir: self.tls.ca_cert_dir.clone(),
        })
    }

    /// Send `query` over a mutually-authenticated channel.
    pub fn send(&self, query: &mut Query, destination: &str) -> Result<Response, BindingError> {
        let tls = self.tls_context(destination)?;
        self.inner.send_with_tls(query, destination, Some(&tls))
    }
}
