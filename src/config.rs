//! Configuration types for the SAML SOAP binding client.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a request binding instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Allowed clock skew in seconds, applied symmetrically around "now"
    /// when checking response and assertion timestamps
    pub clock_skew_secs: u64,

    /// Verify issue instants and assertion time conditions on responses
    pub verify_time_conditions: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 0,
            verify_time_conditions: true,
        }
    }
}

impl BindingConfig {
    /// Clock skew tolerance as a duration.
    pub fn clock_skew(&self) -> Duration {
        Duration::seconds(self.clock_skew_secs as i64)
    }
}

/// Client certificate material for the mutual-TLS binding variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Client certificate file (PEM)
    pub certificate_file: PathBuf,

    /// Client private key file (PEM)
    pub private_key_file: PathBuf,

    /// Directory of trusted CA certificates
    pub ca_cert_dir: Option<PathBuf>,
}
