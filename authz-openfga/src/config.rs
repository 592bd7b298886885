//! Configuration for the OpenFGA client.

use crate::error::OpenFgaError;
use serde::Deserialize;
use std::collections::HashMap;

/// Server configuration key holding the OpenFGA API URL.
pub const KEY_API_URL: &str = "openfga.api.url";
/// Server configuration key holding the OpenFGA API token.
pub const KEY_API_TOKEN: &str = "openfga.api.token";
/// Server configuration key holding the OpenFGA store ID.
pub const KEY_STORE_ID: &str = "openfga.store.id";

fn default_connect_timeout() -> u64 { 10 }
fn default_request_timeout() -> u64 { 10 }

/// Configuration for connecting to an OpenFGA server.
///
/// Can be deserialized directly, or assembled from the flat server
/// configuration map with [`OpenFgaConfig::from_map`].
///
/// ```yaml
/// endpoint: "http://localhost:8080"
/// store_id: "01HV..."
/// api_token: "secret"
/// model_id: "01HW..."           # optional
/// request_timeout_secs: 10      # default: 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OpenFgaConfig {
    /// The OpenFGA server endpoint (e.g., "http://localhost:8080").
    pub endpoint: String,
    /// The store ID holding the relationship tuples.
    pub store_id: String,
    /// Optional authorization model ID. If not set, the latest model is used.
    pub model_id: Option<String>,
    /// Optional API token, sent as a bearer token.
    pub api_token: Option<String>,
    /// Connection timeout in seconds. Default: 10.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds. Default: 10.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl OpenFgaConfig {
    /// Create a new OpenFGA configuration with the given endpoint and store ID.
    ///
    /// # Examples
    ///
    /// ```
    /// use authz_openfga::OpenFgaConfig;
    ///
    /// let config = OpenFgaConfig::new("http://localhost:8080", "store-id");
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(endpoint: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            store_id: store_id.into(),
            model_id: None,
            api_token: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Build the configuration from the flat server configuration map
    /// (`openfga.api.url`, `openfga.api.token`, `openfga.store.id`).
    ///
    /// All three keys are required and must hold strings.
    pub fn from_map(
        config: &HashMap<String, serde_json::Value>,
    ) -> Result<Self, OpenFgaError> {
        let token = required_string(config, KEY_API_TOKEN, "Missing OpenFGA API token")?;
        let url = required_string(config, KEY_API_URL, "Missing OpenFGA API URL")?;
        let store_id = required_string(config, KEY_STORE_ID, "Missing OpenFGA store ID")?;

        let config = Self::new(url, store_id).with_api_token(token);
        config.validate()?;
        Ok(config)
    }

    /// Set the authorization model ID.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Set the API token for authentication.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the connection timeout in seconds.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the request timeout in seconds.
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), OpenFgaError> {
        if self.endpoint.is_empty() {
            return Err(OpenFgaError::InvalidConfig("endpoint cannot be empty".into()));
        }
        if url::Url::parse(&self.endpoint).is_err() {
            return Err(OpenFgaError::InvalidConfig(format!(
                "endpoint {:?} is not a valid URL",
                self.endpoint
            )));
        }
        if self.store_id.is_empty() {
            return Err(OpenFgaError::InvalidConfig("store_id cannot be empty".into()));
        }
        Ok(())
    }
}

fn required_string(
    config: &HashMap<String, serde_json::Value>,
    key: &str,
    missing: &str,
) -> Result<String, OpenFgaError> {
    match config.get(key) {
        None | Some(serde_json::Value::Null) => {
            Err(OpenFgaError::InvalidConfig(missing.to_string()))
        }
        Some(serde_json::Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(OpenFgaError::InvalidConfig(format!(
            "Expected a string for configuration key {:?}, got: {}",
            key,
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
