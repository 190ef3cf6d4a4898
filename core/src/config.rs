//! Client configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration pointing at the production endpoint with no timeouts.

use serde::Deserialize;

use crate::error::ApiError;

/// Host and path of the REST endpoint; all methods share it.
pub const DEFAULT_SERVER: &str = "api.facebook.com/restserver.php";

/// Protocol version sent as `v` with every call.
pub const API_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub http_endpoint: String,
    /// Used only by bootstrap calls that ask for HTTPS.
    pub https_endpoint: String,
    pub connect_timeout_ms: Option<u64>,
    /// Whole-request deadline, including reading the body.
    pub timeout_ms: Option<u64>,
    pub max_idle_connections: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_endpoint: format!("http://{DEFAULT_SERVER}"),
            https_endpoint: format!("https://{DEFAULT_SERVER}"),
            connect_timeout_ms: None,
            timeout_ms: None,
            max_idle_connections: 10,
        }
    }
}

impl ClientConfig {
    /// Send every call, bootstrap included, to `url`. Handy for local peers
    /// that do not speak TLS.
    pub fn with_endpoint(url: &str) -> Self {
        let url = url.trim_end_matches('/').to_string();
        Self {
            http_endpoint: url.clone(),
            https_endpoint: url,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ApiError> {
        let config: ClientConfig = toml::from_str(text).map_err(|e| ApiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn endpoint(&self, use_https: bool) -> &str {
        if use_https {
            &self.https_endpoint
        } else {
            &self.http_endpoint
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        for (name, value) in [("http_endpoint", &self.http_endpoint), ("https_endpoint", &self.https_endpoint)] {
            url::Url::parse(value).map_err(|e| ApiError::Config(format!("{name}: {e}")))?;
        }
        if self.max_idle_connections == 0 {
            return Err(ApiError::Config("max_idle_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}
