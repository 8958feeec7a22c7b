//! Service and engine configuration.
//!
//! Credentials are resolved by the settings layer outside this crate; a
//! `ServiceConfig` only carries the already-resolved key string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// One configured AI service: `(provider, base_url, api_key, model)` plus a display name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("model", &self.model)
            .finish()
    }
}

impl ServiceConfig {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            base_url: None,
            api_key: String::new(),
            model: model.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Base URL without a trailing slash, falling back to the provider default.
    pub fn resolved_base_url(&self, default: Option<&str>) -> Result<String, ModelError> {
        let configured = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        configured
            .or(default)
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                ModelError::Configuration(format!(
                    "service '{}' ({}) has no endpoint configured",
                    self.name, self.provider
                ))
            })
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Reads `{PROVIDER}_API_KEY`, `{PROVIDER}_MODEL`, and `{PROVIDER}_BASE_URL`.
    /// Returns `None` when neither a key nor a model is set.
    pub fn from_env(provider: &str) -> Option<Self> {
        let prefix = provider.trim().to_ascii_uppercase().replace('-', "_");
        let read = |suffix: &str| {
            std::env::var(format!("{prefix}_{suffix}"))
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = read("API_KEY");
        let model = read("MODEL");
        if api_key.is_none() && model.is_none() {
            return None;
        }

        Some(Self {
            name: provider.to_string(),
            provider: provider.to_ascii_lowercase(),
            base_url: read("BASE_URL"),
            api_key: api_key.unwrap_or_default(),
            model: model.unwrap_or_default(),
        })
    }
}

/// Transport and engine tuning. Timeouts apply uniformly on the shared HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    #[serde(default = "default_error_body_cap")]
    pub error_body_cap: usize,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stream_buffer: default_stream_buffer(),
            error_body_cap: default_error_body_cap(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl EngineConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_u64("CHORUS_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = value;
        }
        if let Some(value) = env_u64("CHORUS_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = value;
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!("ignoring invalid {key}={raw}");
            None
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    180_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_stream_buffer() -> usize {
    64
}

fn default_error_body_cap() -> usize {
    64 * 1024
}

fn default_max_response_bytes() -> usize {
    10_000_000
}
