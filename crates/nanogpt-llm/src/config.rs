//! Client configuration.
//!
//! [`NanoGptConfig`] describes how to reach the NanoGPT API: credentials,
//! base URL, default headers and the retry/timeout knobs that seed the
//! client's [`RetryConfig`](crate::retry::RetryConfig).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{RequestError, code};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nano-gpt.com/api/v1";

/// Environment variable consulted when no explicit key is configured.
pub const DEFAULT_API_KEY_ENV: &str = "NANOGPT_API_KEY";

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Configuration for a [`NanoGptClient`](crate::client::NanoGptClient).
#[derive(Clone, Serialize, Deserialize)]
pub struct NanoGptConfig {
    /// Explicit API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable that holds the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the API. A trailing slash is ignored.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Headers sent with every request. Per-call overrides win.
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Per-attempt timeout in milliseconds. Defaults to 60000.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Retries after the first attempt. Defaults to 2.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Also send the key as `x-api-key`. Defaults to true.
    #[serde(default)]
    pub include_legacy_api_key_header: Option<bool>,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.into()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

impl Default for NanoGptConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            default_headers: HashMap::new(),
            timeout_ms: None,
            max_retries: None,
            include_legacy_api_key_header: None,
        }
    }
}

impl NanoGptConfig {
    /// Configuration with an explicit API key and defaults elsewhere.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Override the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve the API key: explicit key > environment variable.
    ///
    /// Empty strings count as missing.
    pub fn resolve_api_key(&self) -> Result<String, RequestError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(RequestError::new(
                code::MISSING_API_KEY,
                format!(
                    "An apiKey is required to use the NanoGPT provider (set {} or pass one explicitly).",
                    self.api_key_env
                ),
            )),
        }
    }

    /// Whether the legacy `x-api-key` header should be sent.
    pub fn legacy_api_key_header(&self) -> bool {
        self.include_legacy_api_key_header.unwrap_or(true)
    }
}

impl std::fmt::Debug for NanoGptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NanoGptConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers.keys())
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field(
                "include_legacy_api_key_header",
                &self.include_legacy_api_key_header,
            )
            .finish()
    }
}
