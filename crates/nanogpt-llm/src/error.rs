//! Error types for nanogpt-llm.
//!
//! Transport-level failures are normalized into [`RequestError`], a single
//! structured error carrying a stable code, a human message, the HTTP status
//! (when one was received) and optional vendor details. Adapter-level
//! failures (bad prompt shapes, malformed responses) are variants of
//! [`ProviderError`], which wraps [`RequestError`] transparently.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Stable machine-readable codes produced by this crate.
///
/// Vendor error payloads may carry any other code string; these are the ones
/// synthesized locally.
pub mod code {
    /// No API key was supplied or found in the environment.
    pub const MISSING_API_KEY: &str = "missing_api_key";
    /// An attempt exceeded its timeout.
    pub const REQUEST_TIMEOUT: &str = "request_timeout";
    /// The caller aborted the call through its [`AbortSignal`](crate::AbortSignal).
    pub const REQUEST_ABORTED: &str = "request_aborted";
    /// Non-2xx response whose body was not JSON.
    pub const HTTP_ERROR: &str = "http_error";
    /// Non-2xx response that claimed to be JSON but could not be parsed.
    pub const INVALID_ERROR_PAYLOAD: &str = "invalid_error_payload";
    /// The retry loop ended without capturing a structured error.
    pub const REQUEST_FAILED: &str = "request_failed";
    /// Connection-level failure before any response arrived.
    pub const NETWORK_ERROR: &str = "network_error";
    /// A 2xx response body could not be read or decoded.
    pub const INVALID_RESPONSE_BODY: &str = "invalid_response_body";
    /// A configured or per-call header could not be encoded.
    pub const INVALID_HEADER: &str = "invalid_header";
    /// A request body could not be encoded.
    pub const INVALID_REQUEST_BODY: &str = "invalid_request_body";
    /// Reading the streaming body failed midway.
    pub const STREAM_READ_ERROR: &str = "stream_read_error";
    /// Fallback when an error payload carries no usable code.
    pub const UNKNOWN_ERROR: &str = "unknown_error";
}

/// A normalized transport failure.
///
/// Every failure crossing the [`Transport`](crate::transport::Transport)
/// boundary has this shape: network aborts, timeouts, JSON decode failures
/// and non-2xx responses alike.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct RequestError {
    /// Machine-readable code, either vendor-supplied or one of [`code`].
    pub code: String,

    /// Human-readable message.
    pub message: String,

    /// HTTP status of the response that produced this error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Opaque diagnostic details (vendor `param`, parse error, abort reason).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RequestError {
    /// Create an error with a code and message and no status or details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Attach the HTTP status that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach diagnostic details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this error is an attempt timeout.
    pub fn is_timeout(&self) -> bool {
        self.code == code::REQUEST_TIMEOUT
    }

    /// Whether this error came from an explicit caller abort.
    pub fn is_aborted(&self) -> bool {
        self.code == code::REQUEST_ABORTED
    }
}

/// Errors surfaced by the chat and embedding adapters.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP exchange failed (see [`RequestError::code`]).
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The response carried no choices.
    #[error("No content generated.")]
    NoContentGenerated,

    /// The response did not have the expected shape.
    #[error("{message}")]
    InvalidResponseData {
        /// What was wrong with the response.
        message: String,
        /// The offending payload, for diagnostics.
        data: Value,
    },

    /// The prompt or options use something this provider cannot express.
    #[error("{message}")]
    UnsupportedFunctionality {
        /// Dotted path naming the unsupported feature, e.g. `nanogpt.chat.prompt.user.file`.
        functionality: String,
        /// Human-readable explanation.
        message: String,
    },

    /// More embedding inputs than a single call accepts.
    #[error(
        "Too many values for a single embedding call. The {provider} model \"{model_id}\" can only embed up to {max_embeddings_per_call} values per call, but {values} values were provided."
    )]
    TooManyEmbeddingValues {
        /// Provider name.
        provider: String,
        /// Model identifier.
        model_id: String,
        /// Per-call limit.
        max_embeddings_per_call: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// The requested model type is not offered by this provider.
    #[error("No such {model_type}: {model_id}")]
    NoSuchModel {
        /// Model identifier.
        model_id: String,
        /// Model type, e.g. `imageModel`.
        model_type: String,
    },
}

impl ProviderError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &str {
        match self {
            Self::Request(err) => &err.code,
            Self::NoContentGenerated => "no_content_generated",
            Self::InvalidResponseData { .. } => "invalid_response_data",
            Self::UnsupportedFunctionality { .. } => "unsupported_functionality",
            Self::TooManyEmbeddingValues { .. } => "too_many_embedding_values",
            Self::NoSuchModel { .. } => "no_such_model",
        }
    }

    /// HTTP status when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request(err) => err.status,
            _ => None,
        }
    }

    pub(crate) fn unsupported(functionality: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedFunctionality {
            functionality: functionality.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>, data: Value) -> Self {
        Self::InvalidResponseData {
            message: message.into(),
            data,
        }
    }
}

/// A convenience type alias for adapter operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
