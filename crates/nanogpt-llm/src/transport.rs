//! The transport seam between the adapters and the HTTP client.
//!
//! The chat and embedding adapters only ever talk to a [`Transport`]: a
//! buffered [`execute`](Transport::execute) that returns a decoded body, and
//! [`open_stream`](Transport::open_stream) that hands back the live response
//! body. [`NanoGptClient`](crate::client::NanoGptClient) is the production
//! implementation; tests substitute in-memory ones.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use reqwest::Method;
use serde_json::Value;

use crate::abort::AbortSignal;
use crate::error::RequestError;

/// A live response body, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, RequestError>>;

/// A request descriptor, built fresh for each call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Path relative to the base URL, or an absolute `http(s)://` URL.
    pub path: String,

    /// HTTP method.
    pub method: Method,

    /// Serialized request body.
    pub body: Option<String>,

    /// Per-call header overrides. `None` values are dropped.
    pub headers: HashMap<String, Option<String>>,

    /// Cancellation handle spanning every attempt of this call.
    pub signal: Option<AbortSignal>,
}

impl ApiRequest {
    /// Create a request with no body, headers or signal.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            headers: HashMap::new(),
            signal: None,
        }
    }

    /// Shorthand for a `POST` to `path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Serialize `value` as the JSON body.
    pub fn with_json(mut self, value: &Value) -> Self {
        self.body = Some(value.to_string());
        self
    }

    /// Add one header override.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), Some(value.into()));
        self
    }

    /// Merge a set of header overrides, keeping `None` entries out.
    pub fn with_headers(mut self, headers: Option<&HashMap<String, Option<String>>>) -> Self {
        if let Some(headers) = headers {
            for (key, value) in headers {
                if let Some(value) = value {
                    self.headers.insert(key.clone(), Some(value.clone()));
                }
            }
        }
        self
    }

    /// Attach the caller's cancellation handle.
    pub fn with_signal(mut self, signal: Option<AbortSignal>) -> Self {
        self.signal = signal;
        self
    }

    /// Header overrides that carry a value.
    pub fn header_overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }
}

/// A decoded, fully buffered response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `204 No Content`.
    Empty,
    /// A body served as `application/json`.
    Json(Value),
    /// Any other body, as text.
    Text(String),
}

impl ResponseBody {
    /// Render the body as JSON for diagnostics.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

/// Executes NanoGPT requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a buffered request and decode the body.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] for non-2xx responses, timeouts, aborts and
    /// network failures, after the retry policy has been exhausted.
    async fn execute(&self, request: ApiRequest) -> Result<ResponseBody, RequestError>;

    /// Perform a request and return the unconsumed response body.
    ///
    /// A non-2xx response is never returned as a stream; it is converted
    /// into a [`RequestError`] instead.
    async fn open_stream(&self, request: ApiRequest) -> Result<ByteStream, RequestError>;
}
