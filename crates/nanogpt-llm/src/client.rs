//! HTTP client for the NanoGPT REST API.
//!
//! [`NanoGptClient`] owns URL resolution, header construction (credential
//! injection plus per-call overrides), the per-attempt timeout and abort
//! linkage, and the retry loop. It implements [`Transport`] with two modes:
//! buffered ([`execute`](Transport::execute)) and streaming
//! ([`open_stream`](Transport::open_stream)).

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::abort::AbortSignal;
use crate::config::NanoGptConfig;
use crate::error::{RequestError, code};
use crate::retry::{RetryConfig, compute_delay};
use crate::transport::{ApiRequest, ByteStream, ResponseBody, Transport};

const LEGACY_API_KEY_HEADER: &str = "x-api-key";
const JSON_MEDIA_TYPE: &str = "application/json";

/// Client for the NanoGPT API.
///
/// # Construction
///
/// ```rust,ignore
/// use nanogpt_llm::{NanoGptClient, NanoGptConfig};
///
/// let client = NanoGptClient::new(NanoGptConfig::with_api_key("sk-..."))?;
/// ```
pub struct NanoGptClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    default_headers: HashMap<String, String>,
    include_legacy_api_key_header: bool,
    retry: RetryConfig,
}

impl NanoGptClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a `missing_api_key` error when no key is configured or found
    /// in the environment.
    pub fn new(config: NanoGptConfig) -> Result<Self, RequestError> {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a client that sends requests through `http`.
    pub fn with_http_client(
        config: NanoGptConfig,
        http: reqwest::Client,
    ) -> Result<Self, RequestError> {
        let api_key = config.resolve_api_key()?;
        let retry = RetryConfig::from_config(&config);
        Ok(Self {
            http,
            api_key,
            include_legacy_api_key_header: config.legacy_api_key_header(),
            base_url: config.base_url,
            default_headers: config.default_headers,
            retry,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the retry policy.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `path` against the base URL. Absolute URLs pass through.
    pub(crate) fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Defaults, then credentials, then per-call overrides.
    pub(crate) fn build_headers(&self, request: &ApiRequest) -> Result<HeaderMap, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));

        for (key, value) in &self.default_headers {
            headers.insert(header_name(key)?, header_value(key, value)?);
        }

        let mut bearer = header_value("Authorization", &format!("Bearer {}", self.api_key))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        if self.include_legacy_api_key_header {
            let mut legacy = header_value(LEGACY_API_KEY_HEADER, &self.api_key)?;
            legacy.set_sensitive(true);
            headers.insert(HeaderName::from_static(LEGACY_API_KEY_HEADER), legacy);
        }

        for (key, value) in request.header_overrides() {
            headers.insert(header_name(key)?, header_value(key, value)?);
        }

        Ok(headers)
    }

    /// Run the attempt loop, turning each successful response into a `T`
    /// with `finish`.
    ///
    /// `finish` runs inside the attempt, so reading a buffered body counts
    /// against that attempt's timeout.
    async fn send<T, F, Fut>(&self, request: &ApiRequest, finish: F) -> Result<T, RequestError>
    where
        F: Fn(Response) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, RequestError>> + Send,
    {
        let url = self.resolve_url(&request.path);
        let headers = self.build_headers(request)?;
        let signal = request.signal.as_ref();
        let mut last_err = None;

        for attempt in 0..=self.retry.max_retries {
            debug!(url = %url, method = %request.method, attempt, "sending request");

            let controller = signal.map_or_else(CancellationToken::new, AbortSignal::child_token);
            let _release = controller.clone().drop_guard();

            let outcome = tokio::select! {
                biased;
                () = controller.cancelled() => Err(aborted_error(&url, signal)),
                () = tokio::time::sleep(self.retry.timeout) => Err(self.timeout_error(&url)),
                result = self.attempt(&url, headers.clone(), request, &finish) => result,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(url = %url, attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.retry.should_retry(&err, attempt) {
                return Err(err);
            }

            let delay = compute_delay(&self.retry, attempt);
            warn!(
                url = %url,
                attempt,
                status = ?err.status,
                code = %err.code,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient error"
            );
            if !delay.is_zero() {
                match signal {
                    Some(signal) => tokio::select! {
                        biased;
                        () = signal.aborted() => return Err(aborted_error(&url, Some(signal))),
                        () = tokio::time::sleep(delay) => {}
                    },
                    None => tokio::time::sleep(delay).await,
                }
            }
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| {
            RequestError::new(
                code::REQUEST_FAILED,
                "NanoGPT request failed after exhausting retries.",
            )
        }))
    }

    async fn attempt<T, F, Fut>(
        &self,
        url: &str,
        headers: HeaderMap,
        request: &ApiRequest,
        finish: &F,
    ) -> Result<T, RequestError>
    where
        F: Fn(Response) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, RequestError>> + Send,
    {
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.network_error(url, &e))?;

        if !response.status().is_success() {
            return Err(build_error(response).await);
        }

        finish(response).await
    }

    fn timeout_error(&self, url: &str) -> RequestError {
        RequestError::new(
            code::REQUEST_TIMEOUT,
            format!(
                "Request to {url} timed out after {}ms.",
                self.retry.timeout.as_millis()
            ),
        )
    }

    fn network_error(&self, url: &str, err: &reqwest::Error) -> RequestError {
        if err.is_timeout() {
            return self.timeout_error(url);
        }
        RequestError::new(code::NETWORK_ERROR, format!("Request to {url} failed: {err}"))
    }
}

#[async_trait]
impl Transport for NanoGptClient {
    async fn execute(&self, request: ApiRequest) -> Result<ResponseBody, RequestError> {
        self.send(&request, read_body).await
    }

    async fn open_stream(&self, request: ApiRequest) -> Result<ByteStream, RequestError> {
        self.send(&request, |response| async move {
            debug!(status = response.status().as_u16(), "stream opened");
            Ok(into_byte_stream(response))
        })
        .await
    }
}

impl std::fmt::Debug for NanoGptClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NanoGptClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field(
                "include_legacy_api_key_header",
                &self.include_legacy_api_key_header,
            )
            .field("retry", &self.retry)
            .finish()
    }
}

fn header_name(key: &str) -> Result<HeaderName, RequestError> {
    HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
        RequestError::new(code::INVALID_HEADER, format!("invalid header name '{key}': {e}"))
    })
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, RequestError> {
    HeaderValue::from_str(value).map_err(|e| {
        RequestError::new(code::INVALID_HEADER, format!("invalid value for header '{key}': {e}"))
    })
}

fn aborted_error(url: &str, signal: Option<&AbortSignal>) -> RequestError {
    let reason = signal.and_then(AbortSignal::reason);
    let err = RequestError::new(
        code::REQUEST_ABORTED,
        match reason {
            Some(reason) => format!("Request to {url} was aborted: {reason}"),
            None => format!("Request to {url} was aborted."),
        },
    );
    match reason {
        Some(reason) => err.with_details(json!({ "reason": reason })),
        None => err,
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(JSON_MEDIA_TYPE))
}

/// Decode a successful buffered response.
async fn read_body(response: Response) -> Result<ResponseBody, RequestError> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(ResponseBody::Empty);
    }

    let json = is_json(response.headers());
    let bytes = response.bytes().await.map_err(|e| {
        RequestError::new(
            code::INVALID_RESPONSE_BODY,
            format!("failed to read response body: {e}"),
        )
        .with_status(status.as_u16())
    })?;

    if json {
        serde_json::from_slice(&bytes)
            .map(ResponseBody::Json)
            .map_err(|e| {
                RequestError::new(
                    code::INVALID_RESPONSE_BODY,
                    format!("failed to parse response body: {e}"),
                )
                .with_status(status.as_u16())
            })
    } else {
        Ok(ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn into_byte_stream(response: Response) -> ByteStream {
    response
        .bytes_stream()
        .map(|chunk| {
            chunk.map_err(|e| {
                RequestError::new(code::STREAM_READ_ERROR, format!("stream read error: {e}"))
            })
        })
        .boxed()
}

/// Convert a non-2xx response into a [`RequestError`].
async fn build_error(response: Response) -> RequestError {
    let status = response.status();
    let json = is_json(response.headers());
    match response.bytes().await {
        Ok(body) => error_from_body(status, json, &body),
        Err(e) => {
            let code = if json {
                code::INVALID_ERROR_PAYLOAD
            } else {
                code::HTTP_ERROR
            };
            RequestError::new(code, format!("Request failed with status {}.", status.as_u16()))
                .with_status(status.as_u16())
                .with_details(json!({ "error": e.to_string() }))
        }
    }
}

/// Build the error for a non-2xx response from its status and raw body.
pub(crate) fn error_from_body(status: StatusCode, json: bool, body: &[u8]) -> RequestError {
    let status_code = status.as_u16();

    if json {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(record)) => return error_from_record(&record, status_code),
            // Valid JSON that isn't an object is reported as text.
            Ok(_) => {}
            Err(e) => {
                return RequestError::new(
                    code::INVALID_ERROR_PAYLOAD,
                    format!("Failed to parse error payload for status {status_code}."),
                )
                .with_status(status_code)
                .with_details(json!({ "error": e.to_string() }));
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let message = if text.is_empty() {
        format!("Request failed with status {status}.")
    } else {
        text.into_owned()
    };
    RequestError::new(code::HTTP_ERROR, message)
        .with_status(status_code)
        .with_details(json!({ "statusText": status.canonical_reason().unwrap_or_default() }))
}

fn error_from_record(record: &Map<String, Value>, status: u16) -> RequestError {
    let fallback_message = || format!("Request failed with status {status}.");
    let str_field = |obj: &Map<String, Value>, key: &str| {
        obj.get(key).and_then(Value::as_str).map(String::from)
    };

    if let Some(Value::Object(nested)) = record.get("error") {
        let code = str_field(nested, "code")
            .or_else(|| str_field(nested, "type"))
            .unwrap_or_else(|| code::UNKNOWN_ERROR.into());
        let message = str_field(nested, "message").unwrap_or_else(fallback_message);
        let param = nested.get("param").cloned().unwrap_or(Value::Null);
        return RequestError::new(code, message)
            .with_status(status)
            .with_details(json!({ "param": param }));
    }

    let code = str_field(record, "code").unwrap_or_else(|| code::UNKNOWN_ERROR.into());
    let message = str_field(record, "message").unwrap_or_else(fallback_message);
    let mut err = RequestError::new(code, message).with_status(status);
    err.details = record.get("details").cloned();
    err
}
