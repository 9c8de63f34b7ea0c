//! Text embeddings over `POST /embeddings`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::abort::AbortSignal;
use crate::error::{ProviderError, RequestError, Result, code};
use crate::provider::EmbeddingModel;
use crate::transport::{ApiRequest, Transport};
use crate::types::{CallWarning, PROVIDER_NAME, ProviderMetadata, to_provider_metadata};

/// Embeddings endpoint, relative to the base URL.
pub const EMBEDDINGS_ENDPOINT: &str = "/embeddings";

/// Most values a single embedding call accepts.
pub const MAX_EMBEDDINGS_PER_CALL: usize = 2048;

/// How the service should encode the returned vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    /// JSON float arrays.
    Float,
    /// Base64 strings of little-endian `f32`s.
    Base64,
}

/// Options for one embedding call.
#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    /// Texts to embed, in order.
    pub values: Vec<String>,
    /// Requested vector encoding.
    pub encoding_format: Option<EncodingFormat>,
    /// Requested vector size.
    pub dimensions: Option<u32>,
    /// End-user identifier.
    pub user: Option<String>,
    /// Extra headers; `None` values are dropped.
    pub headers: Option<HashMap<String, Option<String>>>,
    /// Cancellation handle for the call.
    pub abort_signal: Option<AbortSignal>,
}

impl EmbedOptions {
    /// Options with only the values to embed.
    pub fn new(values: Vec<String>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }
}

/// Token accounting for an embedding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbeddingUsage {
    /// Tokens consumed.
    pub tokens: u64,
}

/// Response details worth surfacing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingResponseInfo {
    /// Model that served the request, as reported by the service.
    pub model: Option<String>,
}

/// Result of an embedding call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedResult {
    /// One vector per input value, in response order.
    pub embeddings: Vec<Vec<f32>>,
    /// Token accounting, when reported.
    pub usage: Option<EmbeddingUsage>,
    /// Vendor metadata.
    pub provider_metadata: Option<ProviderMetadata>,
    /// Response details; absent when no request was made.
    pub response: Option<EmbeddingResponseInfo>,
    /// Ignored settings.
    pub warnings: Vec<CallWarning>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<EncodingFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Many(&'a [String]),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Option<Vec<EmbeddingDatum>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<EmbeddingUsagePayload>,
    #[serde(default, rename = "nanoGPT")]
    nano_gpt: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: EmbeddingPayload,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingPayload {
    Floats(Vec<f32>),
    Base64(String),
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsagePayload {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// A NanoGPT text embedding model.
#[derive(Clone)]
pub struct NanoGptEmbeddingModel {
    transport: Arc<dyn Transport>,
    model_id: String,
}

impl NanoGptEmbeddingModel {
    /// Create an embedding model that sends its requests through `transport`.
    pub fn new(transport: Arc<dyn Transport>, model_id: impl Into<String>) -> Self {
        Self {
            transport,
            model_id: model_id.into(),
        }
    }

    fn build_body(&self, options: &EmbedOptions) -> Result<Value> {
        let input = match options.values.as_slice() {
            [single] => EmbeddingInput::Single(single),
            many => EmbeddingInput::Many(many),
        };
        let request = EmbeddingRequest {
            model: &self.model_id,
            input,
            encoding_format: options.encoding_format,
            dimensions: options.dimensions,
            user: options.user.as_deref(),
        };
        serde_json::to_value(&request).map_err(|e| {
            RequestError::new(code::INVALID_REQUEST_BODY, format!("failed to encode request: {e}"))
                .into()
        })
    }
}

impl std::fmt::Debug for NanoGptEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NanoGptEmbeddingModel")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmbeddingModel for NanoGptEmbeddingModel {
    fn provider(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_embeddings_per_call(&self) -> usize {
        MAX_EMBEDDINGS_PER_CALL
    }

    fn supports_parallel_calls(&self) -> bool {
        true
    }

    async fn do_embed(&self, options: EmbedOptions) -> Result<EmbedResult> {
        if options.values.is_empty() {
            return Ok(EmbedResult {
                embeddings: Vec::new(),
                usage: None,
                provider_metadata: None,
                response: None,
                warnings: Vec::new(),
            });
        }

        if options.values.len() > MAX_EMBEDDINGS_PER_CALL {
            return Err(ProviderError::TooManyEmbeddingValues {
                provider: PROVIDER_NAME.into(),
                model_id: self.model_id.clone(),
                max_embeddings_per_call: MAX_EMBEDDINGS_PER_CALL,
                values: options.values.len(),
            });
        }

        let body = self.build_body(&options)?;
        debug!(model = %self.model_id, values = options.values.len(), "requesting embeddings");

        let request = ApiRequest::post(EMBEDDINGS_ENDPOINT)
            .with_json(&body)
            .with_headers(options.headers.as_ref())
            .with_signal(options.abort_signal.clone());
        let raw = self.transport.execute(request).await?.to_value();

        if !raw.is_object() {
            return Err(no_embeddings(raw));
        }
        let parsed: EmbeddingResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            ProviderError::invalid_response(
                format!("NanoGPT embeddings response could not be decoded: {e}"),
                raw.clone(),
            )
        })?;

        let data = match parsed.data {
            Some(data) if !data.is_empty() => data,
            _ => return Err(no_embeddings(raw)),
        };

        let embeddings = data
            .into_iter()
            .enumerate()
            .map(|(position, datum)| normalize_embedding(datum.embedding, datum.index.unwrap_or(position)))
            .collect::<Result<Vec<_>>>()?;

        Ok(EmbedResult {
            embeddings,
            usage: parsed
                .usage
                .and_then(|u| u.total_tokens.or(u.prompt_tokens))
                .map(|tokens| EmbeddingUsage { tokens }),
            provider_metadata: to_provider_metadata(parsed.nano_gpt.as_ref()),
            response: Some(EmbeddingResponseInfo {
                model: parsed.model,
            }),
            warnings: Vec::new(),
        })
    }
}

fn no_embeddings(raw: Value) -> ProviderError {
    ProviderError::invalid_response(
        "NanoGPT embeddings response did not include any embeddings.",
        raw,
    )
}

fn normalize_embedding(payload: EmbeddingPayload, index: usize) -> Result<Vec<f32>> {
    match payload {
        EmbeddingPayload::Floats(values) => Ok(values),
        EmbeddingPayload::Base64(encoded) => decode_f32_le(&encoded).ok_or_else(|| {
            ProviderError::invalid_response(
                format!("Embedding at index {index} is not a valid base64-encoded Float32 array."),
                Value::String(encoded),
            )
        }),
    }
}

/// Decode base64 into little-endian `f32`s.
fn decode_f32_le(encoded: &str) -> Option<Vec<f32>> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
