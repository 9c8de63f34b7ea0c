//! Vendor-neutral call and result types, plus the NanoGPT wire shapes they
//! are translated from.
//!
//! The public half (prompts, options, usage, finish reasons, stream parts)
//! is what callers build and consume. The `pub(crate)` half mirrors the
//! NanoGPT JSON payloads. Each field is optional and decoded leniently, so a
//! missing or mistyped key never fails a whole response.

use std::collections::{BTreeMap, HashMap};

use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::abort::AbortSignal;
use crate::error::RequestError;

/// Provider name used in metadata keys and errors.
pub const PROVIDER_NAME: &str = "nanogpt";

/// Vendor side-channel data, keyed by provider name (`{"nanogpt": {...}}`).
pub type ProviderMetadata = BTreeMap<String, Value>;

/// Wrap a vendor metadata object. Non-object values are ignored.
pub(crate) fn to_provider_metadata(value: Option<&Value>) -> Option<ProviderMetadata> {
    match value {
        Some(object @ Value::Object(_)) => {
            Some(BTreeMap::from([(PROVIDER_NAME.to_string(), object.clone())]))
        }
        _ => None,
    }
}

// ── Prompt ──────────────────────────────────────────────────────────────

/// A conversation, oldest message first.
pub type Prompt = Vec<Message>;

/// A prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// System instructions.
    System {
        /// Instruction text.
        content: String,
    },
    /// A user turn.
    User {
        /// Content parts, concatenated in order.
        content: Vec<ContentPart>,
    },
    /// A previous assistant turn.
    Assistant {
        /// Content parts, concatenated in order.
        content: Vec<ContentPart>,
    },
    /// Tool results.
    Tool {
        /// Tool result parts.
        content: Vec<ContentPart>,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![ContentPart::text(text)],
        }
    }

    /// Create an assistant message with a single text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![ContentPart::text(text)],
        }
    }

    /// The role name as it appears on the wire.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Model reasoning carried over from an earlier turn.
    Reasoning {
        /// The reasoning text.
        text: String,
    },
    /// Embedded media.
    #[serde(rename_all = "camelCase")]
    File {
        /// IANA media type, e.g. `image/png`.
        media_type: String,
        /// Base64 data or URL.
        data: String,
    },
    /// A tool invocation made by the assistant.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Call identifier.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Arguments.
        input: Value,
    },
    /// The result of a tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Call identifier.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Result payload.
        output: Value,
    },
}

impl ContentPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The part kind as named in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::File { .. } => "file",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
        }
    }
}

// ── Call options ────────────────────────────────────────────────────────

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Tool {
    /// A function tool described by a JSON schema.
    #[serde(rename_all = "camelCase")]
    Function {
        /// Function name.
        name: String,
        /// What the function does.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// JSON schema of the arguments.
        input_schema: Value,
    },
    /// A tool implemented by a specific provider.
    ProviderDefined {
        /// Provider-qualified id, e.g. `openai.web_search`.
        id: String,
        /// Tool name.
        name: String,
        /// Tool configuration.
        #[serde(default)]
        args: Value,
    },
}

/// How the model should choose among tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// No tool calls.
    None,
    /// At least one tool call.
    Required,
    /// Call this specific tool.
    #[serde(rename_all = "camelCase")]
    Tool {
        /// Name of the tool to call.
        tool_name: String,
    },
}

/// Output format hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Free-form text.
    Text,
    /// A JSON object. Schema, name and description are advisory.
    Json {
        /// JSON schema the output should follow.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
        /// Name of the output.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Description of the output.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// Options for one language-model call. Every field is independently optional.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// The conversation.
    pub prompt: Prompt,
    /// Maximum tokens to generate.
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Stop sequences.
    pub stop_sequences: Option<Vec<String>>,
    /// Nucleus sampling.
    pub top_p: Option<f64>,
    /// Top-k sampling.
    pub top_k: Option<u32>,
    /// Presence penalty.
    pub presence_penalty: Option<f64>,
    /// Frequency penalty.
    pub frequency_penalty: Option<f64>,
    /// Output format hint.
    pub response_format: Option<ResponseFormat>,
    /// Random seed.
    pub seed: Option<i64>,
    /// Available tools.
    pub tools: Option<Vec<Tool>>,
    /// Tool selection policy; only sent together with tools.
    pub tool_choice: Option<ToolChoice>,
    /// Emit `raw` stream parts for every payload when streaming.
    pub include_raw_chunks: bool,
    /// Cancellation handle for the whole call.
    pub abort_signal: Option<AbortSignal>,
    /// Extra headers; `None` values are dropped.
    pub headers: Option<HashMap<String, Option<String>>>,
}

impl CallOptions {
    /// Options with only a prompt.
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            ..Self::default()
        }
    }
}

/// A non-fatal problem with the call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallWarning {
    /// A setting was ignored.
    UnsupportedSetting {
        /// Setting name.
        setting: String,
        /// Why it was ignored.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

// ── Results ─────────────────────────────────────────────────────────────

/// Token accounting. Absent fields are unknown, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: Option<u64>,
    /// Generated tokens.
    pub output_tokens: Option<u64>,
    /// Prompt plus generated tokens.
    pub total_tokens: Option<u64>,
    /// Tokens spent on reasoning.
    pub reasoning_tokens: Option<u64>,
    /// Prompt tokens served from cache.
    pub cached_input_tokens: Option<u64>,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Natural stop or stop sequence.
    Stop,
    /// Token limit reached.
    Length,
    /// Output was filtered.
    ContentFilter,
    /// The model called tools.
    ToolCalls,
    /// The provider reported an error.
    Error,
    /// Some other reason.
    Other,
    /// No reason given.
    #[default]
    Unknown,
}

impl FinishReason {
    /// Classify a vendor finish reason.
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => Self::Stop,
            Some("length") => Self::Length,
            Some("content_filter") => Self::ContentFilter,
            Some("tool_calls" | "tool_call" | "function_call") => Self::ToolCalls,
            Some("error") => Self::Error,
            Some(_) => Self::Other,
            None => Self::Unknown,
        }
    }
}

/// Generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Content {
    /// Generated text.
    Text {
        /// The text.
        text: String,
    },
}

/// The request as it was sent, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestInfo {
    /// The JSON body.
    pub body: Value,
}

/// Result of a non-streaming call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResult {
    /// Generated content.
    pub content: Vec<Content>,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Token accounting.
    pub usage: Usage,
    /// Vendor metadata (cost, billing).
    pub provider_metadata: Option<ProviderMetadata>,
    /// The request as sent.
    pub request: RequestInfo,
    /// Ignored settings.
    pub warnings: Vec<CallWarning>,
}

/// Result of a streaming call.
pub struct StreamResult {
    /// The event stream. Dropping it cancels the underlying read.
    pub stream: BoxStream<'static, StreamPart>,
    /// The request as sent.
    pub request: RequestInfo,
}

impl std::fmt::Debug for StreamResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResult")
            .field("stream", &"<stream>")
            .field("request", &self.request)
            .finish()
    }
}

/// One normalized streaming event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    /// Always the first event.
    StreamStart {
        /// Ignored settings.
        warnings: Vec<CallWarning>,
    },
    /// The text segment opened.
    TextStart {
        /// Segment id.
        id: String,
    },
    /// Incremental text.
    TextDelta {
        /// Segment id.
        id: String,
        /// Text to append.
        delta: String,
    },
    /// The text segment closed.
    TextEnd {
        /// Segment id.
        id: String,
    },
    /// A payload passed through verbatim.
    #[serde(rename_all = "camelCase")]
    Raw {
        /// The raw frame text.
        raw_value: String,
    },
    /// The stream failed; always followed by `Finish`.
    Error {
        /// What went wrong.
        error: RequestError,
    },
    /// Always the last event.
    #[serde(rename_all = "camelCase")]
    Finish {
        /// Last usage reported.
        usage: Usage,
        /// Last finish reason reported.
        finish_reason: FinishReason,
        /// Last vendor metadata reported.
        provider_metadata: Option<ProviderMetadata>,
    },
}

// ── Wire types ──────────────────────────────────────────────────────────
//
// Every field is optional and decoded on its own: a value of the wrong type
// reads as absent instead of failing the enclosing payload.

/// Decode a field, treating a mistyped value as absent.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Decode a token count. Whole floats such as `5.0` are truncated; negative
/// or non-numeric values read as absent.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(token_count))
}

fn token_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.trunc() as u64)
    })
}

/// Usage as reported by NanoGPT.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct UsagePayload {
    #[serde(default, deserialize_with = "lenient_count")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub completion_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub cached_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub completion_tokens_details: Option<TokenDetails>,
    #[serde(default, deserialize_with = "lenient")]
    pub prompt_tokens_details: Option<TokenDetails>,
}

/// OpenAI-style nested token breakdowns.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TokenDetails {
    #[serde(default, deserialize_with = "lenient_count")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub cached_tokens: Option<u64>,
}

impl UsagePayload {
    /// Flat fields win over the nested breakdowns.
    pub fn to_usage(&self) -> Usage {
        Usage {
            input_tokens: self.prompt_tokens,
            output_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            reasoning_tokens: self.reasoning_tokens.or_else(|| {
                self.completion_tokens_details
                    .as_ref()
                    .and_then(|d| d.reasoning_tokens)
            }),
            cached_input_tokens: self.cached_tokens.or_else(|| {
                self.prompt_tokens_details
                    .as_ref()
                    .and_then(|d| d.cached_tokens)
            }),
        }
    }
}

/// `POST /chat/completions` response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub choices: Option<Vec<ChatCompletionChoice>>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<UsagePayload>,
    #[serde(default, rename = "nanoGPT")]
    pub nano_gpt: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionChoice {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<ChatCompletionMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
}

/// One `data:` payload of a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default, deserialize_with = "lenient")]
    pub choices: Option<Vec<StreamDeltaChoice>>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<UsagePayload>,
    #[serde(default, rename = "nanoGPT")]
    pub nano_gpt: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StreamDeltaChoice {
    #[serde(default, deserialize_with = "lenient")]
    pub delta: Option<StreamDeltaContent>,
    #[serde(default, deserialize_with = "lenient")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StreamDeltaContent {
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub reasoning: Option<String>,
}
