//! Chat completions over `POST /chat/completions`.
//!
//! [`NanoGptChatModel`] converts a vendor-neutral [`CallOptions`] into the
//! NanoGPT request body, then maps the buffered response (or the live SSE
//! stream) back into normalized results.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ProviderError, RequestError, Result, code};
use crate::provider::LanguageModel;
use crate::stream::{StreamOptions, translate_stream};
use crate::transport::{ApiRequest, ResponseBody, Transport};
use crate::types::{
    CallOptions, CallWarning, ChatCompletionResponse, Content, ContentPart, FinishReason,
    GenerateResult, Message, PROVIDER_NAME, RequestInfo, ResponseFormat, StreamResult, Tool,
    ToolChoice, to_provider_metadata,
};

/// Chat completions endpoint, relative to the base URL.
pub const CHAT_ENDPOINT: &str = "/chat/completions";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    parameters: &'a Value,
}

/// A NanoGPT chat model.
#[derive(Clone)]
pub struct NanoGptChatModel {
    transport: Arc<dyn Transport>,
    model_id: String,
}

impl NanoGptChatModel {
    /// Create a chat model that sends its requests through `transport`.
    pub fn new(transport: Arc<dyn Transport>, model_id: impl Into<String>) -> Self {
        Self {
            transport,
            model_id: model_id.into(),
        }
    }

    /// Build the request body and the warnings for ignored settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnsupportedFunctionality`] for tool-role
    /// messages, non-text content parts and non-function tools.
    pub fn build_request(&self, options: &CallOptions, stream: bool) -> Result<(Value, Vec<CallWarning>)> {
        let mut warnings = Vec::new();

        let messages = options
            .prompt
            .iter()
            .map(convert_message)
            .collect::<Result<Vec<_>>>()?;

        let tools = match options.tools.as_deref() {
            Some(tools) if !tools.is_empty() => {
                Some(tools.iter().map(convert_tool).collect::<Result<Vec<_>>>()?)
            }
            _ => None,
        };

        let tool_choice = match (&tools, &options.tool_choice) {
            (Some(_), Some(choice)) => Some(convert_tool_choice(choice)),
            (None, Some(_)) => {
                warnings.push(CallWarning::UnsupportedSetting {
                    setting: "toolChoice".into(),
                    details: Some("toolChoice is only sent together with tools.".into()),
                });
                None
            }
            (_, None) => None,
        };

        let response_format = match options.response_format {
            Some(ResponseFormat::Json { .. }) => Some(json!({ "type": "json_object" })),
            _ => None,
        };

        let request = ChatCompletionRequest {
            model: &self.model_id,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            max_tokens: options.max_output_tokens,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            stop: options.stop_sequences.as_deref().filter(|s| !s.is_empty()),
            seed: options.seed,
            stream,
            response_format,
            tools,
            tool_choice,
        };

        let body = serde_json::to_value(&request).map_err(|e| {
            RequestError::new(code::INVALID_REQUEST_BODY, format!("failed to encode request: {e}"))
        })?;
        Ok((body, warnings))
    }

    fn api_request(&self, body: &Value, options: &CallOptions) -> ApiRequest {
        ApiRequest::post(CHAT_ENDPOINT)
            .with_json(body)
            .with_headers(options.headers.as_ref())
            .with_signal(options.abort_signal.clone())
    }
}

impl std::fmt::Debug for NanoGptChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NanoGptChatModel")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LanguageModel for NanoGptChatModel {
    fn provider(&self) -> &str {
        PROVIDER_NAME
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn do_generate(&self, options: CallOptions) -> Result<GenerateResult> {
        let (body, warnings) = self.build_request(&options, false)?;
        debug!(model = %self.model_id, stream = false, "sending chat completion");

        let raw = match self.transport.execute(self.api_request(&body, &options)).await? {
            ResponseBody::Empty => return Err(ProviderError::NoContentGenerated),
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => {
                return Err(ProviderError::invalid_response(
                    "NanoGPT chat completion response is not JSON.",
                    Value::String(text),
                ));
            }
        };

        if !raw.is_object() {
            return Err(ProviderError::invalid_response(
                "NanoGPT chat completion response is not a JSON object.",
                raw,
            ));
        }
        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            ProviderError::invalid_response(
                format!("NanoGPT chat completion response could not be decoded: {e}"),
                raw.clone(),
            )
        })?;

        let Some(choice) = parsed.choices.and_then(|choices| choices.into_iter().next()) else {
            return Err(ProviderError::NoContentGenerated);
        };

        let Some(message) = choice
            .message
            .filter(|message| message.role.as_deref() == Some("assistant"))
        else {
            return Err(ProviderError::invalid_response(
                "NanoGPT chat completion response is missing assistant message.",
                raw,
            ));
        };

        Ok(GenerateResult {
            content: vec![Content::Text {
                text: message.content.unwrap_or_default(),
            }],
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
            usage: parsed.usage.map(|u| u.to_usage()).unwrap_or_default(),
            provider_metadata: to_provider_metadata(parsed.nano_gpt.as_ref()),
            request: RequestInfo { body },
            warnings,
        })
    }

    async fn do_stream(&self, options: CallOptions) -> Result<StreamResult> {
        let (body, warnings) = self.build_request(&options, true)?;
        debug!(model = %self.model_id, stream = true, "opening chat completion stream");

        let bytes = self
            .transport
            .open_stream(self.api_request(&body, &options))
            .await?;

        let stream = translate_stream(
            bytes,
            StreamOptions {
                include_raw_chunks: options.include_raw_chunks,
                text_id: None,
                warnings,
                signal: options.abort_signal,
            },
        );

        Ok(StreamResult {
            stream,
            request: RequestInfo { body },
        })
    }
}

fn convert_message(message: &Message) -> Result<WireMessage> {
    match message {
        Message::System { content } => Ok(WireMessage {
            role: "system",
            content: content.clone(),
        }),
        Message::User { content } => Ok(WireMessage {
            role: "user",
            content: collect_text(content, "user")?,
        }),
        Message::Assistant { content } => Ok(WireMessage {
            role: "assistant",
            content: collect_text(content, "assistant")?,
        }),
        Message::Tool { .. } => Err(ProviderError::unsupported(
            "nanogpt.chat.prompt.tool",
            "NanoGPT provider does not support tool messages yet.",
        )),
    }
}

/// Concatenate text and reasoning parts in order.
fn collect_text(parts: &[ContentPart], role: &str) -> Result<String> {
    let mut text = String::new();
    for part in parts {
        match part {
            ContentPart::Text { text: t } | ContentPart::Reasoning { text: t } => text.push_str(t),
            other => {
                let kind = other.kind();
                return Err(ProviderError::unsupported(
                    format!("nanogpt.chat.prompt.{role}.{kind}"),
                    format!("NanoGPT provider does not yet support {kind} parts in {role} messages."),
                ));
            }
        }
    }
    Ok(text)
}

fn convert_tool(tool: &Tool) -> Result<WireTool<'_>> {
    match tool {
        Tool::Function {
            name,
            description,
            input_schema,
        } => Ok(WireTool {
            kind: "function",
            function: WireFunction {
                name,
                description: description.as_deref(),
                parameters: input_schema,
            },
        }),
        Tool::ProviderDefined { .. } => Err(ProviderError::unsupported(
            "nanogpt.chat.tools.non_function",
            "NanoGPT provider currently supports only function tools.",
        )),
    }
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool { tool_name } => json!({
            "type": "function",
            "function": { "name": tool_name },
        }),
    }
}
