//! Model traits and the [`NanoGpt`] provider factory.
//!
//! [`LanguageModel`] and [`EmbeddingModel`] are the vendor-neutral
//! interfaces an orchestration layer calls. [`NanoGpt`] owns one shared
//! [`NanoGptClient`] and hands out models bound to it.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chat::NanoGptChatModel;
use crate::client::NanoGptClient;
use crate::config::NanoGptConfig;
use crate::embedding::{EmbedOptions, EmbedResult, NanoGptEmbeddingModel};
use crate::error::{ProviderError, Result};
use crate::retry::RetryConfig;
use crate::transport::Transport;
use crate::types::{CallOptions, GenerateResult, StreamResult};

/// A model that generates text.
///
/// # Example
///
/// ```rust,ignore
/// use nanogpt_llm::{CallOptions, LanguageModel, Message, NanoGpt, NanoGptConfig};
///
/// let provider = NanoGpt::new(NanoGptConfig::default())?;
/// let model = provider.language_model("gpt-4o-mini");
/// let result = model
///     .do_generate(CallOptions::new(vec![Message::user("What is Rust?")]))
///     .await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name (`"nanogpt"`).
    fn provider(&self) -> &str;

    /// Model identifier sent with every request.
    fn model_id(&self) -> &str;

    /// Run a call to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] for transport failures after retries,
    /// unsupported prompt shapes and malformed responses.
    async fn do_generate(&self, options: CallOptions) -> Result<GenerateResult>;

    /// Start a streaming call.
    ///
    /// Failures after the stream has opened are delivered in-band as
    /// `error` parts, never as an `Err`.
    async fn do_stream(&self, options: CallOptions) -> Result<StreamResult>;
}

/// A model that embeds text.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Provider name (`"nanogpt"`).
    fn provider(&self) -> &str;

    /// Model identifier sent with every request.
    fn model_id(&self) -> &str;

    /// Most values accepted by one [`do_embed`](Self::do_embed) call.
    fn max_embeddings_per_call(&self) -> usize;

    /// Whether callers may split large inputs across concurrent calls.
    fn supports_parallel_calls(&self) -> bool;

    /// Embed `options.values`.
    async fn do_embed(&self, options: EmbedOptions) -> Result<EmbedResult>;
}

/// Entry point: builds models that share one HTTP client.
#[derive(Clone)]
pub struct NanoGpt {
    transport: Arc<dyn Transport>,
}

impl NanoGpt {
    /// Build a provider from configuration.
    ///
    /// # Errors
    ///
    /// Fails with `missing_api_key` when no API key can be resolved.
    pub fn new(config: NanoGptConfig) -> Result<Self> {
        Ok(Self::with_client(NanoGptClient::new(config)?))
    }

    /// Build a provider with a custom retry policy.
    pub fn with_retry(config: NanoGptConfig, retry: RetryConfig) -> Result<Self> {
        Ok(Self::with_client(
            NanoGptClient::new(config)?.with_retry_config(retry),
        ))
    }

    /// Wrap an existing client.
    pub fn with_client(client: NanoGptClient) -> Self {
        Self::with_transport(Arc::new(client))
    }

    /// Use any [`Transport`] implementation.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// A chat model.
    pub fn language_model(&self, model_id: impl Into<String>) -> NanoGptChatModel {
        NanoGptChatModel::new(self.transport.clone(), model_id)
    }

    /// A text embedding model.
    pub fn text_embedding_model(&self, model_id: impl Into<String>) -> NanoGptEmbeddingModel {
        NanoGptEmbeddingModel::new(self.transport.clone(), model_id)
    }

    /// Image models are not offered; this always fails.
    pub fn image_model(&self, model_id: impl Into<String>) -> Result<Infallible> {
        Err(ProviderError::NoSuchModel {
            model_id: model_id.into(),
            model_type: "imageModel".into(),
        })
    }
}

impl std::fmt::Debug for NanoGpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NanoGpt").finish_non_exhaustive()
    }
}
