//! NanoGPT provider for vendor-neutral LLM orchestration.
//!
//! This crate exposes the NanoGPT REST API (an OpenAI-style chat and
//! embeddings service) through the [`LanguageModel`] and [`EmbeddingModel`]
//! traits. It translates normalized prompts into NanoGPT request bodies,
//! runs the HTTP exchange with retry, timeout and cancellation, and maps
//! responses (including SSE streams) back into normalized results.
//!
//! # Architecture
//!
//! - [`NanoGptClient`] resolves URLs, injects credentials and runs the
//!   retry loop; it implements the [`Transport`] seam
//! - [`translate_stream`] turns a live SSE body into [`StreamPart`] events
//! - [`NanoGptChatModel`] and [`NanoGptEmbeddingModel`] build requests and
//!   map responses
//! - [`NanoGpt`] is the factory that ties them to one shared client
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use nanogpt_llm::{CallOptions, LanguageModel, Message, NanoGpt, NanoGptConfig, StreamPart};
//!
//! let provider = NanoGpt::new(NanoGptConfig::default())?; // reads NANOGPT_API_KEY
//! let model = provider.language_model("gpt-4o-mini");
//!
//! let mut stream = model
//!     .do_stream(CallOptions::new(vec![Message::user("What is Rust?")]))
//!     .await?
//!     .stream;
//! while let Some(part) = stream.next().await {
//!     if let StreamPart::TextDelta { delta, .. } = part {
//!         print!("{delta}");
//!     }
//! }
//! ```

pub mod abort;
pub mod chat;
pub mod client;
pub mod config;
pub mod embedding;
pub mod error;
pub mod provider;
pub mod retry;
pub mod sse;
pub mod stream;
pub mod transport;
pub mod types;

pub use abort::AbortSignal;
pub use chat::NanoGptChatModel;
pub use client::NanoGptClient;
pub use config::NanoGptConfig;
pub use embedding::{
    EmbedOptions, EmbedResult, EmbeddingUsage, EncodingFormat, NanoGptEmbeddingModel,
};
pub use error::{ProviderError, RequestError, Result};
pub use provider::{EmbeddingModel, LanguageModel, NanoGpt};
pub use retry::RetryConfig;
pub use stream::{StreamOptions, StreamTranslator, translate_stream};
pub use transport::{ApiRequest, ByteStream, ResponseBody, Transport};
pub use types::{
    CallOptions, CallWarning, Content, ContentPart, FinishReason, GenerateResult, Message,
    Prompt, ProviderMetadata, ResponseFormat, StreamPart, StreamResult, Tool, ToolChoice, Usage,
};
