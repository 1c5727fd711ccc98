//! Chat-completion client for OpenAI-compatible endpoints, plus the layered
//! configuration it is built from.
//!
//! ```no_run
//! use codeplan_llm::{ChatCompletion, ChatMessage, CompletionOptions, LlmClient, LlmConfig};
//!
//! # async fn run() -> Result<(), codeplan_llm::LlmError> {
//! let client = LlmClient::new(LlmConfig::load("llm.json")?)?;
//! let reply = client
//!     .chat_completion(&[ChatMessage::user("Hello")], &CompletionOptions::default())
//!     .await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod stream;
mod types;

pub use client::{ChatCompletion, LlmClient};
pub use config::{
    env_key, ApiType, ConfigItem, ConfigSource, ConfigSourceKind, ConfigSourceValue,
    ConfigValueType, LlmConfig, ResponseFormat,
};
pub use error::{ConfigError, LlmError, Result};
pub use stream::DeltaDecoder;
pub use types::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChatRole, Choice, ChunkChoice,
    CompletionOptions, Delta, ResponseFormatSpec, ResponseMessage, Usage, DEFAULT_SEED,
    DEFAULT_STOP_TOKEN,
};
