//! LLM gateway.
//!
//! One `complete(prompt) -> text` contract over heterogeneous providers.
//! Providers are selected by name from a [`ProviderRegistry`]; the
//! [`LlmGateway`] caches the constructed client until its settings change.

pub mod anthropic;
mod error;
mod gateway;
pub mod ollama;
pub mod openai;
mod provider;

pub use error::{LlmError, LlmResult};
pub use gateway::LlmGateway;
pub use provider::{LanguageModel, ProviderConstructor, ProviderRegistry};
