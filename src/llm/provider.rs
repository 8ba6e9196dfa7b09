//! Provider abstraction and the name → constructor registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::anthropic::AnthropicModel;
use super::error::{LlmError, LlmResult};
use super::ollama::OllamaModel;
use super::openai::OpenAiModel;
use crate::config::LlmSettings;

/// A text-completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name, for logs.
    fn provider(&self) -> &str;

    /// Complete `prompt` and return the raw text the model produced.
    async fn complete(&self, prompt: &str) -> LlmResult<String>;
}

/// Builds a client from settings.
pub type ProviderConstructor =
    Arc<dyn Fn(&LlmSettings) -> LlmResult<Arc<dyn LanguageModel>> + Send + Sync>;

/// Maps provider names to constructors. Names are case-insensitive.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `openai`, `anthropic` and `ollama` providers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("openai", |s| {
            Ok(Arc::new(OpenAiModel::new(s)?) as Arc<dyn LanguageModel>)
        });
        registry.register("anthropic", |s| {
            Ok(Arc::new(AnthropicModel::new(s)?) as Arc<dyn LanguageModel>)
        });
        registry.register("ollama", |s| {
            Ok(Arc::new(OllamaModel::new(s)?) as Arc<dyn LanguageModel>)
        });
        registry
    }

    /// Register (or replace) a provider.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&LlmSettings) -> LlmResult<Arc<dyn LanguageModel>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.trim().to_lowercase(), Arc::new(constructor));
        self
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a client for `settings.provider`.
    pub fn build(&self, settings: &LlmSettings) -> LlmResult<Arc<dyn LanguageModel>> {
        let key = settings.provider_key();
        let constructor = self.constructors.get(&key).ok_or_else(|| {
            LlmError::unavailable(
                &settings.provider,
                format!("unknown provider; available: {}", self.names().join(", ")),
            )
        })?;
        constructor(settings)
    }
}

/// An HTTP client with the configured request timeout.
pub(crate) fn http_client(provider: &str, settings: &LlmSettings) -> LlmResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
        .build()
        .map_err(|e| LlmError::unavailable(provider, e.to_string()))
}

/// The configured API key, or `ProviderUnavailable` naming the variable to set.
pub(crate) fn require_api_key(
    provider: &str,
    settings: &LlmSettings,
    env_var: &str,
) -> LlmResult<String> {
    settings
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| LlmError::unavailable(provider, format!("{} is not set", env_var)))
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
