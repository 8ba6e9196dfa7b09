//! Cached, reconfigurable access to the selected provider.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::{LlmError, LlmResult};
use super::provider::{LanguageModel, ProviderRegistry};
use crate::config::LlmSettings;

/// Single entry point for completions.
///
/// The constructed client is cached together with the settings it was built
/// from. Construction happens under an async mutex, so concurrent first calls
/// build exactly one client. A call whose settings differ from the cached ones
/// builds a fresh client.
pub struct LlmGateway {
    registry: ProviderRegistry,
    settings: RwLock<LlmSettings>,
    cached: Mutex<Option<(LlmSettings, Arc<dyn LanguageModel>)>>,
}

impl LlmGateway {
    pub fn new(settings: LlmSettings, registry: ProviderRegistry) -> Self {
        Self {
            registry,
            settings: RwLock::new(settings),
            cached: Mutex::new(None),
        }
    }

    /// Gateway over the built-in providers.
    pub fn with_builtins(settings: LlmSettings) -> Self {
        Self::new(settings, ProviderRegistry::with_builtins())
    }

    /// Current provider settings.
    pub fn settings(&self) -> LlmSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the provider settings. The next call uses a client built from them.
    pub fn reconfigure(&self, settings: LlmSettings) {
        info!(provider = %settings.provider, model = ?settings.model, "llm gateway reconfigured");
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Complete `prompt` with the current settings.
    pub async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let settings = self.settings();
        self.complete_with(prompt, &settings).await
    }

    /// Complete `prompt` with explicit settings, reusing the cached client when
    /// they match.
    pub async fn complete_with(&self, prompt: &str, settings: &LlmSettings) -> LlmResult<String> {
        let client = self.client_for(settings).await?;
        let limit = Duration::from_secs(settings.timeout_secs.max(1));

        debug!(provider = client.provider(), prompt_len = prompt.len(), "requesting completion");
        match tokio::time::timeout(limit, client.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::unavailable(
                &settings.provider,
                format!("timed out after {} seconds", limit.as_secs()),
            )),
        }
    }

    async fn client_for(&self, settings: &LlmSettings) -> LlmResult<Arc<dyn LanguageModel>> {
        let mut cached = self.cached.lock().await;
        if let Some((built_from, client)) = cached.as_ref() {
            if built_from == settings {
                return Ok(Arc::clone(client));
            }
        }

        let client = self.registry.build(settings)?;
        info!(provider = %settings.provider, model = ?settings.model, "llm client built");
        *cached = Some((settings.clone(), Arc::clone(&client)));
        Ok(client)
    }
}
