//! Locally served models through Ollama's generate endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{LlmError, LlmResult};
use super::provider::{endpoint, http_client, LanguageModel};
use crate::config::LlmSettings;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const PROVIDER: &str = "ollama";

pub struct OllamaModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OllamaModel {
    pub fn new(settings: &LlmSettings) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(PROVIDER, settings)?,
            model: settings.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature: settings.temperature,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadResponse(format!("Ollama API error {}: {}", status, body)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("Ollama response: {}", e)))?;

        Ok(parsed.response)
    }
}
