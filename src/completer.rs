//! HTTP text-completion providers.
//!
//! Implements [`TextCompleter`] for:
//! - **[`OpenAiCompleter`]**: any OpenAI-compatible `POST {url}/chat/completions`.
//! - **[`OllamaCompleter`]**: a local Ollama instance's `POST {url}/api/generate`.
//!
//! Use [`create_completer`] to pick the implementation from `[ai]` config;
//! `provider = "disabled"` yields a [`DisabledCompleter`] and the pipeline
//! runs its heuristic fallbacks.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use knowledge_digest_core::completer::{
    CompletionOptions, DisabledCompleter, ModelTier, TextCompleter,
};

use crate::config::AiConfig;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Delay before retry `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// POST `body` to `url`, retrying transient failures.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(attempt, delay_secs = delay.as_secs(), "{} retrying", label);
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

fn build_client(config: &AiConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Completion provider for OpenAI-compatible chat APIs.
///
/// The API key is read from the environment variable named by
/// `ai.api_key_env` when the provider is created.
pub struct OpenAiCompleter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    screening_model: String,
    max_retries: u32,
}

impl OpenAiCompleter {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("ai.model required for OpenAI provider"))?;
        let screening_model = config
            .screening_model()
            .map(str::to_string)
            .unwrap_or_else(|| model.clone());
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        Ok(Self {
            client: build_client(config)?,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            model,
            screening_model,
            max_retries: config.max_retries,
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Economy => &self.screening_model,
            ModelTier::Standard => &self.model,
        }
    }
}

#[async_trait]
impl TextCompleter for OpenAiCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model_for(options.tier),
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        let json = post_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Completion provider for a local Ollama instance.
pub struct OllamaCompleter {
    client: reqwest::Client,
    url: String,
    model: String,
    screening_model: String,
    max_retries: u32,
}

impl OllamaCompleter {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("ai.model required for Ollama provider"))?;
        let screening_model = config
            .screening_model()
            .map(str::to_string)
            .unwrap_or_else(|| model.clone());
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: build_client(config)?,
            url: url.trim_end_matches('/').to_string(),
            model,
            screening_model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl TextCompleter for OllamaCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let model = match options.tier {
            ModelTier::Economy => &self.screening_model,
            ModelTier::Standard => &self.model,
        };
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        });
        let json = post_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))
}

/// Create the completer selected by `config.provider`.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot
/// be initialized (missing model or API key).
pub fn create_completer(config: &AiConfig) -> Result<Box<dyn TextCompleter>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledCompleter)),
        "openai" => Ok(Box::new(OpenAiCompleter::new(config)?)),
        "ollama" => Ok(Box::new(OllamaCompleter::new(config)?)),
        other => bail!("Unknown AI provider: {}", other),
    }
}
