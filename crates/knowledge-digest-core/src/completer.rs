//! Text-completion provider trait.
//!
//! The AI filter only needs "prompt in, text out". Concrete HTTP providers
//! (OpenAI-compatible, Ollama) live in the `knowledge-digest` app crate;
//! this module carries the trait plus two in-process implementations used
//! when AI is disabled and in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

/// Which model a request should go to.
///
/// Screening runs on many small batches and uses the cheaper model;
/// clustering and summaries use the main one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTier {
    Economy,
    #[default]
    Standard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub tier: ModelTier,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
            tier: ModelTier::Standard,
        }
    }
}

impl CompletionOptions {
    pub fn economy(max_tokens: u32) -> Self {
        Self {
            temperature: 0.1,
            max_tokens,
            tier: ModelTier::Economy,
        }
    }
}

/// A backend that turns a prompt into a completion.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    /// Identifier of the main model (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Whether calls can succeed at all. Callers skip AI stages when false.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

/// Provider used when `ai.provider = "disabled"`. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCompleter;

#[async_trait]
impl TextCompleter for DisabledCompleter {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        bail!("AI provider is disabled")
    }
}

/// Replays canned responses in order.
///
/// Once the script is exhausted the fallback is returned for every call;
/// without a fallback, calls fail.
#[derive(Debug)]
pub struct FixedCompleter {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<(String, ModelTier)>>,
}

impl FixedCompleter {
    /// Always answer with `response`.
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer with each response once, then fail.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let completer = Self::scripted(Vec::<String>::new());
        completer.push_error(message);
        completer
    }

    /// Queue an error as the next scripted response.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(message.into()));
    }

    /// Prompts seen so far, with the tier they were sent to.
    pub fn prompts(&self) -> Vec<(String, ModelTier)> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TextCompleter for FixedCompleter {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((prompt.to_string(), options.tier));

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => bail!(message),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => bail!("no scripted response left"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_always_fails() {
        let c = DisabledCompleter;
        assert!(!c.is_enabled());
        assert!(c.complete("hi", &CompletionOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_then_exhausted() {
        let c = FixedCompleter::scripted(["a", "b"]);
        let opts = CompletionOptions::default();
        assert_eq!(c.complete("1", &opts).await.unwrap(), "a");
        assert_eq!(c.complete("2", &opts).await.unwrap(), "b");
        assert!(c.complete("3", &opts).await.is_err());
        assert_eq!(c.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_always_records_tier() {
        let c = FixedCompleter::always("ok");
        c.complete("p", &CompletionOptions::economy(100)).await.unwrap();
        assert_eq!(c.complete("q", &CompletionOptions::default()).await.unwrap(), "ok");
        let tiers: Vec<ModelTier> = c.prompts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(tiers, vec![ModelTier::Economy, ModelTier::Standard]);
    }

    #[tokio::test]
    async fn test_failing() {
        let c = FixedCompleter::failing("boom");
        let err = c.complete("p", &CompletionOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
