// src/genai/mod.rs
//! Generative-text collaborator: summary + embedding.

pub mod gemini;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Credentials, SyncSettings};

pub const ENV_GENAI_TEST_MODE: &str = "GENAI_TEST_MODE";

#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// One generation call; no retry, no streaming.
    async fn summarize(&self, prompt: &str) -> Result<String>;
    /// Must return exactly `dimensions` values.
    async fn embed(&self, text: &str, dimensions: u32) -> Result<Vec<f32>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynGenerator = Arc<dyn TextGenerator>;

/// Prompt sent to the summarizer.
pub fn summary_prompt(ticker: &str, digest: &str) -> String {
    format!("Summarize for {ticker}: {digest}")
}

/// Collapse whitespace runs; models like to pad with blank lines.
pub fn clean_summary(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// * `GENAI_TEST_MODE=mock` returns the deterministic [`MockGenerator`].
/// * Otherwise Gemini, keyed by the injected credentials.
pub fn build_generator(creds: &Credentials, settings: &SyncSettings) -> Result<DynGenerator> {
    if std::env::var(ENV_GENAI_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        tracing::warn!(target: "genai", "GENAI_TEST_MODE=mock, using mock generator");
        return Ok(Arc::new(MockGenerator::default()));
    }
    let key = creds.gemini_api_key.clone().unwrap_or_default();
    Ok(Arc::new(gemini::GeminiClient::new(
        key,
        &settings.summary_model,
        &settings.embedding_model,
    )?))
}

/// Echoes a fixed summary and a constant embedding of the requested size.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    pub summary: String,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            summary: "Neutral summary (mock)".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for MockGenerator {
    async fn summarize(&self, _prompt: &str) -> Result<String> {
        Ok(self.summary.clone())
    }
    async fn embed(&self, _text: &str, dimensions: u32) -> Result<Vec<f32>> {
        Ok(vec![0.0; dimensions as usize])
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_ticker_and_digest() {
        assert_eq!(summary_prompt("AAPL", "A. B. C"), "Summarize for AAPL: A. B. C");
    }

    #[test]
    fn summary_whitespace_is_collapsed() {
        assert_eq!(clean_summary("\n\n Shares  rose.\nGuidance held. "), "Shares rose. Guidance held.");
    }

    #[tokio::test]
    async fn mock_embedding_has_requested_size() {
        let m = MockGenerator::default();
        assert_eq!(m.embed("x", 16).await.unwrap().len(), 16);
    }
}
