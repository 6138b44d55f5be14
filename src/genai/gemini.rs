// src/genai/gemini.rs
//! Gemini REST provider (v1beta `generateContent` / `embedContent`).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::{clean_summary, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    summary_model: String,
    embedding_model: String,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}
#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}
#[derive(Serialize)]
struct GenerateReq<'a> {
    contents: Vec<Content<'a>>,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedReq<'a> {
    model: String,
    content: Content<'a>,
    output_dimensionality: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResp {
    #[serde(default)]
    candidates: Vec<Candidate>,
}
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}
#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}
#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}
#[derive(Debug, Deserialize)]
struct EmbedResp {
    embedding: Option<EmbeddingValues>,
}
#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiClient {
    pub fn new(api_key: String, summary_model: &str, embedding_model: &str) -> Result<Self> {
        Self::with_base_url(api_key, summary_model, embedding_model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: String,
        summary_model: &str,
        embedding_model: &str,
        base_url: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("ticker-news-sync/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building gemini http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            summary_model: summary_model.to_string(),
            embedding_model: embedding_model.to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        model: &str,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let resp = self
            .http
            .post(format!("{}/models/{}:{}", self.base_url, model, method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("gemini {method}"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("gemini {method} returned {status}: {}", text.trim());
        }
        resp.json().await.with_context(|| format!("gemini {method} body"))
    }
}

fn summary_text(resp: GenerateResp) -> Result<String> {
    let first = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no candidates in response"))?;
    let text: String = first
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let cleaned = clean_summary(&text);
    if cleaned.is_empty() {
        bail!("empty summary text");
    }
    Ok(cleaned)
}

fn embedding_values(resp: EmbedResp, dimensions: u32) -> Result<Vec<f32>> {
    let values = resp
        .embedding
        .map(|e| e.values)
        .ok_or_else(|| anyhow!("response missing `embedding.values`"))?;
    if values.len() != dimensions as usize {
        bail!(
            "embedding has {} dimensions, expected {}",
            values.len(),
            dimensions
        );
    }
    Ok(values)
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let req = GenerateReq {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let resp: GenerateResp = self
            .post(&self.summary_model, "generateContent", &req)
            .await?;
        summary_text(resp)
    }

    async fn embed(&self, text: &str, dimensions: u32) -> Result<Vec<f32>> {
        let req = EmbedReq {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                parts: vec![Part { text }],
            },
            output_dimensionality: dimensions,
        };
        let resp: EmbedResp = self
            .post(&self.embedding_model, "embedContent", &req)
            .await?;
        embedding_values(resp, dimensions)
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_joins_parts_of_first_candidate() {
        let resp: GenerateResp = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Apple shares "}, {"text": "rose."}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(summary_text(resp).unwrap(), "Apple shares rose.");
    }

    #[test]
    fn blocked_prompt_without_candidates_is_an_error() {
        let resp: GenerateResp =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(summary_text(resp).is_err());
    }

    #[test]
    fn embedding_dimension_mismatch_is_an_error() {
        let resp: EmbedResp =
            serde_json::from_value(json!({"embedding": {"values": [0.1, 0.2, 0.3]}})).unwrap();
        let err = embedding_values(resp, 768).unwrap_err();
        assert!(err.to_string().contains("expected 768"));
    }

    #[test]
    fn embed_request_sets_output_dimensionality() {
        let req = EmbedReq {
            model: "models/text-embedding-004".into(),
            content: Content {
                parts: vec![Part { text: "hi" }],
            },
            output_dimensionality: 768,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["outputDimensionality"], 768);
        assert_eq!(v["content"]["parts"][0]["text"], "hi");
    }
}
