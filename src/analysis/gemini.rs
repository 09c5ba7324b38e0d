use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::LanguageModel;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A language model served by the Gemini `generateContent` API.
pub struct GeminiModel {
    client: reqwest::Client,
    model: String,
    api_key: Option<String>,
}

impl GeminiModel {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build language model client")?;
        Ok(Self {
            client,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", API_BASE, self.model)
    }

    fn body(prompt: &str) -> ApiRequest<'_> {
        ApiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        }
    }

    /// Join the text parts of the first candidate.
    fn extract_text(resp: ApiResponse) -> Result<String> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("language model returned no candidates"))?;

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            bail!("language model returned empty response");
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("GEMINI_API_KEY is not set"))?;

        debug!(model = %self.model, prompt_len = prompt.len(), "generating");

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&Self::body(prompt))
            .send()
            .await
            .context("language model request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("language model API error ({}): {}", status, text);
        }

        let api_resp: ApiResponse = resp.json().await.context("invalid language model response")?;
        Self::extract_text(api_resp)
    }
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<String> {
        GeminiModel::extract_text(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn joins_text_parts() {
        let text = parse(
            r#"{"candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(text, "Hello, world");
    }

    #[test]
    fn only_first_candidate_is_used() {
        let text = parse(
            r#"{"candidates": [
                {"content": {"parts": [{"text": "first"}]}},
                {"content": {"parts": [{"text": "second"}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(text, "first");
    }

    #[test]
    fn no_candidates_fails() {
        assert!(parse(r#"{}"#).unwrap_err().to_string().contains("no candidates"));
    }

    #[test]
    fn empty_text_fails() {
        let err = parse(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(GeminiModel::body("hi")).unwrap();
        assert_eq!(body, serde_json::json!({"contents": [{"parts": [{"text": "hi"}]}]}));
    }

    #[test]
    fn url_names_model() {
        let model = GeminiModel::new(None, Some("gemini-pro".to_string())).unwrap();
        assert!(model.url().ends_with("/models/gemini-pro:generateContent"));
        assert_eq!(model.model(), "gemini-pro");
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let model = GeminiModel::new(None, None).unwrap();
        let err = model.generate("hi").await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
