pub mod chart;
pub mod gemini;
pub mod mock;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::prompts::analysis::{build_chunk_prompt, build_synthesis_prompt};

use chart::{Chart, engagement_chart};

/// Returned when no group produced an answer.
pub const NO_ANSWER: &str = "Sorry, I couldn't process the data properly.";

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Split records into groups of `size`. The last group may be shorter.
pub fn chunk_records(records: &[Value], size: usize) -> Vec<&[Value]> {
    records.chunks(size.max(1)).collect()
}

/// Read the dataset: a JSON array of records.
pub async fn load_dataset(path: &Path) -> Result<Vec<Value>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("dataset {} is not valid JSON", path.display()))?;
    match value {
        Value::Array(records) => Ok(records),
        _ => bail!("dataset {} must be a JSON array", path.display()),
    }
}

/// Response of `POST /analysis`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub status: &'static str,
    pub analysis: String,
    pub visualization: Chart,
}

/// Splits a dataset into groups, asks the model about each group
/// concurrently, then asks it once more to merge the answers.
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
    dataset: PathBuf,
    chunk_size: usize,
    max_concurrency: usize,
}

impl Analyzer {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        dataset: PathBuf,
        chunk_size: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            model,
            dataset,
            chunk_size: chunk_size.max(1),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn dataset(&self) -> &Path {
        &self.dataset
    }

    /// Load the dataset fresh and analyze it against `prompt`.
    pub async fn analyze(&self, prompt: &str) -> Result<AnalysisReport> {
        let records = load_dataset(&self.dataset).await?;
        let analysis = self.analyze_records(&records, prompt).await;
        Ok(AnalysisReport {
            status: "success",
            analysis,
            visualization: engagement_chart(&records),
        })
    }

    pub async fn analyze_records(&self, records: &[Value], prompt: &str) -> String {
        let chunks = chunk_records(records, self.chunk_size);
        info!(records = records.len(), chunks = chunks.len(), "analyzing dataset");

        // Futures are built before streaming: a borrowing closure inside the
        // stream leaves the handler future without a general `Send` bound.
        let asks: Vec<_> = chunks
            .into_iter()
            .map(|chunk| self.ask(chunk, prompt))
            .collect();
        let answers: Vec<Result<String>> = stream::iter(asks)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        self.merge(answers).await
    }

    async fn ask(&self, chunk: &[Value], prompt: &str) -> Result<String> {
        let full_prompt = build_chunk_prompt(chunk, prompt)?;
        self.model.generate(&full_prompt).await
    }

    async fn merge(&self, answers: Vec<Result<String>>) -> String {
        let valid: Vec<String> = answers
            .into_iter()
            .enumerate()
            .filter_map(|(i, answer)| match answer {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(chunk = i, error = %format!("{e:#}"), "chunk analysis failed");
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            return NO_ANSWER.to_string();
        }

        let combined = valid.join("\n\n");
        match self.model.generate(&build_synthesis_prompt(&combined)).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "synthesis failed, returning combined answers");
                combined
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"n": i})).collect()
    }

    #[test]
    fn chunks_of_five() {
        let data = records(12);
        let chunks = chunk_records(&data, 5);
        let sizes: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(chunks[2][0], json!({"n": 10}));
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let data = records(10);
        assert_eq!(chunk_records(&data, 5).len(), 2);
    }

    #[test]
    fn empty_dataset_has_no_chunks() {
        assert!(chunk_records(&[], 5).is_empty());
    }

    #[test]
    fn zero_size_is_treated_as_one() {
        let data = records(3);
        assert_eq!(chunk_records(&data, 0).len(), 3);
    }

    #[tokio::test]
    async fn load_dataset_requires_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        tokio::fs::write(&path, r#"{"not": "a list"}"#).await.unwrap();
        let err = load_dataset(&path).await.unwrap_err();
        assert!(err.to_string().contains("must be a JSON array"));
    }

    #[tokio::test]
    async fn load_dataset_missing_file() {
        let err = load_dataset(Path::new("/nonexistent/data.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read dataset"));
    }
}
