use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Mutex;

use super::LanguageModel;

/// A canned language model for tests.
///
/// Prompts containing a failure marker error out. Synthesis prompts get the
/// synthesis answer; every other prompt gets the chunk answer.
pub struct MockModel {
    chunk_answer: String,
    synthesis_answer: Option<String>,
    fail_marker: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new(chunk_answer: &str) -> Self {
        Self {
            chunk_answer: chunk_answer.to_string(),
            synthesis_answer: None,
            fail_marker: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer synthesis prompts with `answer`. Without this they fail.
    pub fn with_synthesis(mut self, answer: &str) -> Self {
        self.synthesis_answer = Some(answer.to_string());
        self
    }

    /// Fail any prompt containing `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(marker) = &self.fail_marker
            && prompt.contains(marker.as_str())
        {
            bail!("MockModel: refused prompt containing {:?}", marker);
        }
        if prompt.starts_with("Synthesize") {
            return match &self.synthesis_answer {
                Some(answer) => Ok(answer.clone()),
                None => bail!("MockModel: no synthesis answer"),
            };
        }
        Ok(self.chunk_answer.clone())
    }
}
