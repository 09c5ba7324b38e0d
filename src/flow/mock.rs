use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{FlowInput, FlowRunner};

/// A scripted flow runner for tests. Returns pre-defined answers in order
/// and remembers every input it was given.
pub struct MockFlowRunner {
    answers: Vec<Result<Value, String>>,
    index: AtomicUsize,
    inputs: Mutex<Vec<FlowInput>>,
}

impl MockFlowRunner {
    pub fn new(answers: Vec<Result<Value, String>>) -> Self {
        Self {
            answers,
            index: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Inputs seen so far, oldest first.
    pub fn inputs(&self) -> Vec<FlowInput> {
        self.inputs
            .lock()
            .map(|inputs| inputs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FlowRunner for MockFlowRunner {
    async fn run(&self, input: &FlowInput) -> Result<Value> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(input.clone());
        }
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        match self.answers.get(i) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
            None => anyhow::bail!("MockFlowRunner: no more answers (called {} times)", i + 1),
        }
    }
}
