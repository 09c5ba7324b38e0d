use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Actor;

/// A scripted actor for tests. Answers by the input's `resultsType`
/// (`details` or `posts`) and counts how often it was called.
#[derive(Default)]
pub struct MockActor {
    datasets: HashMap<String, Result<Vec<Value>, String>>,
    calls: AtomicUsize,
}

impl MockActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `items` for runs with this `resultsType`.
    pub fn with_dataset(mut self, results_type: &str, items: Vec<Value>) -> Self {
        self.datasets.insert(results_type.to_string(), Ok(items));
        self
    }

    /// Fail runs with this `resultsType`.
    pub fn with_failure(mut self, results_type: &str, message: &str) -> Self {
        self.datasets
            .insert(results_type.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Actor for MockActor {
    async fn call(&self, input: &Value) -> Result<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let results_type = input
            .get("resultsType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match self.datasets.get(results_type) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(message)) => bail!("{}", message),
            None => Ok(Vec::new()),
        }
    }
}
