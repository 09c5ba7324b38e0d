use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use quant_relay::analysis::mock::MockModel;
use quant_relay::analysis::{Analyzer, LanguageModel, NO_ANSWER};

fn analyzer(model: Arc<MockModel>, chunk_size: usize) -> Analyzer {
    Analyzer::new(model, PathBuf::from("unused.json"), chunk_size, 4)
}

fn records(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({"post_id": format!("p{i}"), "post_type": "Image", "likes": i}))
        .collect()
}

#[tokio::test]
async fn one_call_per_chunk_plus_synthesis() {
    let model = Arc::new(MockModel::new("chunk insight").with_synthesis("final answer"));
    let answer = analyzer(model.clone(), 5)
        .analyze_records(&records(12), "What works best?")
        .await;

    assert_eq!(answer, "final answer");
    let prompts = model.prompts();
    assert_eq!(prompts.len(), 4);
    let synthesis = prompts.last().unwrap();
    assert!(synthesis.starts_with("Synthesize"));
    assert!(synthesis.contains("chunk insight\n\nchunk insight\n\nchunk insight"));
}

#[tokio::test]
async fn chunk_prompts_carry_records_and_question() {
    let model = Arc::new(MockModel::new("ok").with_synthesis("done"));
    analyzer(model.clone(), 2)
        .analyze_records(&records(3), "Rank the posts")
        .await;

    let prompts = model.prompts();
    let chunk_prompts: Vec<_> = prompts.iter().filter(|p| !p.starts_with("Synthesize")).collect();
    assert_eq!(chunk_prompts.len(), 2);
    assert!(chunk_prompts.iter().all(|p| p.ends_with("Rank the posts")));
    assert!(chunk_prompts.iter().any(|p| p.contains("\"p2\"")));
}

#[tokio::test]
async fn failed_chunks_are_dropped() {
    // The record "p0" only appears in the first chunk.
    let model = Arc::new(
        MockModel::new("good")
            .with_synthesis("merged")
            .failing_on("\"p0\""),
    );
    let answer = analyzer(model.clone(), 5)
        .analyze_records(&records(10), "q")
        .await;

    assert_eq!(answer, "merged");
    let synthesis = model.prompts().pop().unwrap();
    assert!(synthesis.ends_with("\ngood"));
}

#[tokio::test]
async fn all_chunks_failing_gives_apology() {
    let model = Arc::new(MockModel::new("never").failing_on("Quant Ai"));
    let answer = analyzer(model, 5).analyze_records(&records(7), "q").await;
    assert_eq!(answer, NO_ANSWER);
}

#[tokio::test]
async fn empty_dataset_gives_apology_without_calls() {
    let model = Arc::new(MockModel::new("x").with_synthesis("y"));
    let answer = analyzer(model.clone(), 5).analyze_records(&[], "q").await;
    assert_eq!(answer, NO_ANSWER);
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn synthesis_failure_returns_combined_answers() {
    let model = Arc::new(MockModel::new("partial"));
    let answer = analyzer(model, 5).analyze_records(&records(6), "q").await;
    assert_eq!(answer, "partial\n\npartial");
}

#[tokio::test]
async fn analyze_reads_dataset_and_builds_chart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    let data = json!([
        {"post_type": "Video", "likes": 100, "comments": 20},
        {"post_type": "Image", "likes": 40, "comments": 0},
    ]);
    tokio::fs::write(&path, data.to_string()).await.unwrap();

    let model = Arc::new(MockModel::new("x").with_synthesis("summary"));
    let report = Analyzer::new(model, path, 5, 2)
        .analyze("How are videos doing?")
        .await
        .unwrap();

    assert_eq!(report.status, "success");
    assert_eq!(report.analysis, "summary");
    assert_eq!(report.visualization.labels, vec!["Image Posts", "Video Posts"]);
    assert_eq!(report.visualization.datasets[0].data, vec![40.0, 120.0]);
}

#[tokio::test]
async fn analyze_surfaces_missing_dataset() {
    let model = Arc::new(MockModel::new("x"));
    let err = Analyzer::new(model, PathBuf::from("/nonexistent/data.json"), 5, 2)
        .analyze("q")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to read dataset"));
}

/// Earlier chunks answer more slowly than later ones. Tracks how many
/// chunk calls are in flight at once.
#[derive(Default)]
struct StaggeredModel {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    synthesis: Mutex<Option<String>>,
}

#[async_trait]
impl LanguageModel for StaggeredModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.starts_with("Synthesize") {
            *self.synthesis.lock().unwrap() = Some(prompt.to_string());
            return Ok("merged".to_string());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let (delay, answer) = if prompt.contains("\"p0\"") {
            (90, "first")
        } else if prompt.contains("\"p5\"") {
            (50, "second")
        } else {
            (10, "third")
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(answer.to_string())
    }
}

#[tokio::test]
async fn chunks_run_concurrently_and_keep_order() {
    let model = Arc::new(StaggeredModel::default());
    let answer = Analyzer::new(model.clone(), PathBuf::from("unused.json"), 5, 4)
        .analyze_records(&records(12), "q")
        .await;

    assert_eq!(answer, "merged");
    assert_eq!(model.peak.load(Ordering::SeqCst), 3);
    let synthesis = model.synthesis.lock().unwrap().clone().unwrap();
    assert!(synthesis.ends_with("first\n\nsecond\n\nthird"));
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let model = Arc::new(StaggeredModel::default());
    Analyzer::new(model.clone(), PathBuf::from("unused.json"), 5, 2)
        .analyze_records(&records(12), "q")
        .await;

    assert_eq!(model.peak.load(Ordering::SeqCst), 2);
}
