use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::Actor;
use crate::consts::ACTOR_TIMEOUT_SECS;

pub const DEFAULT_BASE_URL: &str = "https://api.apify.com";
pub const DEFAULT_ACTOR: &str = "apify/instagram-scraper";

/// Slack on top of the actor's own timeout for queueing and transfer.
const TRANSPORT_SLACK: Duration = Duration::from_secs(30);

/// Runs a hosted scraping actor synchronously and returns its dataset.
pub struct ApifyActor {
    client: reqwest::Client,
    base_url: String,
    actor: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl ApifyActor {
    pub fn new(token: Option<String>, base_url: Option<String>) -> Result<Self> {
        let timeout_secs = ACTOR_TIMEOUT_SECS;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs) + TRANSPORT_SLACK)
            .build()
            .context("failed to build actor client")?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            actor: DEFAULT_ACTOR.to_string(),
            token,
            timeout_secs,
        })
    }

    /// Use a different actor, given as `owner/name`.
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    fn run_url(&self, token: &str) -> Result<Url> {
        let path = format!(
            "{}/v2/acts/{}/run-sync-get-dataset-items",
            self.base_url,
            self.actor.replace('/', "~")
        );
        let timeout = self.timeout_secs.to_string();
        Url::parse_with_params(&path, &[("token", token), ("timeout", timeout.as_str())])
            .context("invalid actor url")
    }
}

#[async_trait]
impl Actor for ApifyActor {
    async fn call(&self, input: &Value) -> Result<Vec<Value>> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("APIFY_API_TOKEN is not set"))?;

        let results_type = input
            .get("resultsType")
            .and_then(Value::as_str)
            .unwrap_or("default");
        info!(actor = %self.actor, results_type, "calling actor");

        let resp = self
            .client
            .post(self.run_url(token)?)
            .json(input)
            .send()
            .await
            .context("actor request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("actor run failed ({}): {}", status, text);
        }

        let body: Value = resp.json().await.context("actor returned invalid JSON")?;
        match body {
            Value::Array(items) => {
                info!(results_type, items = items.len(), "actor finished");
                Ok(items)
            }
            other => bail!("actor returned a non-list dataset: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_url_encodes_actor_and_params() {
        let actor = ApifyActor::new(None, Some("https://api.example.com/".to_string())).unwrap();
        let url = actor.run_url("secret").unwrap();
        assert_eq!(url.path(), "/v2/acts/apify~instagram-scraper/run-sync-get-dataset-items");
        let query: Vec<_> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert!(query.contains(&("token".to_string(), "secret".to_string())));
        assert!(query.contains(&("timeout".to_string(), "100".to_string())));
    }

    #[test]
    fn custom_actor() {
        let actor = ApifyActor::new(None, None).unwrap().with_actor("me/profile-scraper");
        let url = actor.run_url("t").unwrap();
        assert!(url.path().contains("me~profile-scraper"));
        assert!(url.as_str().starts_with(DEFAULT_BASE_URL));
    }

    #[tokio::test]
    async fn missing_token_fails_before_sending() {
        let actor = ApifyActor::new(None, None).unwrap();
        let err = actor.call(&serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("APIFY_API_TOKEN"));
    }
}
