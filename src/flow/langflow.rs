use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

use super::{FlowInput, FlowRunner};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Where a hosted flow lives and how to authenticate against it.
#[derive(Debug, Clone, Default)]
pub struct LangflowConfig {
    pub base_url: Option<String>,
    pub langflow_id: Option<String>,
    pub flow_id: Option<String>,
    pub application_token: Option<String>,
}

impl LangflowConfig {
    /// `{base}/lf/{langflow_id}/api/v1/run/{flow_id}`
    pub fn run_url(&self) -> Result<String> {
        let base = required(&self.base_url, "BASE_API_URL")?;
        let langflow_id = required(&self.langflow_id, "LANGFLOW_ID")?;
        let flow_id = required(&self.flow_id, "FLOW_ID")?;
        Ok(format!(
            "{}/lf/{}/api/v1/run/{}",
            base.trim_end_matches('/'),
            langflow_id,
            flow_id
        ))
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{} is not set", name))
}

/// Relays messages to a hosted Langflow flow.
pub struct LangflowRunner {
    client: reqwest::Client,
    config: LangflowConfig,
}

impl LangflowRunner {
    pub fn new(config: LangflowConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build flow client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl FlowRunner for LangflowRunner {
    async fn run(&self, input: &FlowInput) -> Result<Value> {
        let url = self.config.run_url()?;
        info!(message = %input.message, "running flow");

        let mut req = self.client.post(&url).json(input);
        if let Some(token) = &self.config.application_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("flow request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(%status, body = %text, "flow execution failed");
            bail!("Flow execution failed ({}): {}", status, text);
        }

        resp.json().await.context("flow service returned invalid JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LangflowConfig {
        LangflowConfig {
            base_url: Some("https://flows.example.com/".to_string()),
            langflow_id: Some("lf-1".to_string()),
            flow_id: Some("flow-9".to_string()),
            application_token: None,
        }
    }

    #[test]
    fn run_url_joins_parts() {
        assert_eq!(
            config().run_url().unwrap(),
            "https://flows.example.com/lf/lf-1/api/v1/run/flow-9"
        );
    }

    #[test]
    fn run_url_reports_missing_setting() {
        let cfg = LangflowConfig {
            flow_id: None,
            ..config()
        };
        let err = cfg.run_url().unwrap_err();
        assert!(err.to_string().contains("FLOW_ID"));
    }

    #[test]
    fn empty_setting_counts_as_missing() {
        let cfg = LangflowConfig {
            base_url: Some(String::new()),
            ..config()
        };
        assert!(cfg.run_url().unwrap_err().to_string().contains("BASE_API_URL"));
    }

    #[tokio::test]
    async fn unconfigured_runner_fails_before_sending() {
        let runner = LangflowRunner::new(LangflowConfig::default()).unwrap();
        let err = runner
            .run(&FlowInput::chat("hi", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not set"));
    }
}
