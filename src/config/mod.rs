//! Vendor settings read from the environment.
//!
//! Nothing here is mandatory at startup. A missing credential only fails the
//! request that needs it, so the relay can run with a subset of vendors.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::flow::Tweaks;
use crate::flow::langflow::LangflowConfig;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub flow: LangflowConfig,
    /// Tweaks applied when a `/run-flow` request does not send its own.
    pub default_tweaks: Option<Tweaks>,
    pub apify_token: Option<String>,
    pub apify_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub data_api_endpoint: Option<String>,
    pub data_api_token: Option<String>,
    pub data_api_keyspace: Option<String>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let default_tweaks = match get("FLOW_TWEAKS") {
            Some(raw) => Some(parse_tweaks(&raw)?),
            None => None,
        };

        Ok(Self {
            flow: LangflowConfig {
                base_url: get("BASE_API_URL"),
                langflow_id: get("LANGFLOW_ID"),
                flow_id: get("FLOW_ID"),
                application_token: get("APPLICATION_TOKEN"),
            },
            default_tweaks,
            apify_token: get("APIFY_API_TOKEN"),
            apify_base_url: get("APIFY_BASE_URL"),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL"),
            data_api_endpoint: get("ASTRAPY_API_ENDPOINT"),
            data_api_token: get("ASTRAPY_API_TOKEN"),
            data_api_keyspace: get("ASTRA_KEYSPACE"),
        })
    }

    /// Endpoint and token of the managed document database, when both are set.
    pub fn data_api(&self) -> Option<(&str, &str)> {
        Some((
            self.data_api_endpoint.as_deref()?,
            self.data_api_token.as_deref()?,
        ))
    }
}

fn parse_tweaks(raw: &str) -> Result<Tweaks> {
    let value: Value = serde_json::from_str(raw).context("FLOW_TWEAKS is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("FLOW_TWEAKS must be a JSON object keyed by node id"),
    }
}
