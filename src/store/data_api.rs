//! Managed document database reached through its JSON Data API.
//!
//! Every operation is one POST of a single-command body such as
//! `{"insertOne": {"document": ...}}` to the collection URL. Errors come back
//! as a 200 with an `errors` array, so the body is always inspected.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{DocumentStore, Filter};

pub const DEFAULT_KEYSPACE: &str = "default_keyspace";
const API_PATH: &str = "api/json/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on `deleteMany` rounds, each of which removes one server page.
const MAX_DELETE_ROUNDS: usize = 1_000;

pub struct DataApiStore {
    client: reqwest::Client,
    endpoint: String,
    keyspace: String,
    token: String,
}

impl DataApiStore {
    pub fn new(endpoint: &str, token: &str, keyspace: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build data api client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            keyspace: keyspace.unwrap_or(DEFAULT_KEYSPACE).to_string(),
            token: token.to_string(),
        })
    }

    fn keyspace_url(&self) -> String {
        format!("{}/{}/{}", self.endpoint, API_PATH, self.keyspace)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.keyspace_url(), collection)
    }

    async fn command(&self, url: &str, body: Value) -> Result<Value> {
        debug!(url, command = %body, "data api command");
        let resp = self
            .client
            .post(url)
            .header("Token", &self.token)
            .json(&body)
            .send()
            .await
            .context("data api request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("data api error ({}): {}", status, text);
        }

        let reply: Value = resp.json().await.context("data api returned invalid JSON")?;
        check_errors(&reply)?;
        Ok(reply)
    }
}

/// Surface the first entry of an `errors` array, if any.
fn check_errors(reply: &Value) -> Result<()> {
    if let Some(errors) = reply.get("errors").and_then(Value::as_array)
        && let Some(first) = errors.first()
    {
        let message = first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("data api rejected command: {}", message);
    }
    Ok(())
}

fn status_u64(reply: &Value, field: &str) -> Result<u64> {
    reply
        .pointer(&format!("/status/{field}"))
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("data api reply has no status.{field}"))
}

#[async_trait]
impl DocumentStore for DataApiStore {
    async fn insert_one(&self, collection: &str, document: Value) -> Result<String> {
        let reply = self
            .command(
                &self.collection_url(collection),
                json!({"insertOne": {"document": document}}),
            )
            .await?;
        let id = reply
            .pointer("/status/insertedIds/0")
            .ok_or_else(|| anyhow!("data api did not return an inserted id"))?;
        Ok(match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let url = self.collection_url(collection);
        let mut documents = Vec::new();
        let mut page_state: Option<String> = None;

        loop {
            let mut find = json!({"filter": filter});
            if let Some(state) = &page_state {
                find["options"] = json!({"pageState": state});
            }
            let reply = self.command(&url, json!({"find": find})).await?;

            if let Some(page) = reply.pointer("/data/documents").and_then(Value::as_array) {
                documents.extend(page.iter().cloned());
            }
            page_state = reply
                .pointer("/data/nextPageState")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_state.is_none() {
                return Ok(documents);
            }
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let url = self.collection_url(collection);
        let mut deleted = 0;

        for _ in 0..MAX_DELETE_ROUNDS {
            let reply = self
                .command(&url, json!({"deleteMany": {"filter": filter}}))
                .await?;
            // An unfiltered delete reports -1 instead of a count.
            if let Some(count) = reply.pointer("/status/deletedCount").and_then(Value::as_u64) {
                deleted += count;
            }
            let more = reply
                .pointer("/status/moreData")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !more {
                return Ok(deleted);
            }
        }

        bail!("deleteMany did not finish after {} rounds", MAX_DELETE_ROUNDS)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let reply = self
            .command(
                &self.collection_url(collection),
                json!({"countDocuments": {"filter": filter}}),
            )
            .await?;
        status_u64(&reply, "count")
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let reply = self
            .command(&self.keyspace_url(), json!({"findCollections": {}}))
            .await?;
        let names = reply
            .pointer("/status/collections")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("data api reply has no collection list"))?;
        Ok(names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }
}
