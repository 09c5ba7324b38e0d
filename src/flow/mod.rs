pub mod langflow;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Per-node configuration overrides, keyed by node id.
pub type Tweaks = Map<String, Value>;

/// Body of `POST /run-flow`.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowRequest {
    pub message: String,
    /// `None`: key absent, use the server defaults.
    /// `Some(None)`: explicit `null`, send no tweaks.
    #[serde(default, deserialize_with = "present")]
    pub tweaks: Option<Option<Tweaks>>,
    #[serde(default = "chat")]
    pub output_type: String,
    #[serde(default = "chat")]
    pub input_type: String,
}

fn chat() -> String {
    "chat".to_string()
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<Tweaks>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Tweaks>::deserialize(deserializer).map(Some)
}

impl FlowRequest {
    /// Resolve the request against the server's default tweaks.
    pub fn into_input(self, defaults: Option<&Tweaks>) -> FlowInput {
        let tweaks = match self.tweaks {
            None => defaults.cloned(),
            Some(explicit) => explicit,
        };
        FlowInput {
            message: self.message,
            output_type: self.output_type,
            input_type: self.input_type,
            tweaks,
        }
    }
}

/// A fully resolved flow invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowInput {
    #[serde(rename = "input_value")]
    pub message: String,
    pub output_type: String,
    pub input_type: String,
    /// Empty tweak maps are not sent.
    #[serde(skip_serializing_if = "no_tweaks")]
    pub tweaks: Option<Tweaks>,
}

fn no_tweaks(tweaks: &Option<Tweaks>) -> bool {
    tweaks.as_ref().is_none_or(Map::is_empty)
}

impl FlowInput {
    /// A chat-in, chat-out invocation.
    pub fn chat(message: &str, tweaks: Option<Tweaks>) -> Self {
        Self {
            message: message.to_string(),
            output_type: chat(),
            input_type: chat(),
            tweaks,
        }
    }
}

/// Runs a conversational flow on the external flow-execution service.
#[async_trait]
pub trait FlowRunner: Send + Sync {
    /// Returns the vendor's raw JSON answer.
    async fn run(&self, input: &FlowInput) -> Result<Value>;
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FlowError {
    #[error("No outputs in response")]
    NoOutputs,
    #[error("Malformed output structure")]
    Malformed,
}

/// The flattened chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowMessage {
    pub text: String,
    pub timestamp: String,
    pub session_id: String,
}

/// The flattened answer returned by `/run-flow`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReply {
    pub status: &'static str,
    pub message: FlowMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_steps: Option<Vec<Value>>,
}

/// Unwrap `outputs[0].outputs[0].results.message` into a [`FlowReply`].
pub fn clean_response(raw: &Value) -> Result<FlowReply, FlowError> {
    debug!(raw = %raw, "flow response");

    let first = raw
        .get("outputs")
        .and_then(Value::as_array)
        .and_then(|outputs| outputs.first())
        .ok_or(FlowError::NoOutputs)?;

    let first = first
        .as_object()
        .filter(|obj| !obj.is_empty())
        .ok_or(FlowError::Malformed)?;

    let empty = Value::Object(Map::new());
    let message = first
        .get("outputs")
        .and_then(|outputs| outputs.get(0))
        .and_then(|output| output.get("results"))
        .and_then(|results| results.get("message"))
        .unwrap_or(&empty);

    let field = |name: &str| {
        message
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let agent_steps = message
        .get("content_blocks")
        .and_then(Value::as_array)
        .filter(|blocks| !blocks.is_empty())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("title").and_then(Value::as_str) == Some("Agent Steps"))
                .map(|block| {
                    block
                        .get("contents")
                        .cloned()
                        .unwrap_or_else(|| Value::Array(Vec::new()))
                })
                .collect()
        });

    Ok(FlowReply {
        status: "success",
        message: FlowMessage {
            text: field("text"),
            timestamp: field("timestamp"),
            session_id: field("session_id"),
        },
        agent_steps,
    })
}
