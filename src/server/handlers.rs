use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::analysis::AnalysisReport;
use crate::consts::TEST_MESSAGE;
use crate::flow::{FlowInput, FlowReply, FlowRequest, clean_response};
use crate::scrape::{ScrapeOutcome, ScrapeRequest, normalize_username, ownership_filter};
use crate::store::Filter;

pub async fn root() -> Json<Value> {
    Json(json!({"Application Working": "True"}))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

/// Send a fixed message through the flow and report the configuration.
/// Always answers 200; failure is described in the body.
pub async fn test_config(State(state): State<AppState>) -> Json<Value> {
    let input = FlowInput::chat(TEST_MESSAGE, state.default_tweaks.clone());
    let langflow_id = state.flow_info.langflow_id.clone();
    let flow_id = state.flow_info.flow_id.clone();

    match state.flow.run(&input).await {
        Ok(raw) => Json(json!({
            "status": "success",
            "config_test": "passed",
            "langflow_id": langflow_id,
            "flow_id": flow_id,
            "test_response": raw,
        })),
        Err(e) => {
            error!(error = %format!("{e:#}"), "configuration test failed");
            Json(json!({
                "status": "error",
                "config_test": "failed",
                "error_message": format!("{e:#}"),
                "langflow_id": langflow_id,
                "flow_id": flow_id,
            }))
        }
    }
}

pub async fn run_flow(
    State(state): State<AppState>,
    payload: Result<Json<FlowRequest>, JsonRejection>,
) -> ApiResult<Json<FlowReply>> {
    let Json(request) = payload?;
    info!(message = %request.message, "processing flow request");

    let input = request.into_input(state.default_tweaks.as_ref());
    let raw = state
        .flow
        .run(&input)
        .await
        .map_err(|e| ApiError::Flow(format!("{e:#}")))?;

    let reply = clean_response(&raw).map_err(|e| ApiError::Flow(e.to_string()))?;
    Ok(Json(reply))
}

pub async fn scrape_instagram(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> ApiResult<Json<ScrapeOutcome>> {
    let Json(request) = payload?;
    let (username, results_limit) = request.validate().map_err(ApiError::Validation)?;

    let outcome = state
        .scraper
        .scrape(&username, results_limit)
        .await
        .map_err(|e| ApiError::Scrape(format!("{e:#}")))?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Json<AnalysisReport>> {
    let Json(request) = payload?;
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("message is required".to_string()))?;

    let report = state
        .analyzer
        .analyze(&message)
        .await
        .map_err(|e| ApiError::Analysis(format!("{e:#}")))?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ProfilesQuery {
    pub username: Option<String>,
}

/// Stored scrape documents, optionally only those of one username.
pub async fn profiles(
    State(state): State<AppState>,
    Query(query): Query<ProfilesQuery>,
) -> ApiResult<Json<Value>> {
    let filter = match query.username.as_deref() {
        None => Filter::new(),
        Some(raw) => {
            let username = normalize_username(raw)
                .ok_or_else(|| ApiError::Validation(format!("invalid username: {raw:?}")))?;
            ownership_filter(&username)
        }
    };

    let documents = state
        .store
        .find(&state.collection, &filter)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read stored data: {e:#}")))?;

    Ok(Json(json!({
        "collection": state.collection,
        "count": documents.len(),
        "documents": documents,
    })))
}
