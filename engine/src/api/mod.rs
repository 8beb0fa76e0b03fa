//! HTTP API
//!
//! - POST /init      `{first_name, last_name}` -> `{messages, responses, meal_plan}`
//! - POST /chat      `{first_name, last_name, message, model?}` -> `{response, meal_plan}`
//! - POST /close     `{first_name, last_name}` -> `{status, message}`
//! - GET  /heartbeat -> `{status}`
//! - GET  /history/:first_name/:last_name?limit=N -> `{history, summary}`
//! - POST /feedback  `{first_name, last_name, feedback}` -> `{status}`
//!
//! Errors are `{error, hint}` JSON bodies; see [`ApiError`].

mod error;

pub use error::ApiError;

use crate::config::ServerConfig;
use crate::llm::ModelSpec;
use crate::session::{History, InitReply, SessionRegistry};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use sdk::{EngineError, UserIdentity};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub first_name: String,
    pub last_name: String,
}

impl IdentityRequest {
    fn identity(&self) -> Result<UserIdentity, EngineError> {
        UserIdentity::new(self.first_name.as_str(), self.last_name.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub first_name: String,
    pub last_name: String,
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
    pub meal_plan: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub first_name: String,
    pub last_name: String,
    pub feedback: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Build the router with tracing and CORS layers
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/init", post(init_handler))
        .route("/chat", post(chat_handler))
        .route("/close", post(close_handler))
        .route("/heartbeat", get(heartbeat_handler))
        .route("/history/:first_name/:last_name", get(history_handler))
        .route("/feedback", post(feedback_handler))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn init_handler(
    State(state): State<AppState>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<InitReply>, ApiError> {
    let identity = request.identity()?;
    let reply = state.registry.open(&identity).await?;
    Ok(Json(reply))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let identity = UserIdentity::new(request.first_name.as_str(), request.last_name.as_str())?;
    let model = parse_model(request.model.as_deref())?;

    let reply = state
        .registry
        .chat(&identity, &request.message, model.as_ref())
        .await?;

    Ok(Json(ChatResponse {
        response: reply.response,
        meal_plan: reply.meal_plan,
    }))
}

async fn close_handler(
    State(state): State<AppState>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<CloseResponse>, ApiError> {
    let identity = request.identity()?;
    let report = state.registry.close(&identity).await?;

    Ok(Json(CloseResponse {
        status: if report.success { "success" } else { "failed" }.to_string(),
        message: report.message,
    }))
}

async fn heartbeat_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn history_handler(
    State(state): State<AppState>,
    Path((first_name, last_name)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<History>, ApiError> {
    let identity = UserIdentity::new(first_name, last_name)?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.registry.history(&identity, limit).await?))
}

async fn feedback_handler(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = UserIdentity::new(request.first_name.as_str(), request.last_name.as_str())?;
    state.registry.feedback(&identity, &request.feedback).await?;
    Ok(Json(json!({ "status": "Feedback submitted successfully" })))
}

/// Optional `backend:model` field of a chat request
pub fn parse_model(raw: Option<&str>) -> Result<Option<ModelSpec>, EngineError> {
    match raw.map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: crate::llm::model::ModelSpecError| EngineError::InvalidModel(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_model_accepts_missing_and_blank() {
        assert_eq!(parse_model(None).unwrap(), None);
        assert_eq!(parse_model(Some("  ")).unwrap(), None);
        assert!(parse_model(Some("openai:gpt-4o")).unwrap().is_some());
        assert!(matches!(
            parse_model(Some("gpt-4o")),
            Err(EngineError::InvalidModel(_))
        ));
    }
}
