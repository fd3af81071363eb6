//! JSON API over the shared [`PipelineService`].

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use pipeline_bridge_core::contract::PipelineRequest;
use pipeline_bridge_core::execution::ExecutionRecord;
use pipeline_bridge_core::gitlab::{GitLabSettings, PollPolicy};
use pipeline_bridge_core::service::{PipelineService, StatusQuery};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ServerError;

pub const SERVICE_NAME: &str = "CICD Pipeline MCP Server";

#[derive(Clone)]
pub struct AppState {
    pub service: PipelineService,
    pub gitlab_url: String,
    pub gitlab_configured: bool,
    pub poll: PollPolicy,
}

impl AppState {
    pub fn new(service: PipelineService, settings: &GitLabSettings) -> Self {
        Self {
            service,
            gitlab_url: settings.base_url.clone(),
            gitlab_configured: settings.is_configured(),
            poll: PollPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub gitlab_pipeline_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/status/{execution_id}", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<ExecutionRecord>, ServerError> {
    let record = state.service.execute(request, None, Utc::now()).await?;
    Ok(Json(record))
}

async fn status(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    Query(params): Query<StatusParams>,
) -> Result<Json<Value>, ServerError> {
    let query = StatusQuery {
        execution_id,
        gitlab_pipeline_id: params.gitlab_pipeline_id,
        wait: params.wait.then_some(state.poll),
    };
    info!(
        component = "http",
        event = "status_requested",
        execution_id = %query.execution_id,
        wait = params.wait,
    );
    state
        .service
        .status(&query, Utc::now())
        .await?
        .map(Json)
        .ok_or(ServerError::NotFound)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "gitlab_url": state.gitlab_url,
        "gitlab_configured": state.gitlab_configured,
    }))
}

async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "execute": "POST /execute",
            "status": "GET /status/{execution_id}",
            "health": "GET /health",
        },
        "gitlab": {
            "url": state.gitlab_url,
            "configured": state.gitlab_configured,
        },
    }))
}
