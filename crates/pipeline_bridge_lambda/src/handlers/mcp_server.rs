//! MCP server Lambda: executes pipelines for Bedrock action groups, API
//! Gateway callers and direct Lambda invocations.

use chrono::{DateTime, Utc};
use pipeline_bridge_core::action_group::{
    unknown_path, ApiGatewayRequest, ApiGatewayResponse, InvocationSource,
};
use pipeline_bridge_core::contract::{PipelineRequest, PipelineType, ValidationError};
use pipeline_bridge_core::service::{PipelineService, StatusQuery};
use serde_json::{json, Map, Value};
use tracing::info;

use super::{action_reply, error_body, param_text, parse_action_event};
use crate::error::HandlerError;

pub const EXECUTION_NOT_FOUND: &str = "Execution not found";

pub async fn handle_mcp_server_event(
    event: Value,
    service: &PipelineService,
    now: DateTime<Utc>,
) -> Value {
    let source = InvocationSource::classify(&event);
    info!(
        component = "mcp_server",
        event = "mcp_server_invoked",
        source = ?source,
    );

    match source {
        InvocationSource::ActionGroup => handle_action_group(&event, service, now).await,
        InvocationSource::ApiGateway => handle_api_gateway(&event, service, now).await.into_value(),
        InvocationSource::Direct => handle_direct(event, service, now).await,
    }
}

fn pipeline_for_path(api_path: &str) -> Option<PipelineType> {
    match api_path {
        "/mcp/execute-bootstrap" => Some(PipelineType::Bootstrap),
        "/mcp/execute-compute" => Some(PipelineType::Compute),
        "/mcp/execute-app" => Some(PipelineType::App),
        _ => None,
    }
}

async fn handle_action_group(
    event: &Value,
    service: &PipelineService,
    now: DateTime<Utc>,
) -> Value {
    let (action, params) = match parse_action_event(event) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };

    let outcome = if let Some(pipeline_type) = pipeline_for_path(&action.api_path) {
        execute(service, params, Some(pipeline_type), now).await
    } else if action.api_path == "/mcp/get-status" {
        status(service, &params, now).await
    } else {
        Ok(unknown_path(&action.api_path))
    };
    action_reply(&action, outcome)
}

async fn handle_api_gateway(
    event: &Value,
    service: &PipelineService,
    now: DateTime<Utc>,
) -> ApiGatewayResponse {
    let request = match ApiGatewayRequest::from_value(event) {
        Ok(request) => request,
        Err(failure) => return ApiGatewayResponse::error(400, failure.message()),
    };
    let body = match &request.body {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };

    let outcome = match (request.http_method.as_str(), request.path.as_str()) {
        ("POST", "/execute") => execute(service, body, None, now).await,
        ("GET", "/health") => Ok(json!({
            "status": "healthy",
            "gitlab_configured": !service.is_stub(),
        })),
        ("GET", path) if path.starts_with("/status/") => {
            let mut params = request.query.clone();
            let execution_id = request.last_path_segment().unwrap_or_default();
            params.insert("execution_id".to_string(), Value::from(execution_id));
            status(service, &params, now).await
        }
        _ => return ApiGatewayResponse::error(404, "Unknown endpoint"),
    };

    match outcome {
        Ok(payload)
            if payload.get("error").and_then(Value::as_str) == Some(EXECUTION_NOT_FOUND) =>
        {
            ApiGatewayResponse::json(404, &payload)
        }
        Ok(payload) => ApiGatewayResponse::json(200, &payload),
        Err(failure) => ApiGatewayResponse::json(failure.status_code(), &error_body(&failure)),
    }
}

async fn handle_direct(event: Value, service: &PipelineService, now: DateTime<Utc>) -> Value {
    let params = match event {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    let action = param_text(&params, "action").unwrap_or_else(|| "execute".to_string());

    let outcome = match action.as_str() {
        "execute" => execute(service, params, None, now).await,
        "status" => status(service, &params, now).await,
        other => Ok(json!({ "error": format!("Unknown action: {other}") })),
    };
    outcome.unwrap_or_else(|failure| error_body(&failure))
}

async fn execute(
    service: &PipelineService,
    params: Map<String, Value>,
    pipeline_type: Option<PipelineType>,
    now: DateTime<Utc>,
) -> Result<Value, HandlerError> {
    let request: PipelineRequest = serde_json::from_value(Value::Object(params))?;
    let record = service.execute(request, pipeline_type, now).await?;
    Ok(serde_json::to_value(record)?)
}

async fn status(
    service: &PipelineService,
    params: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<Value, HandlerError> {
    let execution_id = param_text(params, "execution_id")
        .ok_or_else(|| ValidationError::missing_field("execution_id"))?;
    let query = StatusQuery {
        gitlab_pipeline_id: param_text(params, "gitlab_pipeline_id"),
        ..StatusQuery::new(execution_id)
    };
    Ok(service
        .status(&query, now)
        .await?
        .unwrap_or_else(|| json!({ "error": EXECUTION_NOT_FOUND })))
}
