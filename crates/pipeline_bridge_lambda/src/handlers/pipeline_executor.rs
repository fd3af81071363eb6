use chrono::{DateTime, Utc};
use pipeline_bridge_core::action_group::unknown_path;
use pipeline_bridge_core::contract::ValidationError;
use pipeline_bridge_core::delegation::{delegation_acknowledgement, DelegationRequest};
use pipeline_bridge_core::memory::{DeploymentRecord, ExecutionStore};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{action_reply, param_text, parse_action_event};
use crate::adapters::mcp_http::McpServerApi;
use crate::error::HandlerError;

pub async fn handle_pipeline_executor_event(
    event: Value,
    mcp_server: &dyn McpServerApi,
    store: &dyn ExecutionStore,
    now: DateTime<Utc>,
) -> Value {
    let (action, params) = match parse_action_event(&event) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };

    let outcome = match action.api_path.as_str() {
        "/pipeline/execute" => execute_pipeline(&params, mcp_server, store, now).await,
        "/pipeline/status" => pipeline_status(&params, mcp_server).await,
        "/delegate" => delegate(params),
        other => Ok(unknown_path(other)),
    };
    action_reply(&action, outcome)
}

async fn execute_pipeline(
    params: &Map<String, Value>,
    mcp_server: &dyn McpServerApi,
    store: &dyn ExecutionStore,
    now: DateTime<Utc>,
) -> Result<Value, HandlerError> {
    let request = json!({
        "pipeline_type": params.get("pipeline_type"),
        "environment": params.get("environment"),
        "tenant_id": params.get("tenant_id"),
        "parameters": params.get("parameters").cloned().unwrap_or_else(|| json!({})),
    });
    let result = mcp_server.execute(&request).await?;

    match DeploymentRecord::from_execution_summary(&result, now) {
        Some(record) => {
            store.put(&record).await?;
            info!(
                component = "pipeline_executor",
                event = "execution_stored",
                execution_id = %record.session_id,
            );
        }
        None => warn!(
            component = "pipeline_executor",
            event = "execution_not_stored",
            result = %result,
            "MCP server result carries no execution id"
        ),
    }
    Ok(result)
}

async fn pipeline_status(
    params: &Map<String, Value>,
    mcp_server: &dyn McpServerApi,
) -> Result<Value, HandlerError> {
    let execution_id = param_text(params, "execution_id")
        .ok_or_else(|| ValidationError::missing_field("execution_id"))?;
    mcp_server.status(&execution_id).await
}

fn delegate(params: Map<String, Value>) -> Result<Value, HandlerError> {
    let request: DelegationRequest = serde_json::from_value(Value::Object(params))?;
    Ok(delegation_acknowledgement(&request))
}
