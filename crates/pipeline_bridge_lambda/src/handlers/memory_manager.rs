use chrono::{DateTime, Utc};
use pipeline_bridge_core::action_group::unknown_path;
use pipeline_bridge_core::memory::{
    latest_deployment, query_history, DeploymentRecord, ExecutionStore, StoreMemoryRequest,
};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::{action_reply, param_text, parse_action_event};
use crate::error::HandlerError;

pub async fn handle_memory_event(
    event: Value,
    store: &dyn ExecutionStore,
    now: DateTime<Utc>,
) -> Value {
    let (action, params) = match parse_action_event(&event) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };

    let outcome = match action.api_path.as_str() {
        "/memory/query" => query_memory(&params, store).await,
        "/memory/store" => store_memory(params, store, now).await,
        other => Ok(unknown_path(other)),
    };
    action_reply(&action, outcome)
}

async fn query_memory(
    params: &Map<String, Value>,
    store: &dyn ExecutionStore,
) -> Result<Value, HandlerError> {
    let environment = param_text(params, "environment");
    let tenant_id = param_text(params, "tenant_id");
    let history = query_history(store, environment.as_deref(), tenant_id.as_deref()).await?;
    let mut body = serde_json::to_value(history)?;

    if let (Some(environment), Some(pipeline_type)) =
        (environment, param_text(params, "pipeline_type"))
    {
        let latest = latest_deployment(store, &environment, &pipeline_type).await?;
        body["latest"] = serde_json::to_value(latest)?;
    }
    Ok(body)
}

async fn store_memory(
    params: Map<String, Value>,
    store: &dyn ExecutionStore,
    now: DateTime<Utc>,
) -> Result<Value, HandlerError> {
    let request: StoreMemoryRequest = serde_json::from_value(Value::Object(params))?;
    let session_id = Uuid::new_v4().to_string();
    store
        .put(&DeploymentRecord::from_store_request(request, session_id.clone(), now))
        .await?;

    info!(
        component = "memory_manager",
        event = "deployment_recorded",
        session_id = %session_id,
    );
    Ok(json!({ "status": "stored", "session_id": session_id }))
}
