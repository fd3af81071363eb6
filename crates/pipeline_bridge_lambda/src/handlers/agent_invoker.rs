//! Lets the orchestrator agent delegate work to the bootstrap, compute and app
//! agents through Bedrock.

use pipeline_bridge_core::action_group::unknown_path;
use pipeline_bridge_core::delegation::{
    build_instruction, extract_execution_id, AgentDirectory, AgentType, DelegationRequest,
};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::{action_reply, parse_action_event};
use crate::adapters::agent_runtime::{AgentInvocation, AgentRuntime};
use crate::error::HandlerError;

pub async fn handle_agent_invoker_event(
    event: Value,
    directory: &AgentDirectory,
    runtime: &dyn AgentRuntime,
) -> Value {
    let (action, params) = match parse_action_event(&event) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };

    let outcome = match action.api_path.as_str() {
        "/invoke-agent" => invoke_specialized_agent(params, directory, runtime).await,
        other => Ok(unknown_path(other)),
    };
    action_reply(&action, outcome)
}

async fn invoke_specialized_agent(
    params: Map<String, Value>,
    directory: &AgentDirectory,
    runtime: &dyn AgentRuntime,
) -> Result<Value, HandlerError> {
    let request: DelegationRequest = serde_json::from_value(Value::Object(params))?;
    let requested = request.agent_type.clone().unwrap_or_default();
    let agent_id = requested
        .parse::<AgentType>()
        .ok()
        .and_then(|agent_type| directory.agent_id(agent_type));
    let Some(agent_id) = agent_id else {
        return Ok(json!({ "error": format!("Unknown agent type: {requested}") }));
    };

    let session_id = Uuid::new_v4().to_string();
    let instruction = build_instruction(&request);
    info!(
        component = "agent_invoker",
        event = "delegating_to_agent",
        agent_type = %requested,
        session_id = %session_id,
        instruction = %instruction,
    );

    let reply = runtime
        .invoke_agent(AgentInvocation {
            agent_id: agent_id.to_string(),
            alias_id: directory.alias_id.clone(),
            session_id: session_id.clone(),
            input_text: instruction,
            enable_trace: true,
        })
        .await?;

    let trace = if reply.traces.is_empty() {
        Value::Null
    } else {
        Value::Array(reply.traces)
    };
    Ok(json!({
        "agent_type": requested,
        "execution_id": extract_execution_id(&reply.completion),
        "agent_response": reply.completion,
        "session_id": session_id,
        "status": "completed",
        "trace": trace,
    }))
}
