use pipeline_bridge_core::action_group::{normalize_apigw_body, ApiGatewayResponse};
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use crate::adapters::agent_runtime::{AgentInvocation, AgentRuntime};
use crate::config::ChatConfig;

/// API Gateway chat endpoint in front of the orchestrator agent.
pub async fn handle_chat_event(
    event: Value,
    config: &ChatConfig,
    runtime: &dyn AgentRuntime,
) -> ApiGatewayResponse {
    let body = match normalize_apigw_body(&event) {
        Ok(body) => body,
        Err(failure) => return ApiGatewayResponse::error(400, failure.message()),
    };

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if message.is_empty() {
        return ApiGatewayResponse::error(400, "Message is required");
    }
    let session_id = body
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let invocation = AgentInvocation {
        agent_id: config.orchestrator_agent_id.clone(),
        alias_id: config.alias_id.clone(),
        session_id: session_id.clone(),
        input_text: message.to_string(),
        enable_trace: false,
    };
    match runtime.invoke_agent(invocation).await {
        Ok(reply) => ApiGatewayResponse::json(
            200,
            &json!({ "response": reply.completion, "session_id": session_id }),
        ),
        Err(failure) => {
            error!(
                component = "chat",
                event = "orchestrator_invocation_failed",
                session_id = %session_id,
                error = %failure,
            );
            ApiGatewayResponse::error(500, &failure.to_string())
        }
    }
}
