pub mod agent_invoker;
pub mod chat;
pub mod mcp_proxy;
pub mod mcp_server;
pub mod memory_manager;
pub mod pipeline_executor;

use pipeline_bridge_core::action_group::{action_group_response, ActionGroupEvent};
use serde_json::{json, Map, Value};
use tracing::error;

use crate::error::HandlerError;

/// Envelope fields of an event whose parameters could not be decoded.
fn bare_envelope(event: &Value) -> ActionGroupEvent {
    let text = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_string);
    ActionGroupEvent {
        action_group: text("actionGroup").unwrap_or_default(),
        api_path: text("apiPath").unwrap_or_default(),
        http_method: text("httpMethod").unwrap_or_else(|| "POST".to_string()),
        parameters: Vec::new(),
        body: None,
    }
}

/// Decodes a Bedrock action-group event and its merged parameters.
pub(crate) fn parse_action_event(
    event: &Value,
) -> Result<(ActionGroupEvent, Map<String, Value>), Value> {
    let parsed = ActionGroupEvent::from_value(event)
        .map_err(HandlerError::from)
        .and_then(|parsed| {
            let params = parsed.params()?;
            Ok((parsed, params))
        });
    parsed.map_err(|failure| action_reply(&bare_envelope(event), Err(failure)))
}

/// Wraps a route outcome in the action-group response envelope.
pub(crate) fn action_reply(
    event: &ActionGroupEvent,
    outcome: Result<Value, HandlerError>,
) -> Value {
    match outcome {
        Ok(body) => action_group_response(event, 200, &body),
        Err(failure) => {
            error!(
                component = "handler",
                event = "action_failed",
                action_group = %event.action_group,
                api_path = %event.api_path,
                error = %failure,
            );
            action_group_response(event, failure.status_code(), &error_body(&failure))
        }
    }
}

pub(crate) fn error_body(failure: &HandlerError) -> Value {
    json!({ "error": failure.to_string() })
}

pub(crate) fn param_text(params: &Map<String, Value>, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
