//! Proxies Bedrock MCP tool calls to the MCP server Lambda and records the
//! executions it reports.

use chrono::{DateTime, Utc};
use pipeline_bridge_core::action_group::unknown_path;
use pipeline_bridge_core::memory::{DeploymentRecord, ExecutionStore};
use serde_json::{json, Map, Value};
use tracing::info;

use super::{action_reply, parse_action_event};
use crate::adapters::mcp_invoke::McpInvoker;
use crate::error::HandlerError;

/// Keys lifted from the tool parameters onto the top level of an execute
/// payload.
const FORWARDED_KEYS: [&str; 7] = [
    "environment",
    "tenant_id",
    "region",
    "instance_type",
    "instance_count",
    "app_name",
    "app_version",
];

/// Direct-invocation payload for the MCP server, or `None` for paths the
/// proxy does not serve.
pub fn proxy_payload(api_path: &str, params: &Map<String, Value>) -> Option<Value> {
    let pipeline_type = match api_path {
        "/mcp/execute-bootstrap" => "bootstrap",
        "/mcp/execute-compute" => "compute",
        "/mcp/execute-app" => "app",
        "/mcp/get-status" => {
            return Some(json!({
                "action": "status",
                "execution_id": params.get("execution_id"),
            }))
        }
        _ => return None,
    };

    let mut payload = Map::new();
    payload.insert("action".to_string(), json!("execute"));
    payload.insert("pipeline_type".to_string(), json!(pipeline_type));
    for key in FORWARDED_KEYS {
        payload.insert(
            key.to_string(),
            params.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    payload.insert("parameters".to_string(), Value::Object(params.clone()));
    Some(Value::Object(payload))
}

pub async fn handle_mcp_proxy_event(
    event: Value,
    invoker: &dyn McpInvoker,
    store: &dyn ExecutionStore,
    now: DateTime<Utc>,
) -> Value {
    let (action, params) = match parse_action_event(&event) {
        Ok(parsed) => parsed,
        Err(reply) => return reply,
    };

    let outcome = match proxy_payload(&action.api_path, &params) {
        Some(payload) => forward(&payload, invoker, store, now).await,
        None => Ok(unknown_path(&action.api_path)),
    };
    action_reply(&action, outcome)
}

async fn forward(
    payload: &Value,
    invoker: &dyn McpInvoker,
    store: &dyn ExecutionStore,
    now: DateTime<Utc>,
) -> Result<Value, HandlerError> {
    let result = invoker.invoke(payload).await?;
    if let Some(record) = DeploymentRecord::from_execution_summary(&result, now) {
        store.put(&record).await?;
        info!(
            component = "mcp_proxy",
            event = "execution_stored",
            execution_id = %record.session_id,
            status = record.status.as_deref().unwrap_or_default(),
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use pipeline_bridge_core::memory::InMemoryExecutionStore;

    use super::*;

    struct CapturingInvoker {
        payloads: Mutex<Vec<Value>>,
        result: Result<Value, String>,
    }

    impl CapturingInvoker {
        fn returning(result: Value) -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                result: Ok(result),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                payloads: Mutex::new(Vec::new()),
                result: Err(message.to_string()),
            }
        }

        fn payloads(&self) -> Vec<Value> {
            self.payloads.lock().expect("poisoned mutex").clone()
        }
    }

    #[async_trait]
    impl McpInvoker for CapturingInvoker {
        async fn invoke(&self, payload: &Value) -> Result<Value, HandlerError> {
            self.payloads
                .lock()
                .expect("poisoned mutex")
                .push(payload.clone());
            self.result.clone().map_err(HandlerError::McpServer)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 11, 0, 0).unwrap()
    }

    fn event(api_path: &str, body: Value) -> Value {
        json!({
            "actionGroup": "mcp-tools",
            "apiPath": api_path,
            "requestBody": {"content": {"application/json": body.to_string()}}
        })
    }

    #[test]
    fn execute_payload_lifts_known_keys() {
        let params = json!({"environment": "prod", "tenant_id": "acme", "app_name": "billing"});
        let payload = proxy_payload("/mcp/execute-app", params.as_object().expect("object"))
            .expect("known path");

        assert_eq!(payload["action"], json!("execute"));
        assert_eq!(payload["pipeline_type"], json!("app"));
        assert_eq!(payload["app_name"], json!("billing"));
        assert_eq!(payload["region"], Value::Null);
        assert_eq!(payload["parameters"], params);
    }

    #[test]
    fn status_payload_carries_only_execution_id() {
        let params = json!({"execution_id": "exec-4", "environment": "dev"});
        let payload = proxy_payload("/mcp/get-status", params.as_object().expect("object"))
            .expect("known path");
        assert_eq!(
            payload,
            json!({"action": "status", "execution_id": "exec-4"})
        );
        assert!(proxy_payload("/mcp/other", params.as_object().expect("object")).is_none());
    }

    #[tokio::test]
    async fn successful_executions_are_stored() {
        let invoker = CapturingInvoker::returning(json!({
            "execution_id": "exec-8",
            "pipeline_type": "bootstrap",
            "environment": "dev",
            "status": "completed"
        }));
        let store = InMemoryExecutionStore::new();

        let response = handle_mcp_proxy_event(
            event("/mcp/execute-bootstrap", json!({"environment": "dev"})),
            &invoker,
            &store,
            now(),
        )
        .await;

        assert_eq!(response["response"]["httpStatusCode"], json!(200));
        assert_eq!(invoker.payloads().len(), 1);
        let stored = store
            .latest_for_session("exec-8")
            .await
            .expect("query")
            .expect("stored");
        assert_eq!(stored.tenant_id, "N/A");
        assert_eq!(stored.pipeline_type.as_deref(), Some("bootstrap"));
    }

    #[tokio::test]
    async fn error_results_are_returned_but_not_stored() {
        let invoker = CapturingInvoker::returning(json!({
            "execution_id": "exec-9",
            "error": "tenant_id is required for compute pipelines"
        }));
        let store = InMemoryExecutionStore::new();

        handle_mcp_proxy_event(
            event("/mcp/execute-compute", json!({"environment": "dev"})),
            &invoker,
            &store,
            now(),
        )
        .await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn invocation_failures_become_500_replies() {
        let invoker = CapturingInvoker::failing("function timed out");
        let store = InMemoryExecutionStore::new();

        let response = handle_mcp_proxy_event(
            event("/mcp/get-status", json!({"execution_id": "exec-1"})),
            &invoker,
            &store,
            now(),
        )
        .await;

        assert_eq!(response["response"]["httpStatusCode"], json!(500));
        assert_eq!(
            response["response"]["responseBody"]["application/json"]["body"],
            json!("{\"error\":\"MCP server call failed: function timed out\"}")
        );
    }

    #[tokio::test]
    async fn unknown_paths_are_not_forwarded() {
        let invoker = CapturingInvoker::returning(Value::Null);
        let store = InMemoryExecutionStore::new();

        let response =
            handle_mcp_proxy_event(event("/mcp/destroy", json!({})), &invoker, &store, now()).await;

        assert!(invoker.payloads().is_empty());
        assert_eq!(
            response["response"]["responseBody"]["application/json"]["body"],
            json!("{\"error\":\"Unknown API path: /mcp/destroy\"}")
        );
    }
}
