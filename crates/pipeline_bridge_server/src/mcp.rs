//! Newline-delimited JSON-RPC 2.0 transport for the MCP tool surface.
//!
//! Each input line is one request or notification. Requests get exactly one
//! response line; notifications (no `id` member at all) get none. An explicit
//! `"id": null` is still a request.

use chrono::Utc;
use pipeline_bridge_core::service::PipelineService;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::tools::{call_tool, text_content, tool_definitions};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "cicd-pipeline-server";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// `None` only when the member is absent.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq)]
struct RpcFailure {
    code: i64,
    message: String,
}

impl RpcFailure {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {"code": code, "message": message},
    })
}

fn success_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result})
}

#[derive(Clone)]
pub struct McpDispatcher {
    service: PipelineService,
}

impl McpDispatcher {
    pub fn new(service: PipelineService) -> Self {
        Self { service }
    }

    /// Response line for one input line, if any.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(component = "mcp", event = "unparsable_message", error = %error);
                return Some(error_response(
                    Value::Null,
                    PARSE_ERROR,
                    &format!("Parse error: {error}"),
                ));
            }
        };

        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<RpcRequest>(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(error) => Some(error_response(
                id,
                INVALID_REQUEST,
                &format!("Invalid request: {error}"),
            )),
        }
    }

    pub async fn dispatch(&self, request: RpcRequest) -> Option<Value> {
        let Some(id) = request.id else {
            debug!(
                component = "mcp",
                event = "notification_received",
                method = %request.method,
            );
            return None;
        };

        let outcome = match request.method.as_str() {
            "initialize" => Ok(initialize_result(&request.params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.call(&request.params).await,
            other => Err(RpcFailure::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };

        Some(match outcome {
            Ok(result) => success_response(id, result),
            Err(failure) => error_response(id, failure.code, &failure.message),
        })
    }

    async fn call(&self, params: &Value) -> Result<Value, RpcFailure> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcFailure::new(INVALID_PARAMS, "Invalid params: name is required"))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let document = call_tool(&self.service, name, &arguments, Utc::now()).await;
        Ok(text_content(&document))
    }

    /// Serves until `reader` reaches end of input.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                let mut encoded = response.to_string();
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!(component = "mcp", event = "input_closed");
        Ok(())
    }

    pub async fn serve_stdio(&self) -> std::io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": protocol_version,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pipeline_bridge_core::gitlab::{GitLabSettings, RefPolicy, StubGitLabClient};

    use super::*;

    fn dispatcher() -> McpDispatcher {
        McpDispatcher::new(PipelineService::new(
            Arc::new(StubGitLabClient::new(GitLabSettings::default())),
            RefPolicy::default(),
            None,
        ))
    }

    #[tokio::test]
    async fn null_id_is_answered_but_missing_id_is_a_notification() {
        let dispatcher = dispatcher();

        let answered = dispatcher
            .handle_line(r#"{"jsonrpc": "2.0", "id": null, "method": "ping"}"#)
            .await;
        assert_eq!(
            answered,
            Some(json!({"jsonrpc": "2.0", "id": null, "result": {}}))
        );

        let silent = dispatcher
            .handle_line(r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#)
            .await;
        assert_eq!(silent, None);
    }

    #[test]
    fn initialize_echoes_client_protocol_version() {
        let result = initialize_result(&json!({"protocolVersion": "2025-03-26"}));
        assert_eq!(result["protocolVersion"], json!("2025-03-26"));
        assert_eq!(result["serverInfo"]["name"], json!(SERVER_NAME));

        let result = initialize_result(&Value::Null);
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
    }

    #[test]
    fn error_responses_carry_code_and_id() {
        assert_eq!(
            error_response(json!(7), METHOD_NOT_FOUND, "Method not found: x"),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "error": {"code": -32601, "message": "Method not found: x"}
            })
        );
    }
}
