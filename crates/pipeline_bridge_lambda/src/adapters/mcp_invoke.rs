use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use serde_json::Value;
use tracing::info;

use crate::error::HandlerError;

/// Synchronous invocation of the MCP server Lambda with a direct payload.
#[async_trait]
pub trait McpInvoker: Send + Sync {
    async fn invoke(&self, payload: &Value) -> Result<Value, HandlerError>;
}

pub struct LambdaMcpInvoker {
    client: aws_sdk_lambda::Client,
    function_name: String,
}

impl LambdaMcpInvoker {
    pub fn new(client: aws_sdk_lambda::Client, function_name: impl Into<String>) -> Self {
        Self {
            client,
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl McpInvoker for LambdaMcpInvoker {
    async fn invoke(&self, payload: &Value) -> Result<Value, HandlerError> {
        info!(
            component = "mcp_proxy",
            event = "mcp_server_invoked",
            function_name = %self.function_name,
        );

        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload.to_string()))
            .send()
            .await
            .map_err(|error| {
                HandlerError::McpServer(format!(
                    "failed to invoke {}: {}",
                    self.function_name,
                    DisplayErrorContext(error)
                ))
            })?;

        let body = output
            .payload()
            .map(|blob| blob.as_ref().to_vec())
            .unwrap_or_default();
        decode_invoke_response(output.function_error(), &body)
    }
}

/// A function error reported by Lambda fails the call even though the
/// invocation itself succeeded.
pub fn decode_invoke_response(
    function_error: Option<&str>,
    body: &[u8],
) -> Result<Value, HandlerError> {
    if let Some(kind) = function_error {
        return Err(HandlerError::McpServer(format!(
            "MCP server reported {kind}: {}",
            String::from_utf8_lossy(body)
        )));
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|error| HandlerError::McpServer(format!("invalid MCP server response: {error}")))
}
