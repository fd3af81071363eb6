use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;

pub const EXECUTE_TIMEOUT: Duration = Duration::from_secs(60);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP surface of the MCP server as the pipeline executor sees it.
#[async_trait]
pub trait McpServerApi: Send + Sync {
    async fn execute(&self, request: &Value) -> Result<Value, HandlerError>;

    async fn status(&self, execution_id: &str) -> Result<Value, HandlerError>;
}

pub struct HttpMcpServer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMcpServer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The MCP server answers errors with JSON bodies too, so the body is
    /// returned whatever the status code.
    async fn read_json(&self, request: reqwest::RequestBuilder) -> Result<Value, HandlerError> {
        let response = request
            .send()
            .await
            .map_err(|error| HandlerError::McpServer(error.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|error| HandlerError::McpServer(format!("invalid JSON response: {error}")))
    }
}

#[async_trait]
impl McpServerApi for HttpMcpServer {
    async fn execute(&self, request: &Value) -> Result<Value, HandlerError> {
        self.read_json(
            self.http
                .post(format!("{}/execute", self.base_url))
                .timeout(EXECUTE_TIMEOUT)
                .json(request),
        )
        .await
    }

    async fn status(&self, execution_id: &str) -> Result<Value, HandlerError> {
        self.read_json(
            self.http
                .get(format!("{}/status/{execution_id}", self.base_url))
                .timeout(STATUS_TIMEOUT),
        )
        .await
    }
}
