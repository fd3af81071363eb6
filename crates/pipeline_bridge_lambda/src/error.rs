use pipeline_bridge_core::contract::ValidationError;
use pipeline_bridge_core::execution::ExecutionError;
use pipeline_bridge_core::memory::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("MCP server call failed: {0}")]
    McpServer(String),
    #[error("agent invocation failed: {0}")]
    Agent(String),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl HandlerError {
    /// Caller mistakes map to 400, everything else to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::Execution(ExecutionError::Validation(_))
            | Self::Payload(_) => 400,
            _ => 500,
        }
    }
}
