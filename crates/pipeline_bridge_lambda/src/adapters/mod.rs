pub mod agent_runtime;
pub mod dynamo_store;
pub mod mcp_http;
pub mod mcp_invoke;
