use std::sync::Arc;

use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use pipeline_bridge_core::gitlab::client_from_settings;
use pipeline_bridge_core::logging::init_json_logging;
use pipeline_bridge_core::memory::ExecutionStore;
use pipeline_bridge_core::service::PipelineService;
use pipeline_bridge_lambda::adapters::dynamo_store::DynamoExecutionStore;
use pipeline_bridge_lambda::config::{env_lookup, McpServerConfig};
use pipeline_bridge_lambda::handlers::mcp_server::handle_mcp_server_event;
use serde_json::Value;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_json_logging();
    let config = McpServerConfig::from_lookup(env_lookup)?;

    let store: Option<Arc<dyn ExecutionStore>> = match &config.memory_table {
        Some(table_name) => {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Some(Arc::new(DynamoExecutionStore::new(
                aws_sdk_dynamodb::Client::new(&aws_config),
                table_name,
            )))
        }
        None => {
            warn!(
                component = "mcp_server",
                event = "memory_table_missing",
                "MEMORY_TABLE_NAME not set; executions will not be stored"
            );
            None
        }
    };

    info!(
        component = "mcp_server",
        event = "gitlab_configuration",
        gitlab_url = %config.gitlab.base_url,
        project_id = %config.gitlab.project_id,
        token = %config.gitlab.token_hint(),
        configured = config.gitlab.is_configured(),
    );
    let refs = config.gitlab.refs.clone();
    let gitlab = client_from_settings(config.gitlab)?;
    let service = PipelineService::new(gitlab, refs, store);
    let service = &service;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<Value, Error>(handle_mcp_server_event(event.payload, service, Utc::now()).await)
    }))
    .await
}
