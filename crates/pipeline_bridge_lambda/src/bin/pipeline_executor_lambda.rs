use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use pipeline_bridge_core::logging::init_json_logging;
use pipeline_bridge_lambda::adapters::dynamo_store::DynamoExecutionStore;
use pipeline_bridge_lambda::adapters::mcp_http::HttpMcpServer;
use pipeline_bridge_lambda::config::{env_lookup, PipelineExecutorConfig};
use pipeline_bridge_lambda::handlers::pipeline_executor::handle_pipeline_executor_event;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_json_logging();
    let config = PipelineExecutorConfig::from_lookup(env_lookup)?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let store = DynamoExecutionStore::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.memory_table,
    );
    let mcp_server = HttpMcpServer::new(config.mcp_server_url);
    let (store, mcp_server) = (&store, &mcp_server);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<Value, Error>(
            handle_pipeline_executor_event(event.payload, mcp_server, store, Utc::now()).await,
        )
    }))
    .await
}
