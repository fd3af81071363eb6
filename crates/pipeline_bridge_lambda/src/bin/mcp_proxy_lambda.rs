use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use pipeline_bridge_core::logging::init_json_logging;
use pipeline_bridge_lambda::adapters::dynamo_store::DynamoExecutionStore;
use pipeline_bridge_lambda::adapters::mcp_invoke::LambdaMcpInvoker;
use pipeline_bridge_lambda::config::{env_lookup, McpProxyConfig};
use pipeline_bridge_lambda::handlers::mcp_proxy::handle_mcp_proxy_event;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_json_logging();
    let config = McpProxyConfig::from_lookup(env_lookup)?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let store = DynamoExecutionStore::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.memory_table,
    );
    let invoker = LambdaMcpInvoker::new(
        aws_sdk_lambda::Client::new(&aws_config),
        config.mcp_server_function,
    );
    let (store, invoker) = (&store, &invoker);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<Value, Error>(handle_mcp_proxy_event(event.payload, invoker, store, Utc::now()).await)
    }))
    .await
}
