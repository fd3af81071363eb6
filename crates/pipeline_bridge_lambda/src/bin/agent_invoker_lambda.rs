use lambda_runtime::{service_fn, Error, LambdaEvent};
use pipeline_bridge_core::delegation::AgentDirectory;
use pipeline_bridge_core::logging::init_json_logging;
use pipeline_bridge_lambda::adapters::agent_runtime::BedrockAgentRuntime;
use pipeline_bridge_lambda::config::env_lookup;
use pipeline_bridge_lambda::handlers::agent_invoker::handle_agent_invoker_event;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_json_logging();
    let directory = AgentDirectory::from_lookup(env_lookup);
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let runtime = BedrockAgentRuntime::new(aws_sdk_bedrockagentruntime::Client::new(&aws_config));
    let (directory, runtime) = (&directory, &runtime);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        Ok::<Value, Error>(handle_agent_invoker_event(event.payload, directory, runtime).await)
    }))
    .await
}
