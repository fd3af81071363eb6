use clap::Parser;
use pipeline_bridge_core::logging::init_json_logging;
use pipeline_bridge_server::build_service;
use pipeline_bridge_server::config::{Cli, Command};
use pipeline_bridge_server::error::ServerError;
use pipeline_bridge_server::http::{router, AppState};
use pipeline_bridge_server::mcp::McpDispatcher;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    init_json_logging();
    let cli = Cli::parse();
    let settings = cli.gitlab.settings()?;
    let service = build_service(&settings)?;

    match cli.command {
        Command::ServeHttp(args) => {
            let addr = args.socket_addr()?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(component = "server", event = "http_listening", address = %addr);
            axum::serve(listener, router(AppState::new(service, &settings)))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::ServeStdio => {
            info!(component = "server", event = "stdio_serving");
            McpDispatcher::new(service).serve_stdio().await?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(component = "server", event = "shutdown_requested");
    }
}
