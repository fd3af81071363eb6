use tracing_subscriber::EnvFilter;

/// One JSON object per event on stderr, filtered by `RUST_LOG` (default
/// `info`). Shared by the Lambda binaries and the MCP server, whose stdio
/// transport keeps stdout for protocol frames.
pub fn init_json_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when handlers share a process.
    let _ = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
