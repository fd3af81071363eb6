//! Long-running MCP server: an HTTP JSON API and a stdio JSON-RPC tool
//! surface, both backed by one in-process `PipelineService`.

pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod tools;

use std::sync::Arc;

use pipeline_bridge_core::gitlab::{client_from_settings, GitLabError, GitLabSettings};
use pipeline_bridge_core::memory::{ExecutionStore, InMemoryExecutionStore};
use pipeline_bridge_core::service::PipelineService;
use tracing::{info, warn};

/// Wires the GitLab client for `settings` to a fresh in-memory store.
pub fn build_service(settings: &GitLabSettings) -> Result<PipelineService, GitLabError> {
    info!(
        component = "server",
        event = "gitlab_configuration",
        gitlab_url = %settings.base_url,
        project_id = %settings.project_id,
        token = %settings.token_hint(),
        configured = settings.is_configured(),
    );
    if !settings.is_configured() {
        warn!(
            component = "server",
            event = "stub_mode",
            "GITLAB_TOKEN not configured; pipeline triggers are stubbed"
        );
    }

    let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
    let gitlab = client_from_settings(settings.clone())?;
    Ok(PipelineService::new(gitlab, settings.refs.clone(), Some(store)))
}
