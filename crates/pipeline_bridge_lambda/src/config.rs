//! Environment configuration for each Lambda. Every loader takes a lookup
//! function so tests never touch the process environment.

use pipeline_bridge_core::delegation::TEST_AGENT_ALIAS_ID;
use pipeline_bridge_core::gitlab::{GitLabError, GitLabSettings};

pub const DEFAULT_MCP_SERVER_URL: &str = "http://localhost:8000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error(transparent)]
    GitLab(#[from] GitLabError),
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Storage is skipped when unset.
    pub memory_table: Option<String>,
    pub gitlab: GitLabSettings,
}

impl McpServerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            memory_table: optional(&lookup, "MEMORY_TABLE_NAME"),
            gitlab: GitLabSettings::from_lookup(&lookup)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineExecutorConfig {
    pub memory_table: String,
    pub mcp_server_url: String,
}

impl PipelineExecutorConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            memory_table: required(&lookup, "MEMORY_TABLE_NAME")?,
            mcp_server_url: optional(&lookup, "MCP_SERVER_URL")
                .unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpProxyConfig {
    pub memory_table: String,
    pub mcp_server_function: String,
}

impl McpProxyConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            memory_table: required(&lookup, "MEMORY_TABLE_NAME")?,
            mcp_server_function: required(&lookup, "MCP_SERVER_FUNCTION_NAME")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryManagerConfig {
    pub memory_table: String,
}

impl MemoryManagerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            memory_table: required(&lookup, "MEMORY_TABLE_NAME")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub orchestrator_agent_id: String,
    pub alias_id: String,
}

impl ChatConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            orchestrator_agent_id: required(&lookup, "ORCHESTRATOR_AGENT_ID")?,
            alias_id: optional(&lookup, "AGENT_ALIAS_ID")
                .unwrap_or_else(|| TEST_AGENT_ALIAS_ID.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn executor_defaults_mcp_server_url() {
        let config = PipelineExecutorConfig::from_lookup(lookup(&[("MEMORY_TABLE_NAME", "memory")]))
            .expect("config loads");
        assert_eq!(config.mcp_server_url, "http://localhost:8000");
    }

    #[test]
    fn missing_required_values_name_the_variable() {
        let error = McpProxyConfig::from_lookup(lookup(&[("MEMORY_TABLE_NAME", "memory")]))
            .expect_err("function name is required");
        assert_eq!(
            error.to_string(),
            "MCP_SERVER_FUNCTION_NAME must be configured"
        );

        let error = MemoryManagerConfig::from_lookup(lookup(&[("MEMORY_TABLE_NAME", "  ")]))
            .expect_err("blank table name is missing");
        assert!(matches!(error, ConfigError::Missing("MEMORY_TABLE_NAME")));
    }

    #[test]
    fn mcp_server_runs_without_table_or_token() {
        let config = McpServerConfig::from_lookup(lookup(&[])).expect("config loads");
        assert_eq!(config.memory_table, None);
        assert!(!config.gitlab.is_configured());
    }

    #[test]
    fn chat_uses_test_alias_unless_overridden() {
        let config = ChatConfig::from_lookup(lookup(&[("ORCHESTRATOR_AGENT_ID", "ORCH1")]))
            .expect("config loads");
        assert_eq!(config.alias_id, "TSTALIASID");

        let config = ChatConfig::from_lookup(lookup(&[
            ("ORCHESTRATOR_AGENT_ID", "ORCH1"),
            ("AGENT_ALIAS_ID", "LIVE"),
        ]))
        .expect("config loads");
        assert_eq!(config.alias_id, "LIVE");
    }
}
