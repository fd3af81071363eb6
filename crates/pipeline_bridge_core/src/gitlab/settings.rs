use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use super::{GitLabError, DEFAULT_REF};
use crate::contract::{Environment, NormalizedPipelineRequest};

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
pub const STUB_TOKEN: &str = "STUB_TOKEN";
pub const STUB_PROJECT_ID: &str = "STUB_PROJECT_ID";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Deterministic ref selection: explicit `ref` parameter, then the
/// environment's ref, then the default ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPolicy {
    pub default_ref: String,
    pub environment_refs: BTreeMap<Environment, String>,
}

impl Default for RefPolicy {
    fn default() -> Self {
        Self {
            default_ref: DEFAULT_REF.to_string(),
            environment_refs: BTreeMap::new(),
        }
    }
}

impl RefPolicy {
    pub fn select_ref(&self, request: &NormalizedPipelineRequest) -> String {
        let explicit = request
            .parameters
            .get("ref")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(explicit) = explicit {
            return explicit.to_string();
        }

        self.environment_refs
            .get(&request.environment)
            .cloned()
            .unwrap_or_else(|| self.default_ref.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabSettings {
    pub base_url: String,
    pub project_id: String,
    pub token: Option<String>,
    pub refs: RefPolicy,
    pub request_timeout: Duration,
}

impl Default for GitLabSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GITLAB_URL.to_string(),
            project_id: STUB_PROJECT_ID.to_string(),
            token: None,
            refs: RefPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl GitLabSettings {
    /// Reads `GITLAB_*` settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GitLabError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut environment_refs = BTreeMap::new();
        for (environment, key) in [
            (Environment::Dev, "GITLAB_REF_DEV"),
            (Environment::Prod, "GITLAB_REF_PROD"),
        ] {
            if let Some(git_ref) = read(key) {
                environment_refs.insert(environment, git_ref);
            }
        }

        let request_timeout = match read("GITLAB_TIMEOUT_SECS") {
            Some(raw) => {
                let seconds = raw.parse::<u64>().map_err(|error| {
                    GitLabError::Configuration(format!(
                        "GITLAB_TIMEOUT_SECS must be a whole number of seconds: {error}"
                    ))
                })?;
                Duration::from_secs(seconds)
            }
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            base_url: read("GITLAB_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GITLAB_URL.to_string()),
            project_id: read("GITLAB_PROJECT_ID").unwrap_or_else(|| STUB_PROJECT_ID.to_string()),
            token: read("GITLAB_TOKEN").filter(|token| token != STUB_TOKEN),
            refs: RefPolicy {
                default_ref: read("GITLAB_DEFAULT_REF").unwrap_or_else(|| DEFAULT_REF.to_string()),
                environment_refs,
            },
            request_timeout,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Short token prefix that is safe to log.
    pub fn token_hint(&self) -> String {
        match &self.token {
            Some(token) => format!("{}...", token.chars().take(4).collect::<String>()),
            None => STUB_TOKEN.to_string(),
        }
    }
}
