//! GitLab trigger mapping: ref selection, CI variables, endpoints and the
//! status table that folds GitLab pipeline states into [`PipelineStatus`].

pub mod client;
pub mod settings;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contract::{NormalizedPipelineRequest, PipelineType};

pub use client::{
    client_from_settings, decode_pipeline, poll_until_terminal, GitLabClient, HttpGitLabClient,
    PollPolicy, StubGitLabClient, TriggeredPipeline,
};
pub use settings::{GitLabSettings, RefPolicy};

pub const DEFAULT_REF: &str = "main";
pub const STUB_PIPELINE_PREFIX: &str = "stub-";
pub const ENV_VAR_VARIABLE_TYPE: &str = "env_var";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl PipelineStatus {
    /// Maps a raw GitLab pipeline status onto the bridge's state enum.
    pub fn from_gitlab(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "waiting_for_resource" | "preparing" | "pending" | "scheduled"
            | "manual" => Self::Pending,
            "running" => Self::Running,
            "success" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" | "canceling" | "skipped" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GitLabError {
    #[error("GitLab request failed: {0}")]
    Transport(String),
    #[error("GitLab returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected GitLab response: {0}")]
    Decode(String),
    #[error("invalid GitLab configuration: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerVariable {
    pub key: String,
    pub value: String,
    pub variable_type: String,
}

/// Body of `POST /projects/:id/pipeline`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineTrigger {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub variables: Vec<TriggerVariable>,
}

impl PipelineTrigger {
    pub fn new(ref_name: impl Into<String>, variables: &BTreeMap<String, String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            variables: variables
                .iter()
                .map(|(key, value)| TriggerVariable {
                    key: key.clone(),
                    value: value.clone(),
                    variable_type: ENV_VAR_VARIABLE_TYPE.to_string(),
                })
                .collect(),
        }
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|variable| variable.key == key)
            .map(|variable| variable.value.as_str())
    }
}

pub fn pipeline_variables(
    request: &NormalizedPipelineRequest,
    execution_id: &str,
) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::from([
        (
            "PIPELINE_TYPE".to_string(),
            request.pipeline_type.as_str().to_string(),
        ),
        (
            "ENVIRONMENT".to_string(),
            request.environment.as_str().to_string(),
        ),
        ("EXECUTION_ID".to_string(), execution_id.to_string()),
    ]);

    if let Some(tenant_id) = &request.tenant_id {
        variables.insert("TENANT_ID".to_string(), tenant_id.clone());
    }

    let mapped: &[(&str, &str)] = match request.pipeline_type {
        PipelineType::Bootstrap => &[("region", "AWS_REGION")],
        PipelineType::Compute => &[
            ("instance_type", "INSTANCE_TYPE"),
            ("instance_count", "INSTANCE_COUNT"),
        ],
        PipelineType::App => &[("app_name", "APP_NAME"), ("app_version", "APP_VERSION")],
    };
    for (parameter, variable) in mapped {
        if let Some(value) = request.parameter_text(parameter) {
            variables.insert((*variable).to_string(), value);
        }
    }

    variables
}

/// Project ids may be numeric or a `group/project` path; paths are URL-encoded.
pub fn encode_project_id(project_id: &str) -> String {
    project_id.trim().replace('/', "%2F")
}

pub fn trigger_endpoint(base_url: &str, project_id: &str) -> String {
    format!(
        "{}/api/v4/projects/{}/pipeline",
        base_url.trim_end_matches('/'),
        encode_project_id(project_id)
    )
}

pub fn pipeline_endpoint(base_url: &str, project_id: &str, pipeline_id: &str) -> String {
    format!(
        "{}/api/v4/projects/{}/pipelines/{pipeline_id}",
        base_url.trim_end_matches('/'),
        encode_project_id(project_id)
    )
}

pub fn pipeline_web_url(base_url: &str, project_id: &str, pipeline_id: &str) -> String {
    format!(
        "{}/{}/-/pipelines/{pipeline_id}",
        base_url.trim_end_matches('/'),
        project_id.trim().trim_matches('/')
    )
}

pub fn is_stub_pipeline_id(pipeline_id: &str) -> bool {
    pipeline_id.starts_with(STUB_PIPELINE_PREFIX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::contract::{normalize_request, PipelineRequest};

    use super::*;

    fn normalized(value: serde_json::Value) -> NormalizedPipelineRequest {
        let request: PipelineRequest = serde_json::from_value(value).expect("request");
        normalize_request(request).expect("valid request")
    }

    #[test]
    fn maps_gitlab_statuses_onto_state_enum() {
        assert_eq!(
            PipelineStatus::from_gitlab("created"),
            PipelineStatus::Pending
        );
        assert_eq!(
            PipelineStatus::from_gitlab("waiting_for_resource"),
            PipelineStatus::Pending
        );
        assert_eq!(
            PipelineStatus::from_gitlab("manual"),
            PipelineStatus::Pending
        );
        assert_eq!(
            PipelineStatus::from_gitlab("running"),
            PipelineStatus::Running
        );
        assert_eq!(
            PipelineStatus::from_gitlab("SUCCESS"),
            PipelineStatus::Completed
        );
        assert_eq!(
            PipelineStatus::from_gitlab("failed"),
            PipelineStatus::Failed
        );
        assert_eq!(
            PipelineStatus::from_gitlab("skipped"),
            PipelineStatus::Cancelled
        );
        assert_eq!(
            PipelineStatus::from_gitlab("canceled"),
            PipelineStatus::Cancelled
        );
        assert_eq!(
            PipelineStatus::from_gitlab("archived"),
            PipelineStatus::Unknown
        );
    }

    #[test]
    fn only_final_states_are_terminal() {
        assert!(PipelineStatus::Completed.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::Cancelled.is_terminal());
        assert!(!PipelineStatus::Pending.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(!PipelineStatus::Unknown.is_terminal());
    }

    #[test]
    fn compute_variables_include_tenant_and_stringified_count() {
        let request = normalized(json!({
            "pipeline_type": "compute",
            "environment": "prod",
            "tenant_id": "acme",
            "parameters": {"instance_type": "t3.large", "instance_count": 4, "region": "eu-west-1"}
        }));

        let variables = pipeline_variables(&request, "exec-1");
        assert_eq!(
            variables,
            BTreeMap::from([
                ("ENVIRONMENT".to_string(), "prod".to_string()),
                ("EXECUTION_ID".to_string(), "exec-1".to_string()),
                ("INSTANCE_COUNT".to_string(), "4".to_string()),
                ("INSTANCE_TYPE".to_string(), "t3.large".to_string()),
                ("PIPELINE_TYPE".to_string(), "compute".to_string()),
                ("TENANT_ID".to_string(), "acme".to_string()),
            ])
        );
    }

    #[test]
    fn bootstrap_variables_only_map_region() {
        let request = normalized(json!({
            "pipeline_type": "bootstrap",
            "environment": "dev",
            "region": "us-west-2",
            "parameters": {"app_name": "ignored"}
        }));

        let variables = pipeline_variables(&request, "exec-2");
        assert_eq!(
            variables.get("AWS_REGION").map(String::as_str),
            Some("us-west-2")
        );
        assert!(!variables.contains_key("APP_NAME"));
        assert!(!variables.contains_key("TENANT_ID"));
    }

    #[test]
    fn trigger_body_uses_gitlab_field_names() {
        let variables = BTreeMap::from([("ENVIRONMENT".to_string(), "dev".to_string())]);
        let trigger = PipelineTrigger::new("develop", &variables);

        assert_eq!(
            serde_json::to_value(&trigger).expect("serializes"),
            json!({
                "ref": "develop",
                "variables": [{"key": "ENVIRONMENT", "value": "dev", "variable_type": "env_var"}]
            })
        );
        assert_eq!(trigger.variable("ENVIRONMENT"), Some("dev"));
    }

    #[test]
    fn endpoints_encode_project_paths() {
        assert_eq!(
            trigger_endpoint("https://gitlab.example.com/", "infra/pipelines"),
            "https://gitlab.example.com/api/v4/projects/infra%2Fpipelines/pipeline"
        );
        assert_eq!(
            pipeline_endpoint("https://gitlab.example.com", "42", "981"),
            "https://gitlab.example.com/api/v4/projects/42/pipelines/981"
        );
        assert_eq!(
            pipeline_web_url("https://gitlab.example.com", "infra/pipelines", "981"),
            "https://gitlab.example.com/infra/pipelines/-/pipelines/981"
        );
    }
}
