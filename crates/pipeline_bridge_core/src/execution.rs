use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::contract::{
    request_fingerprint, Environment, NormalizedPipelineRequest, PipelineParameters, PipelineType,
    ValidationError, EXECUTION_RECORD_SCHEMA_VERSION,
};
use crate::gitlab::{
    pipeline_variables, GitLabClient, GitLabError, PipelineStatus, PipelineTrigger, RefPolicy,
    TriggeredPipeline,
};
use crate::memory::StoreError;
use crate::steps::{steps_for, PipelineStep};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub gitlab_pipeline_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_url: Option<String>,
    pub git_ref: String,
    pub pipeline_type: PipelineType,
    pub environment: Environment,
    pub tenant_id: Option<String>,
    pub status: PipelineStatus,
    pub started_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    pub parameters: PipelineParameters,
    pub variables: BTreeMap<String, String>,
    pub steps: Vec<PipelineStep>,
    pub request_fingerprint: String,
    pub record_schema: String,
}

impl ExecutionRecord {
    /// Folds a fresh GitLab observation into the record.
    pub fn apply_observation(&mut self, observed: &TriggeredPipeline, now: DateTime<Utc>) {
        self.status = observed.status;
        self.steps = steps_for(self.pipeline_type, observed.status);
        if self.gitlab_url.is_none() {
            self.gitlab_url = observed.web_url.clone();
        }
        if observed.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now.to_rfc3339());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    GitLab(#[from] GitLabError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode execution record: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct PipelineExecutor<'a> {
    gitlab: &'a dyn GitLabClient,
    refs: &'a RefPolicy,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(gitlab: &'a dyn GitLabClient, refs: &'a RefPolicy) -> Self {
        Self { gitlab, refs }
    }

    pub async fn execute(
        &self,
        request: &NormalizedPipelineRequest,
        execution_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord, GitLabError> {
        let git_ref = self.refs.select_ref(request);
        let variables = pipeline_variables(request, execution_id);
        let trigger = PipelineTrigger::new(git_ref.clone(), &variables);

        info!(
            component = "executor",
            event = "pipeline_execution_requested",
            execution_id,
            pipeline_type = %request.pipeline_type,
            environment = %request.environment,
            tenant_id = request.tenant_id.as_deref().unwrap_or("none"),
            git_ref = %git_ref,
            stubbed = self.gitlab.is_stub(),
        );

        let pipeline = self.gitlab.trigger_pipeline(&trigger).await?;
        let started_at = now.to_rfc3339();

        Ok(ExecutionRecord {
            execution_id: execution_id.to_string(),
            gitlab_pipeline_id: pipeline.pipeline_id,
            gitlab_url: pipeline.web_url,
            git_ref,
            pipeline_type: request.pipeline_type,
            environment: request.environment,
            tenant_id: request.tenant_id.clone(),
            status: pipeline.status,
            completed_at: pipeline.status.is_terminal().then(|| started_at.clone()),
            started_at,
            parameters: request.parameters.clone(),
            variables,
            steps: steps_for(request.pipeline_type, pipeline.status),
            request_fingerprint: request_fingerprint(request),
            record_schema: EXECUTION_RECORD_SCHEMA_VERSION.to_string(),
        })
    }

    /// Terminal records are returned untouched; others are re-read from GitLab.
    pub async fn refresh(
        &self,
        mut record: ExecutionRecord,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord, GitLabError> {
        if record.status.is_terminal() {
            return Ok(record);
        }
        let observed = self
            .gitlab
            .pipeline_status(&record.gitlab_pipeline_id)
            .await?;
        record.apply_observation(&observed, now);
        Ok(record)
    }
}
