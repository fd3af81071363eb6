//! Execute and status operations shared by the MCP server Lambda, the HTTP
//! API and the stdio tool surface.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::contract::{normalize_request, PipelineRequest, PipelineType};
use crate::execution::{ExecutionError, ExecutionRecord, PipelineExecutor};
use crate::gitlab::{poll_until_terminal, GitLabClient, PollPolicy, RefPolicy};
use crate::memory::{DeploymentRecord, ExecutionStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusQuery {
    pub execution_id: String,
    /// Consulted only when no stored execution matches `execution_id`.
    pub gitlab_pipeline_id: Option<String>,
    /// Poll GitLab until the pipeline settles instead of reading it once.
    pub wait: Option<PollPolicy>,
}

impl StatusQuery {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct PipelineService {
    gitlab: Arc<dyn GitLabClient>,
    refs: RefPolicy,
    store: Option<Arc<dyn ExecutionStore>>,
}

impl PipelineService {
    pub fn new(
        gitlab: Arc<dyn GitLabClient>,
        refs: RefPolicy,
        store: Option<Arc<dyn ExecutionStore>>,
    ) -> Self {
        Self {
            gitlab,
            refs,
            store,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.gitlab.is_stub()
    }

    /// Normalizes the request, triggers the pipeline and records the
    /// execution. `pipeline_type` overrides the one carried by the request.
    pub async fn execute(
        &self,
        mut request: PipelineRequest,
        pipeline_type: Option<PipelineType>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord, ExecutionError> {
        if let Some(pipeline_type) = pipeline_type {
            request.pipeline_type = Some(pipeline_type.as_str().to_string());
        }
        let normalized = normalize_request(request)?;
        let execution_id = Uuid::new_v4().to_string();

        let record = PipelineExecutor::new(self.gitlab.as_ref(), &self.refs)
            .execute(&normalized, &execution_id, now)
            .await?;
        self.record(&record, now).await?;

        info!(
            component = "service",
            event = "pipeline_execution_recorded",
            execution_id = %record.execution_id,
            gitlab_pipeline_id = %record.gitlab_pipeline_id,
            status = %record.status,
        );
        Ok(record)
    }

    /// Current view of an execution, or `None` when nothing is known about it.
    pub async fn status(
        &self,
        query: &StatusQuery,
        now: DateTime<Utc>,
    ) -> Result<Option<Value>, ExecutionError> {
        if let Some(store) = &self.store {
            if let Some(stored) = store.latest_for_session(&query.execution_id).await? {
                let Some(record) = stored.execution() else {
                    return Ok(Some(
                        serde_json::from_str(&stored.details)
                            .unwrap_or(Value::String(stored.details)),
                    ));
                };
                let refreshed = self.refresh(record, query.wait, now).await?;
                return Ok(Some(serde_json::to_value(&refreshed)?));
            }
        }

        let Some(pipeline_id) = query
            .gitlab_pipeline_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
        else {
            return Ok(None);
        };

        let observed = match query.wait {
            Some(policy) => poll_until_terminal(self.gitlab.as_ref(), pipeline_id, policy).await?,
            None => self.gitlab.pipeline_status(pipeline_id).await?,
        };
        Ok(Some(json!({
            "execution_id": query.execution_id,
            "gitlab_pipeline_id": observed.pipeline_id,
            "gitlab_url": observed.web_url,
            "status": observed.status,
        })))
    }

    async fn refresh(
        &self,
        record: ExecutionRecord,
        wait: Option<PollPolicy>,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord, ExecutionError> {
        if record.status.is_terminal() {
            return Ok(record);
        }
        let previous = record.status;
        let refreshed = match wait {
            Some(policy) => {
                let observed =
                    poll_until_terminal(self.gitlab.as_ref(), &record.gitlab_pipeline_id, policy)
                        .await?;
                let mut record = record;
                record.apply_observation(&observed, now);
                record
            }
            None => {
                PipelineExecutor::new(self.gitlab.as_ref(), &self.refs)
                    .refresh(record, now)
                    .await?
            }
        };
        if refreshed.status != previous {
            self.record(&refreshed, now).await?;
        }
        Ok(refreshed)
    }

    async fn record(
        &self,
        record: &ExecutionRecord,
        now: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        match &self.store {
            Some(store) => {
                store
                    .put(&DeploymentRecord::from_execution(record, now))
                    .await?;
                info!(
                    component = "service",
                    event = "execution_stored",
                    execution_id = %record.execution_id,
                    status = %record.status,
                );
            }
            None => warn!(
                component = "service",
                event = "execution_store_skipped",
                execution_id = %record.execution_id,
                "no execution store configured"
            ),
        }
        Ok(())
    }
}
