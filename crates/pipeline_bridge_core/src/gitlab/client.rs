use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::settings::GitLabSettings;
use super::{
    is_stub_pipeline_id, pipeline_endpoint, pipeline_web_url, trigger_endpoint, GitLabError,
    PipelineStatus, PipelineTrigger, STUB_PIPELINE_PREFIX,
};

/// A pipeline as observed right after triggering it or when re-reading it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggeredPipeline {
    pub pipeline_id: String,
    pub status: PipelineStatus,
    pub web_url: Option<String>,
    pub raw_status: Option<String>,
}

#[async_trait]
pub trait GitLabClient: Send + Sync {
    fn is_stub(&self) -> bool;

    async fn trigger_pipeline(
        &self,
        trigger: &PipelineTrigger,
    ) -> Result<TriggeredPipeline, GitLabError>;

    async fn pipeline_status(&self, pipeline_id: &str) -> Result<TriggeredPipeline, GitLabError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabPipelineResponse {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

pub fn decode_pipeline(response: GitLabPipelineResponse) -> TriggeredPipeline {
    TriggeredPipeline {
        pipeline_id: response.id.to_string(),
        status: PipelineStatus::from_gitlab(&response.status),
        web_url: response.web_url,
        raw_status: Some(response.status),
    }
}

pub struct HttpGitLabClient {
    http: reqwest::Client,
    settings: GitLabSettings,
    token: String,
}

impl HttpGitLabClient {
    pub fn new(settings: GitLabSettings) -> Result<Self, GitLabError> {
        let token = settings.token.clone().ok_or_else(|| {
            GitLabError::Configuration("GITLAB_TOKEN is required for live triggers".to_string())
        })?;
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|error| GitLabError::Configuration(error.to_string()))?;
        Ok(Self {
            http,
            settings,
            token,
        })
    }

    /// Decodes a pipeline response, filling in the web URL when GitLab
    /// omits it.
    async fn read_pipeline(
        &self,
        response: reqwest::Response,
    ) -> Result<TriggeredPipeline, GitLabError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitLabError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GitLabPipelineResponse = response
            .json()
            .await
            .map_err(|error| GitLabError::Decode(error.to_string()))?;
        let mut pipeline = decode_pipeline(payload);
        if pipeline.web_url.is_none() {
            pipeline.web_url = Some(pipeline_web_url(
                &self.settings.base_url,
                &self.settings.project_id,
                &pipeline.pipeline_id,
            ));
        }
        Ok(pipeline)
    }
}

#[async_trait]
impl GitLabClient for HttpGitLabClient {
    fn is_stub(&self) -> bool {
        false
    }

    async fn trigger_pipeline(
        &self,
        trigger: &PipelineTrigger,
    ) -> Result<TriggeredPipeline, GitLabError> {
        let endpoint = trigger_endpoint(&self.settings.base_url, &self.settings.project_id);
        let response = self
            .http
            .post(&endpoint)
            .header("PRIVATE-TOKEN", &self.token)
            .json(trigger)
            .send()
            .await
            .map_err(|error| GitLabError::Transport(error.to_string()))?;

        let pipeline = self.read_pipeline(response).await?;
        info!(
            component = "gitlab",
            event = "pipeline_triggered",
            pipeline_id = %pipeline.pipeline_id,
            git_ref = %trigger.ref_name,
            status = %pipeline.status,
        );
        Ok(pipeline)
    }

    async fn pipeline_status(&self, pipeline_id: &str) -> Result<TriggeredPipeline, GitLabError> {
        let endpoint = pipeline_endpoint(
            &self.settings.base_url,
            &self.settings.project_id,
            pipeline_id,
        );
        let response = self
            .http
            .get(&endpoint)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|error| GitLabError::Transport(error.to_string()))?;
        self.read_pipeline(response).await
    }
}

/// Stands in for GitLab when no token is configured: logs the call it would
/// have made and reports the pipeline as completed.
pub struct StubGitLabClient {
    settings: GitLabSettings,
}

impl StubGitLabClient {
    pub fn new(settings: GitLabSettings) -> Self {
        Self { settings }
    }

    fn completed(&self, pipeline_id: String) -> TriggeredPipeline {
        TriggeredPipeline {
            web_url: Some(pipeline_web_url(
                &self.settings.base_url,
                &self.settings.project_id,
                &pipeline_id,
            )),
            pipeline_id,
            status: PipelineStatus::Completed,
            raw_status: None,
        }
    }
}

#[async_trait]
impl GitLabClient for StubGitLabClient {
    fn is_stub(&self) -> bool {
        true
    }

    async fn trigger_pipeline(
        &self,
        trigger: &PipelineTrigger,
    ) -> Result<TriggeredPipeline, GitLabError> {
        let simple = Uuid::new_v4().simple().to_string();
        let pipeline_id = format!("{STUB_PIPELINE_PREFIX}{}", &simple[..8]);

        warn!(
            component = "gitlab",
            event = "stubbed_gitlab_trigger",
            endpoint = %trigger_endpoint(&self.settings.base_url, &self.settings.project_id),
            token = %self.settings.token_hint(),
            git_ref = %trigger.ref_name,
            variables = ?trigger.variables,
            pipeline_id = %pipeline_id,
            "GitLab is not configured; returning a fake pipeline id"
        );

        Ok(self.completed(pipeline_id))
    }

    async fn pipeline_status(&self, pipeline_id: &str) -> Result<TriggeredPipeline, GitLabError> {
        if is_stub_pipeline_id(pipeline_id) {
            return Ok(self.completed(pipeline_id.to_string()));
        }
        Err(GitLabError::Configuration(format!(
            "GitLab is not configured; cannot look up pipeline {pipeline_id}"
        )))
    }
}

pub fn client_from_settings(
    settings: GitLabSettings,
) -> Result<Arc<dyn GitLabClient>, GitLabError> {
    if settings.is_configured() {
        Ok(Arc::new(HttpGitLabClient::new(settings)?))
    } else {
        Ok(Arc::new(StubGitLabClient::new(settings)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 12,
        }
    }
}

/// Re-reads the pipeline until it reaches a terminal state or the attempts
/// run out, returning the last observation either way.
pub async fn poll_until_terminal(
    client: &dyn GitLabClient,
    pipeline_id: &str,
    policy: PollPolicy,
) -> Result<TriggeredPipeline, GitLabError> {
    let mut observed = client.pipeline_status(pipeline_id).await?;
    for _ in 1..policy.max_attempts.max(1) {
        if observed.status.is_terminal() {
            break;
        }
        tokio::time::sleep(policy.interval).await;
        observed = client.pipeline_status(pipeline_id).await?;
    }
    Ok(observed)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct ScriptedClient {
        statuses: Mutex<Vec<&'static str>>,
        calls: Mutex<usize>,
    }

    impl ScriptedClient {
        fn new(statuses: Vec<&'static str>) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().expect("poisoned mutex")
        }
    }

    #[async_trait]
    impl GitLabClient for ScriptedClient {
        fn is_stub(&self) -> bool {
            false
        }

        async fn trigger_pipeline(
            &self,
            _trigger: &PipelineTrigger,
        ) -> Result<TriggeredPipeline, GitLabError> {
            unreachable!("polling never triggers")
        }

        async fn pipeline_status(
            &self,
            pipeline_id: &str,
        ) -> Result<TriggeredPipeline, GitLabError> {
            *self.calls.lock().expect("poisoned mutex") += 1;
            let mut statuses = self.statuses.lock().expect("poisoned mutex");
            let raw = if statuses.len() > 1 {
                statuses.remove(0)
            } else {
                statuses[0]
            };
            Ok(decode_pipeline(GitLabPipelineResponse {
                id: pipeline_id.parse().expect("numeric id"),
                status: raw.to_string(),
                web_url: None,
            }))
        }
    }

    fn no_wait(max_attempts: usize) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            max_attempts,
        }
    }

    #[test]
    fn decodes_gitlab_pipeline_payload() {
        let response: GitLabPipelineResponse = serde_json::from_str(
            r#"{"id": 981, "status": "created", "ref": "main", "web_url": "https://gitlab.com/p/-/pipelines/981"}"#,
        )
        .expect("payload should parse");

        let pipeline = decode_pipeline(response);
        assert_eq!(pipeline.pipeline_id, "981");
        assert_eq!(pipeline.status, PipelineStatus::Pending);
        assert_eq!(pipeline.raw_status.as_deref(), Some("created"));
        assert_eq!(
            pipeline.web_url.as_deref(),
            Some("https://gitlab.com/p/-/pipelines/981")
        );
    }

    #[tokio::test]
    async fn polling_stops_at_first_terminal_status() {
        let client = ScriptedClient::new(vec!["pending", "running", "success", "failed"]);
        let observed = poll_until_terminal(&client, "7", no_wait(10))
            .await
            .expect("poll succeeds");

        assert_eq!(observed.status, PipelineStatus::Completed);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn polling_returns_last_observation_when_attempts_run_out() {
        let client = ScriptedClient::new(vec!["running"]);
        let observed = poll_until_terminal(&client, "7", no_wait(4))
            .await
            .expect("poll succeeds");

        assert_eq!(observed.status, PipelineStatus::Running);
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn stub_client_fabricates_completed_pipeline() {
        let client = StubGitLabClient::new(GitLabSettings::default());
        let trigger = PipelineTrigger::new("main", &Default::default());

        let pipeline = client
            .trigger_pipeline(&trigger)
            .await
            .expect("stub trigger succeeds");
        assert!(pipeline.pipeline_id.starts_with("stub-"));
        assert_eq!(pipeline.pipeline_id.len(), "stub-".len() + 8);
        assert_eq!(pipeline.status, PipelineStatus::Completed);

        let status = client
            .pipeline_status(&pipeline.pipeline_id)
            .await
            .expect("stub ids resolve");
        assert_eq!(status.status, PipelineStatus::Completed);

        assert!(client.pipeline_status("12345").await.is_err());
    }

    #[test]
    fn live_client_is_chosen_only_with_a_token() {
        let stub = client_from_settings(GitLabSettings::default()).expect("stub builds");
        assert!(stub.is_stub());

        let live = client_from_settings(GitLabSettings {
            token: Some("glpat-token".to_string()),
            ..GitLabSettings::default()
        })
        .expect("live builds");
        assert!(!live.is_stub());
    }
}
