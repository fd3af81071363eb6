//! Deployment memory: the DynamoDB item shape shared by every handler that
//! records executions, plus history queries over the environment and tenant
//! indexes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::contract::TENANT_PLACEHOLDER;
use crate::execution::ExecutionRecord;

pub const RECORD_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
pub const INDEX_QUERY_LIMIT: usize = 50;
pub const HISTORY_LIMIT: usize = 20;
pub const ENVIRONMENT_INDEX: &str = "environment-index";
pub const TENANT_INDEX: &str = "tenant-index";
pub const UNKNOWN_VALUE: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub session_id: String,
    pub timestamp: i64,
    pub environment: String,
    pub tenant_id: String,
    #[serde(default)]
    pub pipeline_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub details: String,
    pub ttl: i64,
}

impl DeploymentRecord {
    pub fn from_execution(record: &ExecutionRecord, now: DateTime<Utc>) -> Self {
        let timestamp = now.timestamp();
        Self {
            session_id: record.execution_id.clone(),
            timestamp,
            environment: record.environment.as_str().to_string(),
            tenant_id: record
                .tenant_id
                .clone()
                .unwrap_or_else(|| TENANT_PLACEHOLDER.to_string()),
            pipeline_type: Some(record.pipeline_type.as_str().to_string()),
            status: Some(record.status.as_str().to_string()),
            details: serde_json::to_string(record).unwrap_or_default(),
            ttl: timestamp + RECORD_TTL_SECONDS,
        }
    }

    /// Builds a record from an execution result returned by another service.
    /// Returns `None` unless the result carries an `execution_id` and no `error`.
    pub fn from_execution_summary(result: &Value, now: DateTime<Utc>) -> Option<Self> {
        if result.get("error").is_some() {
            return None;
        }
        let session_id = result.get("execution_id")?.as_str()?.to_string();
        let text = |key: &str| {
            result
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let timestamp = now.timestamp();
        Some(Self {
            session_id,
            timestamp,
            environment: text("environment").unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            tenant_id: text("tenant_id").unwrap_or_else(|| TENANT_PLACEHOLDER.to_string()),
            pipeline_type: text("pipeline_type"),
            status: Some(text("status").unwrap_or_else(|| UNKNOWN_VALUE.to_string())),
            details: result.to_string(),
            ttl: timestamp + RECORD_TTL_SECONDS,
        })
    }

    pub fn from_store_request(
        request: StoreMemoryRequest,
        session_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamp = now.timestamp();
        Self {
            session_id: session_id.into(),
            timestamp,
            environment: request
                .environment
                .unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            tenant_id: request
                .tenant_id
                .unwrap_or_else(|| TENANT_PLACEHOLDER.to_string()),
            pipeline_type: request.pipeline_type,
            status: request.status,
            details: request.details.to_string(),
            ttl: timestamp + RECORD_TTL_SECONDS,
        }
    }

    /// Decodes `details` back into an execution record when it holds one.
    pub fn execution(&self) -> Option<ExecutionRecord> {
        serde_json::from_str(&self.details).ok()
    }
}

/// Body of a `/memory/store` action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreMemoryRequest {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub pipeline_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "empty_details")]
    pub details: Value,
}

fn empty_details() -> Value {
    json!({})
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentHistory {
    pub count: usize,
    pub deployments: Vec<DeploymentRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("execution store request failed: {0}")]
    Backend(String),
    #[error("malformed stored record: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn put(&self, record: &DeploymentRecord) -> Result<(), StoreError>;

    async fn latest_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DeploymentRecord>, StoreError>;

    /// Newest first, at most `limit` records.
    async fn query_by_environment(
        &self,
        environment: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;

    /// Newest first, at most `limit` records.
    async fn query_by_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;
}

/// Keyed like the DynamoDB table: `(session_id, timestamp)` overwrites.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: RwLock<Vec<DeploymentRecord>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn query(
        &self,
        limit: usize,
        matches: impl Fn(&DeploymentRecord) -> bool,
    ) -> Vec<DeploymentRecord> {
        let records = self.records.read().await;
        let mut found: Vec<DeploymentRecord> = records
            .iter()
            .rev()
            .filter(|record| matches(record))
            .cloned()
            .collect();
        found.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        found.truncate(limit);
        found
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    /// Also drops every record whose `ttl` is not after the new record's
    /// timestamp.
    async fn put(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.retain(|existing| {
            existing.ttl > record.timestamp
                && (existing.session_id != record.session_id
                    || existing.timestamp != record.timestamp)
        });
        records.push(record.clone());
        Ok(())
    }

    async fn latest_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self
            .query(1, |record| record.session_id == session_id)
            .await
            .into_iter()
            .next())
    }

    async fn query_by_environment(
        &self,
        environment: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        Ok(self
            .query(limit, |record| record.environment == environment)
            .await)
    }

    async fn query_by_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        Ok(self
            .query(limit, |record| record.tenant_id == tenant_id)
            .await)
    }
}

/// Deduplicates by `session_id` keeping the newest entry, orders newest first
/// and keeps the latest [`HISTORY_LIMIT`] entries. `count` is taken before
/// truncation.
pub fn merge_history(lists: impl IntoIterator<Item = Vec<DeploymentRecord>>) -> DeploymentHistory {
    let mut unique: BTreeMap<String, DeploymentRecord> = BTreeMap::new();
    for record in lists.into_iter().flatten() {
        let newer = unique
            .get(&record.session_id)
            .map(|existing| record.timestamp > existing.timestamp)
            .unwrap_or(true);
        if newer {
            unique.insert(record.session_id.clone(), record);
        }
    }

    let mut deployments: Vec<DeploymentRecord> = unique.into_values().collect();
    deployments.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
    let count = deployments.len();
    deployments.truncate(HISTORY_LIMIT);

    DeploymentHistory { count, deployments }
}

pub async fn query_history(
    store: &dyn ExecutionStore,
    environment: Option<&str>,
    tenant_id: Option<&str>,
) -> Result<DeploymentHistory, StoreError> {
    let mut lists = Vec::with_capacity(2);
    if let Some(environment) = environment.filter(|value| !value.is_empty()) {
        lists.push(
            store
                .query_by_environment(environment, INDEX_QUERY_LIMIT)
                .await?,
        );
    }
    if let Some(tenant_id) = tenant_id.filter(|value| !value.is_empty()) {
        lists.push(store.query_by_tenant(tenant_id, INDEX_QUERY_LIMIT).await?);
    }
    Ok(merge_history(lists))
}

/// First record of `pipeline_type` in an already newest-first list.
pub fn latest_for_pipeline<'a>(
    records: &'a [DeploymentRecord],
    pipeline_type: &str,
) -> Option<&'a DeploymentRecord> {
    records
        .iter()
        .find(|record| record.pipeline_type.as_deref() == Some(pipeline_type))
}

/// Newest deployment of `pipeline_type` among the environment's latest
/// [`INDEX_QUERY_LIMIT`] records.
pub async fn latest_deployment(
    store: &dyn ExecutionStore,
    environment: &str,
    pipeline_type: &str,
) -> Result<Option<DeploymentRecord>, StoreError> {
    let records = store
        .query_by_environment(environment, INDEX_QUERY_LIMIT)
        .await?;
    Ok(latest_for_pipeline(&records, pipeline_type).cloned())
}
