use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use pipeline_bridge_core::memory::{
    DeploymentRecord, ExecutionStore, StoreError, ENVIRONMENT_INDEX, TENANT_INDEX,
};

pub type Item = HashMap<String, AttributeValue>;

/// Deployment memory table keyed by `session_id` and `timestamp`, with
/// `environment-index` and `tenant-index` for history queries.
pub struct DynamoExecutionStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoExecutionStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn query_newest_first(
        &self,
        index_name: Option<&str>,
        key_attribute: &str,
        key_value: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .set_index_name(index_name.map(str::to_string))
            .key_condition_expression("#key = :value")
            .expression_attribute_names("#key", key_attribute)
            .expression_attribute_values(":value", AttributeValue::S(key_value.to_string()))
            .scan_index_forward(false)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|error| {
                StoreError::Backend(format!(
                    "failed to query {}: {}",
                    index_name.unwrap_or(&self.table_name),
                    DisplayErrorContext(error)
                ))
            })?;

        output.items().iter().map(item_to_record).collect()
    }
}

#[async_trait]
impl ExecutionStore for DynamoExecutionStore {
    async fn put(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                StoreError::Backend(format!(
                    "failed to put deployment record: {}",
                    DisplayErrorContext(error)
                ))
            })
    }

    async fn latest_for_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self
            .query_newest_first(None, "session_id", session_id, 1)
            .await?
            .into_iter()
            .next())
    }

    async fn query_by_environment(
        &self,
        environment: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.query_newest_first(Some(ENVIRONMENT_INDEX), "environment", environment, limit)
            .await
    }

    async fn query_by_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.query_newest_first(Some(TENANT_INDEX), "tenant_id", tenant_id, limit)
            .await
    }
}

pub fn record_to_item(record: &DeploymentRecord) -> Item {
    let mut item = HashMap::from([
        (
            "session_id".to_string(),
            AttributeValue::S(record.session_id.clone()),
        ),
        (
            "timestamp".to_string(),
            AttributeValue::N(record.timestamp.to_string()),
        ),
        (
            "environment".to_string(),
            AttributeValue::S(record.environment.clone()),
        ),
        (
            "tenant_id".to_string(),
            AttributeValue::S(record.tenant_id.clone()),
        ),
        (
            "details".to_string(),
            AttributeValue::S(record.details.clone()),
        ),
        ("ttl".to_string(), AttributeValue::N(record.ttl.to_string())),
    ]);
    if let Some(pipeline_type) = &record.pipeline_type {
        item.insert(
            "pipeline_type".to_string(),
            AttributeValue::S(pipeline_type.clone()),
        );
    }
    if let Some(status) = &record.status {
        item.insert("status".to_string(), AttributeValue::S(status.clone()));
    }
    item
}

pub fn item_to_record(item: &Item) -> Result<DeploymentRecord, StoreError> {
    let text = |key: &str| -> Option<String> {
        item.get(key)
            .and_then(|value| value.as_s().ok())
            .cloned()
    };
    let number = |key: &str| -> Result<i64, StoreError> {
        item.get(key)
            .and_then(|value| value.as_n().ok())
            .ok_or_else(|| StoreError::Malformed(format!("{key} must be a number attribute")))?
            .parse::<i64>()
            .map_err(|error| StoreError::Malformed(format!("{key} is not an integer: {error}")))
    };

    Ok(DeploymentRecord {
        session_id: text("session_id")
            .ok_or_else(|| StoreError::Malformed("session_id must be a string attribute".into()))?,
        timestamp: number("timestamp")?,
        environment: text("environment").unwrap_or_default(),
        tenant_id: text("tenant_id").unwrap_or_default(),
        pipeline_type: text("pipeline_type"),
        status: text("status"),
        details: text("details").unwrap_or_else(|| "{}".to_string()),
        ttl: number("ttl")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeploymentRecord {
        DeploymentRecord {
            session_id: "exec-1".to_string(),
            timestamp: 1_771_056_000,
            environment: "prod".to_string(),
            tenant_id: "acme".to_string(),
            pipeline_type: Some("compute".to_string()),
            status: None,
            details: "{\"execution_id\":\"exec-1\"}".to_string(),
            ttl: 1_773_648_000,
        }
    }

    #[test]
    fn item_uses_number_attributes_for_key_and_ttl() {
        let item = record_to_item(&record());

        assert_eq!(
            item.get("timestamp"),
            Some(&AttributeValue::N("1771056000".to_string()))
        );
        assert_eq!(
            item.get("ttl"),
            Some(&AttributeValue::N("1773648000".to_string()))
        );
        assert_eq!(
            item.get("tenant_id"),
            Some(&AttributeValue::S("acme".to_string()))
        );
        assert!(!item.contains_key("status"));
    }

    #[test]
    fn item_decodes_back_into_the_record() {
        let decoded = item_to_record(&record_to_item(&record())).expect("item decodes");
        assert_eq!(decoded, record());
    }

    #[test]
    fn rejects_items_without_numeric_timestamp() {
        let mut item = record_to_item(&record());
        item.insert(
            "timestamp".to_string(),
            AttributeValue::S("yesterday".to_string()),
        );

        let error = item_to_record(&item).expect_err("timestamp must be numeric");
        assert!(error
            .to_string()
            .contains("timestamp must be a number attribute"));
    }
}
