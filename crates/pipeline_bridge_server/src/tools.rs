//! MCP tool catalogue and dispatch onto the [`PipelineService`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pipeline_bridge_core::contract::{PipelineParameters, PipelineRequest, PipelineType};
use pipeline_bridge_core::service::{PipelineService, StatusQuery};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const EXECUTE_BOOTSTRAP_PIPELINE: &str = "execute_bootstrap_pipeline";
pub const EXECUTE_COMPUTE_PIPELINE: &str = "execute_compute_pipeline";
pub const EXECUTE_APP_PIPELINE: &str = "execute_app_pipeline";
pub const GET_PIPELINE_STATUS: &str = "get_pipeline_status";

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.medium";
pub const DEFAULT_INSTANCE_COUNT: u64 = 1;
pub const DEFAULT_APP_VERSION: &str = "latest";

fn environment_property() -> Value {
    json!({
        "type": "string",
        "description": "Target environment (dev, prod)",
        "enum": ["dev", "prod"]
    })
}

fn tenant_property() -> Value {
    json!({"type": "string", "description": "Tenant identifier"})
}

/// `tools/list` payload.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": EXECUTE_BOOTSTRAP_PIPELINE,
            "description": "Execute bootstrap pipeline to create VPC, subnets, ACLs",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "environment": environment_property(),
                    "region": {
                        "type": "string",
                        "description": "AWS region",
                        "default": DEFAULT_REGION
                    }
                },
                "required": ["environment"]
            }
        },
        {
            "name": EXECUTE_COMPUTE_PIPELINE,
            "description": "Execute compute pipeline to provision EC2 instances for a tenant",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "environment": environment_property(),
                    "tenant_id": tenant_property(),
                    "instance_type": {
                        "type": "string",
                        "description": "EC2 instance type",
                        "default": DEFAULT_INSTANCE_TYPE
                    },
                    "instance_count": {
                        "type": "integer",
                        "description": "Number of instances",
                        "default": DEFAULT_INSTANCE_COUNT
                    }
                },
                "required": ["environment", "tenant_id"]
            }
        },
        {
            "name": EXECUTE_APP_PIPELINE,
            "description": "Execute app pipeline to deploy applications to EC2",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "environment": environment_property(),
                    "tenant_id": tenant_property(),
                    "app_name": {"type": "string", "description": "Application name"},
                    "app_version": {
                        "type": "string",
                        "description": "Application version",
                        "default": DEFAULT_APP_VERSION
                    }
                },
                "required": ["environment", "tenant_id", "app_name"]
            }
        },
        {
            "name": GET_PIPELINE_STATUS,
            "description": "Get the status of a pipeline execution",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "execution_id": {"type": "string", "description": "Pipeline execution ID"}
                },
                "required": ["execution_id"]
            }
        }
    ])
}

fn pipeline_for_tool(name: &str) -> Option<PipelineType> {
    match name {
        EXECUTE_BOOTSTRAP_PIPELINE => Some(PipelineType::Bootstrap),
        EXECUTE_COMPUTE_PIPELINE => Some(PipelineType::Compute),
        EXECUTE_APP_PIPELINE => Some(PipelineType::App),
        _ => None,
    }
}

fn parameter_defaults(pipeline_type: PipelineType) -> PipelineParameters {
    let defaults: Vec<(&str, Value)> = match pipeline_type {
        PipelineType::Bootstrap => vec![("region", json!(DEFAULT_REGION))],
        PipelineType::Compute => vec![
            ("instance_type", json!(DEFAULT_INSTANCE_TYPE)),
            ("instance_count", json!(DEFAULT_INSTANCE_COUNT)),
        ],
        PipelineType::App => vec![("app_version", json!(DEFAULT_APP_VERSION))],
    };
    defaults
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn argument_text(arguments: &Value, key: &str) -> Option<String> {
    arguments.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Pipeline request for an execute tool: tool defaults overlaid with every
/// non-null argument other than `environment` and `tenant_id`.
pub fn tool_request(pipeline_type: PipelineType, arguments: &Value) -> PipelineRequest {
    let mut parameters = parameter_defaults(pipeline_type);
    if let Some(arguments) = arguments.as_object() {
        for (key, value) in arguments {
            if key == "environment" || key == "tenant_id" || value.is_null() {
                continue;
            }
            parameters.insert(key.clone(), value.clone());
        }
    }

    PipelineRequest {
        pipeline_type: Some(pipeline_type.as_str().to_string()),
        environment: argument_text(arguments, "environment"),
        tenant_id: argument_text(arguments, "tenant_id"),
        parameters,
        extra: BTreeMap::new(),
    }
}

/// Runs a tool and returns the JSON document reported back to the client.
/// Failures are folded into `{"error": ...}` documents.
pub async fn call_tool(
    service: &PipelineService,
    name: &str,
    arguments: &Value,
    now: DateTime<Utc>,
) -> Value {
    info!(component = "mcp_tools", event = "tool_called", tool = name);

    if let Some(pipeline_type) = pipeline_for_tool(name) {
        let request = tool_request(pipeline_type, arguments);
        return match service.execute(request, Some(pipeline_type), now).await {
            Ok(record) => serde_json::to_value(&record)
                .unwrap_or_else(|error| json!({ "error": error.to_string() })),
            Err(error) => {
                warn!(
                    component = "mcp_tools",
                    event = "tool_failed",
                    tool = name,
                    error = %error,
                );
                json!({ "error": error.to_string() })
            }
        };
    }

    if name == GET_PIPELINE_STATUS {
        let Some(execution_id) = argument_text(arguments, "execution_id") else {
            return json!({ "error": "execution_id is required" });
        };
        return match service.status(&StatusQuery::new(execution_id), now).await {
            Ok(Some(status)) => status,
            Ok(None) => json!({ "error": "Execution not found" }),
            Err(error) => json!({ "error": error.to_string() }),
        };
    }

    json!({ "error": format!("Unknown tool: {name}") })
}

/// `tools/call` result wrapping a tool document as pretty-printed text.
pub fn text_content(document: &Value) -> Value {
    let text = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": document.get("error").is_some(),
    })
}
