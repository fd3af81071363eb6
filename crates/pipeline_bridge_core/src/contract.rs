use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const EXECUTION_RECORD_SCHEMA_VERSION: &str = "v1";
pub const TENANT_PLACEHOLDER: &str = "N/A";

/// Top-level request keys folded into the parameter map during normalization.
pub const RECOGNIZED_PARAMETER_KEYS: [&str; 6] = [
    "region",
    "instance_type",
    "instance_count",
    "app_name",
    "app_version",
    "ref",
];

/// Keys that describe the request itself and never belong in `parameters`.
const ENVELOPE_KEYS: [&str; 5] = [
    "action",
    "pipeline_type",
    "environment",
    "tenant_id",
    "parameters",
];

pub type PipelineParameters = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineType {
    Bootstrap,
    Compute,
    App,
}

impl PipelineType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Compute => "compute",
            Self::App => "app",
        }
    }

    pub fn requires_tenant(self) -> bool {
        matches!(self, Self::Compute | Self::App)
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bootstrap" => Ok(Self::Bootstrap),
            "compute" => Ok(Self::Compute),
            "app" => Ok(Self::App),
            other => Err(ValidationError::new(format!(
                "Unknown pipeline_type '{other}' (expected bootstrap, compute or app)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => Err(ValidationError::new(format!(
                "Unknown environment '{other}' (expected dev or prod)"
            ))),
        }
    }
}

/// Pipeline request as it arrives from agents, proxies and HTTP callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineRequest {
    #[serde(default)]
    pub pipeline_type: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub parameters: PipelineParameters,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedPipelineRequest {
    pub pipeline_type: PipelineType,
    pub environment: Environment,
    pub tenant_id: Option<String>,
    pub parameters: PipelineParameters,
}

impl NormalizedPipelineRequest {
    /// Parameter rendered as text: strings verbatim, scalars via their JSON form.
    pub fn parameter_text(&self, key: &str) -> Option<String> {
        match self.parameters.get(key)? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(format!("{field} is required"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn normalize_request(
    payload: PipelineRequest,
) -> Result<NormalizedPipelineRequest, ValidationError> {
    let pipeline_type = match payload.pipeline_type.as_deref() {
        Some(value) => value.parse::<PipelineType>()?,
        None => return Err(ValidationError::missing_field("pipeline_type")),
    };

    let environment = match payload.environment.as_deref() {
        Some(value) => value.parse::<Environment>()?,
        None => return Err(ValidationError::missing_field("environment")),
    };

    let tenant_id = payload
        .tenant_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != TENANT_PLACEHOLDER);

    let mut parameters: PipelineParameters = payload
        .parameters
        .into_iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
        .collect();
    for key in RECOGNIZED_PARAMETER_KEYS {
        if let Some(value) = payload.extra.get(key) {
            if !value.is_null() {
                parameters.insert(key.to_string(), value.clone());
            }
        }
    }
    parameters.retain(|_, value| !value.is_null());

    if pipeline_type.requires_tenant() && tenant_id.is_none() {
        return Err(ValidationError::new(format!(
            "tenant_id is required for {pipeline_type} pipelines"
        )));
    }

    if pipeline_type == PipelineType::App {
        let has_app_name = parameters
            .get("app_name")
            .and_then(Value::as_str)
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false);
        if !has_app_name {
            return Err(ValidationError::new(
                "app_name is required for app pipelines",
            ));
        }
    }

    if let Some(count) = parameters.get("instance_count") {
        let parsed = parse_positive_integer(count).ok_or_else(|| {
            ValidationError::new("instance_count must be a positive integer")
        })?;
        parameters.insert("instance_count".to_string(), Value::from(parsed));
    }

    Ok(NormalizedPipelineRequest {
        pipeline_type,
        environment,
        tenant_id,
        parameters,
    })
}

pub fn request_fingerprint(request: &NormalizedPipelineRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(request).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}

fn parse_positive_integer(value: &Value) -> Option<u64> {
    let parsed = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (parsed > 0).then_some(parsed)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<PipelineParameters, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<PipelineParameters>::deserialize(deserializer)?.unwrap_or_default())
}
