use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contract::ValidationError;

/// Alias Bedrock assigns to an agent's working draft.
pub const TEST_AGENT_ALIAS_ID: &str = "TSTALIASID";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Bootstrap,
    Compute,
    App,
}

impl AgentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Compute => "compute",
            Self::App => "app",
        }
    }

    fn id_variable(self) -> &'static str {
        match self {
            Self::Bootstrap => "BOOTSTRAP_AGENT_ID",
            Self::Compute => "COMPUTE_AGENT_ID",
            Self::App => "APP_AGENT_ID",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bootstrap" => Ok(Self::Bootstrap),
            "compute" => Ok(Self::Compute),
            "app" => Ok(Self::App),
            other => Err(ValidationError::new(format!("Unknown agent type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDirectory {
    pub agent_ids: BTreeMap<AgentType, String>,
    pub alias_id: String,
}

impl AgentDirectory {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let agent_ids = [AgentType::Bootstrap, AgentType::Compute, AgentType::App]
            .into_iter()
            .filter_map(|agent_type| read(agent_type.id_variable()).map(|id| (agent_type, id)))
            .collect();
        Self {
            agent_ids,
            alias_id: read("AGENT_ALIAS_ID").unwrap_or_else(|| TEST_AGENT_ALIAS_ID.to_string()),
        }
    }

    pub fn agent_id(&self, agent_type: AgentType) -> Option<&str> {
        self.agent_ids.get(&agent_type).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelegationRequest {
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default, alias = "task")]
    pub instruction: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Instruction handed to a specialised agent: the caller's task followed by
/// the deployment context and a closing directive.
pub fn build_instruction(request: &DelegationRequest) -> String {
    let mut instruction = format!(
        "\n{}\n\nEnvironment: {}\n",
        request.instruction.as_deref().unwrap_or_default(),
        request.environment.as_deref().unwrap_or("unspecified"),
    );

    if let Some(tenant_id) = request.tenant_id.as_deref().filter(|value| !value.is_empty()) {
        instruction.push_str(&format!("Tenant ID: {tenant_id}\n"));
    }

    let has_parameters = match &request.parameters {
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if let Some(parameters) = request.parameters.as_ref().filter(|_| has_parameters) {
        instruction.push_str(&format!("\nAdditional parameters: {parameters}\n"));
    }

    instruction.push_str(
        "\nPlease use your MCP tools to execute the pipeline and your knowledge base for guidance.\n\
         Store the results in memory when complete.\n",
    );
    instruction
}

/// `execution_id` reported by an agent whose reply is a JSON object.
pub fn extract_execution_id(agent_response: &str) -> Option<String> {
    serde_json::from_str::<Value>(agent_response.trim())
        .ok()?
        .get("execution_id")?
        .as_str()
        .map(str::to_string)
}

/// Reply for delegations that are acknowledged but not forwarded.
pub fn delegation_acknowledgement(request: &DelegationRequest) -> Value {
    json!({
        "status": "delegated",
        "agent_type": request.agent_type,
        "task": request.instruction,
        "environment": request.environment,
        "tenant_id": request.tenant_id,
    })
}
