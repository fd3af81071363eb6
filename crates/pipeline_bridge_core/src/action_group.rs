//! Envelopes for the three ways a handler can be invoked: Bedrock agent
//! action groups, API Gateway proxy events and direct Lambda payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::contract::ValidationError;

pub const MESSAGE_VERSION: &str = "1.0";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationSource {
    ActionGroup,
    ApiGateway,
    Direct,
}

impl InvocationSource {
    pub fn classify(event: &Value) -> Self {
        if event.get("actionGroup").is_some() {
            Self::ActionGroup
        } else if event.get("httpMethod").is_some() {
            Self::ApiGateway
        } else {
            Self::Direct
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Value,
}

impl ActionParameter {
    /// Bedrock sends every value as a string; typed parameters are coerced.
    fn typed_value(&self) -> Value {
        let Value::String(text) = &self.value else {
            return self.value.clone();
        };
        let coerced = match self.kind.as_deref() {
            Some("integer") => text.trim().parse::<i64>().ok().map(Value::from),
            Some("number") => text.trim().parse::<f64>().ok().map(Value::from),
            Some("boolean") => text.trim().parse::<bool>().ok().map(Value::from),
            _ => None,
        };
        coerced.unwrap_or_else(|| self.value.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionGroupEvent {
    pub action_group: String,
    pub api_path: String,
    pub http_method: String,
    pub parameters: Vec<ActionParameter>,
    pub body: Option<Value>,
}

impl ActionGroupEvent {
    pub fn from_value(event: &Value) -> Result<Self, ValidationError> {
        let text = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_string);

        let parameters = match event.get("parameters") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|error| {
                ValidationError::new(format!("Malformed action parameters: {error}"))
            })?,
        };

        let body = event
            .get("requestBody")
            .and_then(|request_body| request_body.get("content"))
            .and_then(|content| content.get(JSON_CONTENT_TYPE))
            .cloned();

        Ok(Self {
            action_group: text("actionGroup").unwrap_or_default(),
            api_path: text("apiPath").unwrap_or_default(),
            http_method: text("httpMethod").unwrap_or_else(|| "POST".to_string()),
            parameters,
            body,
        })
    }

    /// Query/path parameters merged with the JSON body; body values win.
    pub fn params(&self) -> Result<Map<String, Value>, ValidationError> {
        let mut params: Map<String, Value> = self
            .parameters
            .iter()
            .map(|parameter| (parameter.name.clone(), parameter.typed_value()))
            .collect();

        match &self.body {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => {
                let decoded: Value = serde_json::from_str(text).map_err(|error| {
                    ValidationError::new(format!("Malformed JSON body: {error}"))
                })?;
                let Value::Object(fields) = decoded else {
                    return Err(ValidationError::new("Request body must be a JSON object"));
                };
                params.extend(fields);
            }
            Some(Value::Object(fields)) => match fields.get("properties") {
                Some(Value::Array(properties)) => {
                    for property in properties {
                        let property: ActionParameter = serde_json::from_value(property.clone())
                            .map_err(|error| {
                                ValidationError::new(format!("Malformed body property: {error}"))
                            })?;
                        params.insert(property.name.clone(), property.typed_value());
                    }
                }
                _ => params.extend(fields.clone()),
            },
            Some(_) => return Err(ValidationError::new("Request body must be a JSON object")),
        }

        Ok(params)
    }
}

pub fn action_group_response(event: &ActionGroupEvent, status_code: u16, body: &Value) -> Value {
    json!({
        "messageVersion": MESSAGE_VERSION,
        "response": {
            "actionGroup": event.action_group,
            "apiPath": event.api_path,
            "httpMethod": event.http_method,
            "httpStatusCode": status_code,
            "responseBody": {
                "application/json": {
                    "body": body.to_string(),
                }
            }
        }
    })
}

pub fn unknown_path(api_path: &str) -> Value {
    json!({ "error": format!("Unknown API path: {api_path}") })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

impl ApiGatewayResponse {
    pub fn json(status_code: u16, payload: &Value) -> Self {
        Self {
            status_code,
            headers: json!({
                "Content-Type": JSON_CONTENT_TYPE,
                "Access-Control-Allow-Origin": "*",
            }),
            body: payload.to_string(),
        }
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        Self::json(status_code, &json!({ "error": message }))
    }

    pub fn into_value(self) -> Value {
        json!({
            "statusCode": self.status_code,
            "headers": self.headers,
            "body": self.body,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiGatewayRequest {
    pub http_method: String,
    pub path: String,
    /// `queryStringParameters`; absent or null becomes empty.
    pub query: Map<String, Value>,
    pub body: Value,
}

impl ApiGatewayRequest {
    pub fn from_value(event: &Value) -> Result<Self, ValidationError> {
        let text = |key: &str| {
            event
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(Self {
            http_method: text("httpMethod").to_ascii_uppercase(),
            path: text("path"),
            query: match event.get("queryStringParameters") {
                Some(Value::Object(fields)) => fields.clone(),
                _ => Map::new(),
            },
            body: normalize_apigw_body(event)?,
        })
    }

    /// Last non-empty segment of `path`.
    pub fn last_path_segment(&self) -> Option<&str> {
        self.path.split('/').rev().find(|segment| !segment.is_empty())
    }
}

/// Decodes the proxy `body`, which may be a JSON string, an object or absent.
pub fn normalize_apigw_body(event: &Value) -> Result<Value, ValidationError> {
    match event.get("body") {
        None | Some(Value::Null) => Ok(json!({})),
        Some(Value::Object(_)) => Ok(event["body"].clone()),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(json!({})),
        Some(Value::String(text)) => {
            let decoded: Value = serde_json::from_str(text)
                .map_err(|error| ValidationError::new(format!("Malformed JSON body: {error}")))?;
            if decoded.is_object() {
                Ok(decoded)
            } else {
                Err(ValidationError::new("Request body must be a JSON object"))
            }
        }
        Some(_) => Err(ValidationError::new("Request body must be a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_invocation_sources() {
        assert_eq!(
            InvocationSource::classify(&json!({"actionGroup": "mcp", "httpMethod": "POST"})),
            InvocationSource::ActionGroup
        );
        assert_eq!(
            InvocationSource::classify(&json!({"httpMethod": "GET", "path": "/health"})),
            InvocationSource::ApiGateway
        );
        assert_eq!(
            InvocationSource::classify(&json!({"action": "status"})),
            InvocationSource::Direct
        );
    }

    #[test]
    fn merges_parameter_list_with_string_body() {
        let event = ActionGroupEvent::from_value(&json!({
            "actionGroup": "pipeline-actions",
            "apiPath": "/pipeline/execute",
            "parameters": [
                {"name": "environment", "type": "string", "value": "dev"},
                {"name": "instance_count", "type": "integer", "value": "3"}
            ],
            "requestBody": {
                "content": {
                    "application/json": "{\"environment\": \"prod\", \"tenant_id\": \"acme\"}"
                }
            }
        }))
        .expect("event parses");

        assert_eq!(event.http_method, "POST");
        let params = event.params().expect("params decode");
        assert_eq!(params["environment"], json!("prod"));
        assert_eq!(params["tenant_id"], json!("acme"));
        assert_eq!(params["instance_count"], json!(3));
    }

    #[test]
    fn decodes_bedrock_properties_body() {
        let event = ActionGroupEvent::from_value(&json!({
            "actionGroup": "mcp-pipeline-tools",
            "apiPath": "/mcp/execute-compute",
            "httpMethod": "POST",
            "requestBody": {
                "content": {
                    "application/json": {
                        "properties": [
                            {"name": "environment", "type": "string", "value": "dev"},
                            {"name": "instance_count", "type": "integer", "value": "2"}
                        ]
                    }
                }
            }
        }))
        .expect("event parses");

        let params = event.params().expect("params decode");
        assert_eq!(params["environment"], json!("dev"));
        assert_eq!(params["instance_count"], json!(2));
    }

    #[test]
    fn rejects_malformed_body_strings() {
        let event = ActionGroupEvent::from_value(&json!({
            "actionGroup": "memory",
            "apiPath": "/memory/store",
            "requestBody": {"content": {"application/json": "{not json"}}
        }))
        .expect("event parses");

        let error = event.params().expect_err("body should fail");
        assert!(error.message().starts_with("Malformed JSON body"));
    }

    #[test]
    fn wraps_result_in_bedrock_response_envelope() {
        let event = ActionGroupEvent::from_value(&json!({
            "actionGroup": "memory",
            "apiPath": "/memory/query",
            "httpMethod": "GET"
        }))
        .expect("event parses");

        let response = action_group_response(&event, 200, &json!({"count": 0}));
        assert_eq!(response["messageVersion"], json!("1.0"));
        assert_eq!(response["response"]["httpMethod"], json!("GET"));
        assert_eq!(response["response"]["httpStatusCode"], json!(200));
        assert_eq!(
            response["response"]["responseBody"]["application/json"]["body"],
            json!("{\"count\":0}")
        );
    }

    #[test]
    fn normalizes_proxy_bodies() {
        assert_eq!(normalize_apigw_body(&json!({})).expect("absent"), json!({}));
        assert_eq!(
            normalize_apigw_body(&json!({"body": "{\"message\":\"hi\"}"})).expect("string"),
            json!({"message": "hi"})
        );
        assert!(normalize_apigw_body(&json!({"body": "[1,2]"})).is_err());
        assert!(normalize_apigw_body(&json!({"body": 7})).is_err());
    }

    #[test]
    fn proxy_request_reads_query_string_and_last_segment() {
        let request = ApiGatewayRequest::from_value(&json!({
            "httpMethod": "get",
            "path": "/prod/status/exec-7/",
            "queryStringParameters": {"gitlab_pipeline_id": "981"}
        }))
        .expect("request parses");

        assert_eq!(request.http_method, "GET");
        assert_eq!(request.last_path_segment(), Some("exec-7"));
        assert_eq!(request.query.get("gitlab_pipeline_id"), Some(&json!("981")));

        let bare = ApiGatewayRequest::from_value(&json!({
            "httpMethod": "GET",
            "path": "/health",
            "queryStringParameters": null
        }))
        .expect("request parses");
        assert!(bare.query.is_empty());
    }

    #[test]
    fn api_gateway_response_allows_cross_origin_calls() {
        let response = ApiGatewayResponse::error(400, "Message is required").into_value();
        assert_eq!(response["statusCode"], json!(400));
        assert_eq!(
            response["headers"]["Access-Control-Allow-Origin"],
            json!("*")
        );
        assert_eq!(
            response["body"],
            json!("{\"error\":\"Message is required\"}")
        );
    }
}
