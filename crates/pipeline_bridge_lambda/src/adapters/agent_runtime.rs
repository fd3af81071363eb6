use async_trait::async_trait;
use aws_sdk_bedrockagentruntime::error::DisplayErrorContext;
use aws_sdk_bedrockagentruntime::types::ResponseStream;
use serde_json::{json, Value};
use tracing::info;

use crate::error::HandlerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    pub agent_id: String,
    pub alias_id: String,
    pub session_id: String,
    pub input_text: String,
    pub enable_trace: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReply {
    /// Concatenated completion chunks.
    pub completion: String,
    pub traces: Vec<Value>,
}

/// Collects completion chunk bytes and decodes them once, so a multi-byte
/// character split across chunks survives.
#[derive(Debug, Default)]
pub struct CompletionBuffer {
    bytes: Vec<u8>,
}

impl CompletionBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    pub fn finish(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
        }
    }
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn invoke_agent(&self, invocation: AgentInvocation) -> Result<AgentReply, HandlerError>;
}

pub struct BedrockAgentRuntime {
    client: aws_sdk_bedrockagentruntime::Client,
}

impl BedrockAgentRuntime {
    pub fn new(client: aws_sdk_bedrockagentruntime::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentRuntime for BedrockAgentRuntime {
    async fn invoke_agent(&self, invocation: AgentInvocation) -> Result<AgentReply, HandlerError> {
        info!(
            component = "agent_runtime",
            event = "agent_invoked",
            agent_id = %invocation.agent_id,
            alias_id = %invocation.alias_id,
            session_id = %invocation.session_id,
            enable_trace = invocation.enable_trace,
        );

        let mut output = self
            .client
            .invoke_agent()
            .agent_id(invocation.agent_id)
            .agent_alias_id(invocation.alias_id)
            .session_id(invocation.session_id)
            .input_text(invocation.input_text)
            .enable_trace(invocation.enable_trace)
            .send()
            .await
            .map_err(|error| HandlerError::Agent(DisplayErrorContext(error).to_string()))?;

        let mut reply = AgentReply::default();
        let mut completion = CompletionBuffer::default();
        while let Some(event) = output
            .completion
            .recv()
            .await
            .map_err(|error| HandlerError::Agent(DisplayErrorContext(error).to_string()))?
        {
            match event {
                ResponseStream::Chunk(part) => {
                    if let Some(bytes) = part.bytes() {
                        completion.push(bytes.as_ref());
                    }
                }
                ResponseStream::Trace(part) => {
                    reply.traces.push(json!({
                        "session_id": part.session_id(),
                        "agent_id": part.agent_id(),
                        "trace": part.trace().map(|trace| format!("{trace:?}")),
                    }));
                }
                _ => {}
            }
        }
        reply.completion = completion.finish();
        Ok(reply)
    }
}
