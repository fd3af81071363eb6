//! AWS-oriented adapters and handlers for the pipeline bridge Lambdas.
//!
//! This crate owns runtime integration details (Lambda handlers, DynamoDB
//! deployment memory, Lambda and Bedrock agent invocation) on top of the
//! deterministic domain in `pipeline_bridge_core`.

pub mod adapters;
pub mod config;
pub mod error;
pub mod handlers;
