//! Deterministic pipeline bridge domain.
//!
//! This crate owns the request contract, GitLab ref selection and variable
//! mapping, status normalization, execution and deployment-memory records, and
//! the Bedrock action-group envelopes, plus the execute/status service shared
//! by every surface. It excludes the AWS SDK and the Lambda
//! runtime; those live in `pipeline_bridge_lambda`.

pub mod action_group;
pub mod contract;
pub mod delegation;
pub mod execution;
pub mod gitlab;
pub mod logging;
pub mod memory;
pub mod service;
pub mod steps;
