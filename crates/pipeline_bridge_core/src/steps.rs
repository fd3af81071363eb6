use serde::{Deserialize, Serialize};

use crate::contract::PipelineType;
use crate::gitlab::PipelineStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineStep {
    pub name: String,
    pub status: StepStatus,
}

const BOOTSTRAP_STEPS: &[&str] = &[
    "Validate prerequisites",
    "Create VPC",
    "Create Subnets",
    "Configure NAT Gateways",
    "Configure Route Tables",
    "Configure ACLs",
    "Create Security Groups",
];

const COMPUTE_STEPS: &[&str] = &[
    "Validate prerequisites",
    "Select AMI",
    "Launch EC2 instances",
    "Configure security groups",
    "Attach IAM roles",
    "Configure monitoring",
];

const APP_STEPS: &[&str] = &[
    "Download application artifacts",
    "Copy to EC2 instances",
    "Install dependencies",
    "Configure application",
    "Start services",
    "Run health checks",
];

pub fn step_names(pipeline_type: PipelineType) -> &'static [&'static str] {
    match pipeline_type {
        PipelineType::Bootstrap => BOOTSTRAP_STEPS,
        PipelineType::Compute => COMPUTE_STEPS,
        PipelineType::App => APP_STEPS,
    }
}

pub fn steps_for(pipeline_type: PipelineType, status: PipelineStatus) -> Vec<PipelineStep> {
    let step_status = if status == PipelineStatus::Completed {
        StepStatus::Completed
    } else {
        StepStatus::Pending
    };
    step_names(pipeline_type)
        .iter()
        .map(|name| PipelineStep {
            name: (*name).to_string(),
            status: step_status,
        })
        .collect()
}
