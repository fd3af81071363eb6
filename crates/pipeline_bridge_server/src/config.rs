use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use pipeline_bridge_core::gitlab::settings::{
    DEFAULT_GITLAB_URL, DEFAULT_REQUEST_TIMEOUT_SECS, STUB_PROJECT_ID,
};
use pipeline_bridge_core::gitlab::{GitLabError, GitLabSettings, DEFAULT_REF};

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Parser)]
#[command(
    name = "pipeline-bridge-server",
    about = "MCP server that turns pipeline requests into GitLab pipeline triggers"
)]
pub struct Cli {
    #[command(flatten)]
    pub gitlab: GitLabArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the JSON API over HTTP
    ServeHttp(HttpArgs),
    /// Speak MCP JSON-RPC over stdin/stdout
    ServeStdio,
}

#[derive(Debug, Clone, Args)]
pub struct HttpArgs {
    #[arg(long, env = "MCP_SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "MCP_SERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl HttpArgs {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Args)]
pub struct GitLabArgs {
    #[arg(
        long,
        env = "GITLAB_URL",
        default_value = DEFAULT_GITLAB_URL,
        global = true
    )]
    pub gitlab_url: String,

    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true, global = true)]
    pub gitlab_token: Option<String>,

    #[arg(
        long,
        env = "GITLAB_PROJECT_ID",
        default_value = STUB_PROJECT_ID,
        global = true
    )]
    pub gitlab_project_id: String,

    #[arg(
        long,
        env = "GITLAB_DEFAULT_REF",
        default_value = DEFAULT_REF,
        global = true
    )]
    pub gitlab_default_ref: String,

    #[arg(long, env = "GITLAB_REF_DEV", global = true)]
    pub gitlab_ref_dev: Option<String>,

    #[arg(long, env = "GITLAB_REF_PROD", global = true)]
    pub gitlab_ref_prod: Option<String>,

    #[arg(
        long,
        env = "GITLAB_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS,
        global = true
    )]
    pub gitlab_timeout_secs: u64,
}

impl GitLabArgs {
    /// Resolves the flags through the same rules as the Lambda environment,
    /// so blank values and the `STUB_TOKEN` sentinel behave identically.
    pub fn settings(&self) -> Result<GitLabSettings, GitLabError> {
        let timeout = self.gitlab_timeout_secs.to_string();
        GitLabSettings::from_lookup(|key| match key {
            "GITLAB_URL" => Some(self.gitlab_url.clone()),
            "GITLAB_TOKEN" => self.gitlab_token.clone(),
            "GITLAB_PROJECT_ID" => Some(self.gitlab_project_id.clone()),
            "GITLAB_DEFAULT_REF" => Some(self.gitlab_default_ref.clone()),
            "GITLAB_REF_DEV" => self.gitlab_ref_dev.clone(),
            "GITLAB_REF_PROD" => self.gitlab_ref_prod.clone(),
            "GITLAB_TIMEOUT_SECS" => Some(timeout.clone()),
            _ => None,
        })
    }
}
