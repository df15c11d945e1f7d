use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::AgentInstance;
use crate::exec::{CommandError, CommandResult, CommandRunner};

/// Lines of scrollback requested when previewing an agent
pub const CAPTURE_LINES: u32 = 200;

/// agj exits with this code when the terminal's automation API is off
const EXIT_BACKEND_UNAVAILABLE: i32 = 3;
const EXIT_NO_MATCH: i32 = 1;
const NO_MATCH_MARKER: &str = "No matching instances";
const NO_SESSION_MESSAGE: &str = "No iTerm session mapped for selection.";

/// Failures of an agj subcommand
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgjError {
    #[error("Failed to parse agj output.")]
    DecodeFailed,
    #[error("iTerm2 API unavailable.")]
    BackendUnavailable,
    #[error("{0}")]
    CommandFailed(String),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// The agj operations the store depends on
#[async_trait]
pub trait AgentServing: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<AgentInstance>, AgjError>;
    async fn focus(&self, instance: &AgentInstance) -> Result<(), AgjError>;
    async fn capture_output(&self, instance: &AgentInstance, lines: Option<u32>) -> Result<String, AgjError>;
}

/// Client for the agj command line tool
#[derive(Clone)]
pub struct AgjClient {
    runner: Arc<dyn CommandRunner>,
}

impl AgjClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn run(&self, command: &str, arguments: Vec<String>) -> Result<CommandResult, AgjError> {
        Ok(self.runner.run(command, &arguments).await?)
    }
}

#[async_trait]
impl AgentServing for AgjClient {
    /// `agj list --json --with-path`
    async fn list_instances(&self) -> Result<Vec<AgentInstance>, AgjError> {
        let result = self
            .run("list", vec!["--json".to_string(), "--with-path".to_string()])
            .await?;

        match result.exit_code {
            0 => serde_json::from_str(&result.stdout).map_err(|e| {
                debug!(error = %e, "agj list output did not decode");
                AgjError::DecodeFailed
            }),
            EXIT_NO_MATCH if result.stdout.contains(NO_MATCH_MARKER) => Ok(Vec::new()),
            EXIT_BACKEND_UNAVAILABLE => Err(AgjError::BackendUnavailable),
            _ => Err(AgjError::CommandFailed(failure_detail(&result))),
        }
    }

    /// `agj focus --session <id>`
    async fn focus(&self, instance: &AgentInstance) -> Result<(), AgjError> {
        let session_id = require_session(instance)?;
        let result = self
            .run("focus", vec!["--session".to_string(), session_id.to_string()])
            .await?;

        check_exit(&result)
    }

    /// `agj capture --session <id> [--lines <n>]`, trimmed
    async fn capture_output(&self, instance: &AgentInstance, lines: Option<u32>) -> Result<String, AgjError> {
        let session_id = require_session(instance)?;
        let mut arguments = vec!["--session".to_string(), session_id.to_string()];
        if let Some(lines) = lines {
            arguments.push("--lines".to_string());
            arguments.push(lines.to_string());
        }

        let result = self.run("capture", arguments).await?;
        check_exit(&result)?;
        Ok(result.stdout.trim().to_string())
    }
}

fn require_session(instance: &AgentInstance) -> Result<&str, AgjError> {
    instance
        .session_id()
        .ok_or_else(|| AgjError::CommandFailed(NO_SESSION_MESSAGE.to_string()))
}

fn check_exit(result: &CommandResult) -> Result<(), AgjError> {
    match result.exit_code {
        0 => Ok(()),
        EXIT_BACKEND_UNAVAILABLE => Err(AgjError::BackendUnavailable),
        _ => Err(AgjError::CommandFailed(failure_detail(result))),
    }
}

fn failure_detail(result: &CommandResult) -> String {
    let detail = result.stderr.trim();
    if detail.is_empty() {
        "agj failed to run.".to_string()
    } else {
        detail.to_string()
    }
}
