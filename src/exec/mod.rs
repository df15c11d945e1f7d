mod login_shell;
mod path;
mod runner;

pub use login_shell::{default_shell, parse_path_output, LoginShellPathCache, DEFAULT_CAPTURE_TIMEOUT};
pub use path::{
    effective_path, enriched_environment, process_env, resolve_binary, AGJ_BINARY_NAME, AGJ_PATH_ENV,
    FALLBACK_PATH, PATH_INTROSPECTION_ENV,
};
pub use runner::ProcessCommandRunner;

use async_trait::async_trait;
use thiserror::Error;

/// Output of a single subprocess invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code (-1 when the process was terminated by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Failures that happen before the subprocess produces an exit code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{0}")]
    BinaryNotFound(String),
    #[error("{0}")]
    NotExecutable(String),
    #[error("{0}")]
    RunFailed(String),
}

/// Runs one subcommand of the agj tool
///
/// A non-zero exit code is not an error at this layer; it is reported in
/// [`CommandResult::exit_code`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, arguments: &[String]) -> Result<CommandResult, CommandError>;
}
