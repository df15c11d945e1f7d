use async_trait::async_trait;
use parking_lot::RwLock;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use super::login_shell::LoginShellPathCache;
use super::path::{
    enriched_environment, is_executable_file, process_env, resolve_binary_in, PATH_INTROSPECTION_ENV,
};
use super::{CommandError, CommandResult, CommandRunner};

const NOT_FOUND_MESSAGE: &str = "agj not found on PATH. Install with: pipx install agj";
const NOT_EXECUTABLE_MESSAGE: &str =
    "Custom path not executable. Update the path or leave blank to use PATH.";

/// Runs agj as a real subprocess
///
/// Every call resolves the binary again, so a changed override or a login
/// PATH that arrived after startup is picked up on the next poll.
#[derive(Clone)]
pub struct ProcessCommandRunner {
    command_override: Arc<RwLock<Option<String>>>,
    login_path: LoginShellPathCache,
}

impl ProcessCommandRunner {
    pub fn new(command_override: Option<String>) -> Self {
        Self::with_login_path(command_override, LoginShellPathCache::shared().clone())
    }

    pub fn with_login_path(command_override: Option<String>, login_path: LoginShellPathCache) -> Self {
        Self {
            command_override: Arc::new(RwLock::new(command_override)),
            login_path,
        }
    }

    /// Replace the command-or-path override used for resolution
    pub fn set_command_override(&self, command_override: Option<String>) {
        *self.command_override.write() = command_override;
    }

    pub fn command_override(&self) -> Option<String> {
        self.command_override.read().clone()
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, command: &str, arguments: &[String]) -> Result<CommandResult, CommandError> {
        let env = process_env();
        let login_path = self.login_path.current();
        let home = dirs::home_dir();
        let command_override = self.command_override();

        let resolved = resolve_binary_in(
            command_override.as_deref(),
            &env,
            login_path.as_deref(),
            home.as_deref(),
        )
        .ok_or_else(|| CommandError::BinaryNotFound(NOT_FOUND_MESSAGE.to_string()))?;

        if !is_executable_file(&resolved) {
            return Err(CommandError::NotExecutable(NOT_EXECUTABLE_MESSAGE.to_string()));
        }

        let enriched = enriched_environment(&env, login_path.as_deref(), home.as_deref());

        debug!(binary = %resolved.display(), command, ?arguments, "Running agj");

        let mut child = Command::new(&resolved);
        child.arg(command).args(arguments).stdin(Stdio::null());
        // Everything else is inherited as-is, including non UTF-8 values
        for key in ["PATH", PATH_INTROSPECTION_ENV] {
            if let Some(value) = enriched.get(key) {
                child.env(key, value);
            }
        }

        let output = child
            .output()
            .await
            .map_err(|e| {
                CommandError::RunFailed(format!("Failed to run {}: {}", resolved.display(), e))
            })?;

        Ok(CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn runner_for(path: &Path) -> ProcessCommandRunner {
        ProcessCommandRunner::with_login_path(
            Some(path.display().to_string()),
            LoginShellPathCache::new(),
        )
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let agj = script(
            dir.path(),
            "agj",
            &format!("echo \"$@\"\necho \"${}\" >&2\nexit 3", PATH_INTROSPECTION_ENV),
            0o755,
        );

        let result = runner_for(&agj)
            .run("capture", &["--session".to_string(), "w0t0p0".to_string()])
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "capture --session w0t0p0\n");
        assert!(!result.stderr.trim().is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = runner_for(&dir.path().join("agj")).run("list", &[]).await;

        assert!(matches!(result, Err(CommandError::BinaryNotFound(_))));
    }

    #[tokio::test]
    async fn test_non_executable_override_is_reported() {
        let dir = TempDir::new().unwrap();
        let agj = script(dir.path(), "agj", "exit 0", 0o644);

        let result = runner_for(&agj).run("list", &[]).await;

        assert_eq!(
            result,
            Err(CommandError::NotExecutable(NOT_EXECUTABLE_MESSAGE.to_string()))
        );
    }

    #[test]
    fn test_non_utf8_environment_does_not_break_run() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let agj = script(dir.path(), "agj", "echo \"$AGENT_TAP_TEST_RAW\" | wc -c", 0o755);
        let runner = runner_for(&agj);

        temp_env::with_var("AGENT_TAP_TEST_RAW", Some(OsStr::from_bytes(b"\xff\xfe")), || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result = rt.block_on(runner.run("list", &[])).unwrap();

            assert_eq!(result.exit_code, 0);
            // Two raw bytes plus the newline reach the child untouched
            assert_eq!(result.stdout.trim(), "3");
        });
    }

    #[tokio::test]
    async fn test_override_can_be_changed_after_construction() {
        let dir = TempDir::new().unwrap();
        let agj = script(dir.path(), "agj", "echo ok", 0o755);
        let runner = runner_for(&dir.path().join("missing"));

        assert!(runner.run("list", &[]).await.is_err());

        runner.set_command_override(Some(agj.display().to_string()));
        let result = runner.run("list", &[]).await.unwrap();
        assert_eq!(result, CommandResult::new(0, "ok\n", ""));
    }
}
