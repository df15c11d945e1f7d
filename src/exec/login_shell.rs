use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How long the login shell gets to print its PATH
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(1500);

const FALLBACK_SHELL: &str = "/bin/zsh";

static SHARED: Lazy<LoginShellPathCache> = Lazy::new(LoginShellPathCache::new);

type Waiter = oneshot::Sender<Option<Vec<String>>>;

#[derive(Default)]
struct CaptureState {
    captured: Option<Vec<String>>,
    capturing: bool,
    waiters: Vec<Waiter>,
}

/// One-time capture of the user's login shell PATH
///
/// Processes launched from a graphical session do not inherit the PATH a
/// login shell would set up, so agj installed through pipx or Homebrew is
/// often invisible. The first caller spawns `<shell> -l -c 'echo $PATH'`;
/// callers arriving while that runs wait for the same result. A successful
/// capture is kept for the lifetime of the cache; a failed one is not
/// stored, so the next call tries again.
#[derive(Clone, Default)]
pub struct LoginShellPathCache {
    state: Arc<Mutex<CaptureState>>,
}

impl LoginShellPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used by [`ProcessCommandRunner`](super::ProcessCommandRunner)
    pub fn shared() -> &'static LoginShellPathCache {
        &SHARED
    }

    /// Captured PATH, if a capture has completed successfully
    pub fn current(&self) -> Option<Vec<String>> {
        self.state.lock().captured.clone()
    }

    /// Return the login PATH, spawning the shell if nobody has yet
    ///
    /// `shell` defaults to `$SHELL`, then `/bin/zsh`.
    pub async fn capture_once(&self, shell: Option<&str>, timeout: Duration) -> Option<Vec<String>> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(captured) = &state.captured {
                return Some(captured.clone());
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);

            if !state.capturing {
                state.capturing = true;
                let shell = shell.map(str::to_string).unwrap_or_else(default_shell);
                let cache = self.clone();
                tokio::spawn(async move {
                    let result = capture_login_path(&shell, timeout).await;
                    cache.finish(result);
                });
            }
            rx
        };

        rx.await.unwrap_or(None)
    }

    fn finish(&self, result: Option<Vec<String>>) {
        let waiters = {
            let mut state = self.state.lock();
            if result.is_some() {
                state.captured = result.clone();
            }
            state.capturing = false;
            std::mem::take(&mut state.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// `$SHELL` when set, otherwise `/bin/zsh`
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

async fn capture_login_path(shell: &str, timeout: Duration) -> Option<Vec<String>> {
    let child = Command::new(shell)
        .args(["-l", "-c", "echo $PATH"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            warn!(shell, error = %e, "Failed to spawn login shell");
            return None;
        }
    };

    // Dropping the wait future on timeout kills the shell
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(shell, error = %e, "Login shell did not complete");
            return None;
        }
        Err(_) => {
            warn!(shell, ?timeout, "Login shell timed out while reporting PATH");
            return None;
        }
    };

    if !output.status.success() {
        warn!(shell, status = ?output.status.code(), "Login shell exited with failure");
        return None;
    }

    let parsed = parse_path_output(&String::from_utf8_lossy(&output.stdout));
    debug!(shell, entries = parsed.as_ref().map_or(0, Vec::len), "Captured login shell PATH");
    parsed
}

/// Split the shell's output into PATH entries
///
/// Profile scripts sometimes print banners, so only the last non-empty line
/// is used. Returns `None` when nothing usable was printed.
pub fn parse_path_output(output: &str) -> Option<Vec<String>> {
    let line = output.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    let entries: Vec<String> = line
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();
    (!entries.is_empty()).then_some(entries)
}
