mod client;
mod heuristics;
mod transitions;

pub use client::{AgentServing, AgjClient, AgjError, CAPTURE_LINES};
pub use heuristics::AgentType;
pub use transitions::{PermissionTransition, PermissionTransitionDetector, TransitionResult};

use serde::{Deserialize, Serialize};

/// An agent process as reported by `agj list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProcess {
    pub pid: i64,
    pub name: String,
    pub cmdline: Vec<String>,
    /// Parent pids, nearest first
    pub ancestry: Vec<i64>,
}

/// Terminal session hosting an agent, when agj could map one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSession {
    pub session_id: String,
    pub tab_id: String,
    pub window_id: String,
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// One entry of an `agj list --json` snapshot
///
/// `id` follows agj's listing order and may change between polls; use
/// [`AgentInstance::session_key`] to follow the same agent over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: i64,
    pub process: AgentProcess,
    #[serde(default)]
    pub session: Option<AgentSession>,
    /// `Some(true)` while the agent is blocked on a permission prompt.
    /// `None` means agj could not tell.
    #[serde(default)]
    pub permission_prompt: Option<bool>,
    #[serde(default)]
    pub permission_reason: Option<String>,
    #[serde(default)]
    pub permission_output: Option<String>,
}

impl AgentInstance {
    /// Identity that survives re-numbering between polls
    ///
    /// The session id when there is one, otherwise the process id.
    pub fn session_key(&self) -> String {
        match &self.session {
            Some(session) if !session.session_id.is_empty() => session.session_id.clone(),
            _ => self.process.pid.to_string(),
        }
    }

    pub fn needs_attention(&self) -> bool {
        self.permission_prompt == Some(true)
    }

    pub fn permission_status_text(&self) -> &'static str {
        match self.permission_prompt {
            Some(true) => "Permission required",
            Some(false) => "No prompt",
            None => "Unknown",
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }
}

/// Result of the most recent poll
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// agj could not be located or run
    AgjMissing(String),
    /// The terminal's automation API is not reachable
    BackendUnavailable,
    Error(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Text to show the user, `None` when healthy
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Healthy => None,
            Self::AgjMissing(detail) | Self::Error(detail) => Some(detail.clone()),
            Self::BackendUnavailable => Some("iTerm2 API unavailable.".to_string()),
        }
    }
}
