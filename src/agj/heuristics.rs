use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::AgentInstance;

/// Known coding agents, inferred from the process name and command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentType {
    Codex,
    Claude,
    Cursor,
    Aider,
    Continue,
    /// Anything else, carrying the capitalized process name
    Other(String),
}

/// Compiled patterns, checked in priority order
static RE_CODEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)codex").unwrap());
static RE_CLAUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)claude").unwrap());
static RE_CURSOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cursor").unwrap());
static RE_AIDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)aider").unwrap());
static RE_CONTINUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)continue").unwrap());

impl AgentType {
    /// Classify an agent from its process name and command line
    pub fn infer(name: &str, cmdline: &[String]) -> Self {
        let haystack = format!("{} {}", name, cmdline.join(" "));

        if RE_CODEX.is_match(&haystack) {
            return Self::Codex;
        }
        if RE_CLAUDE.is_match(&haystack) {
            return Self::Claude;
        }
        if RE_CURSOR.is_match(&haystack) {
            return Self::Cursor;
        }
        if RE_AIDER.is_match(&haystack) {
            return Self::Aider;
        }
        if RE_CONTINUE.is_match(&haystack) {
            return Self::Continue;
        }

        Self::Other(capitalize_words(name))
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Codex => "Codex",
            Self::Claude => "Claude",
            Self::Cursor => "Cursor",
            Self::Aider => "Aider",
            Self::Continue => "Continue",
            Self::Other(name) => name,
        }
    }
}

fn capitalize_words(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

impl AgentInstance {
    pub fn agent_type(&self) -> AgentType {
        AgentType::infer(&self.process.name, &self.process.cmdline)
    }

    pub fn agent_type_name(&self) -> String {
        self.agent_type().display_name().to_string()
    }

    /// Agent type, followed by the terminal title when there is one
    pub fn agent_label(&self) -> String {
        let type_name = self.agent_type_name();
        match self.session.as_ref().and_then(|s| s.title.as_deref()) {
            Some(title) if !title.is_empty() => format!("{} · {}", type_name, title),
            _ => type_name,
        }
    }

    /// Working directory of the hosting session
    pub fn display_path(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.path.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// [`display_path`](Self::display_path) with the home directory shown as `~`
    pub fn short_path(&self) -> Option<String> {
        let path = self.display_path()?;
        let home = dirs::home_dir();
        Some(shorten_home(path, home.as_deref().and_then(|h| h.to_str())))
    }
}

fn shorten_home(path: &str, home: Option<&str>) -> String {
    let rest = home
        .filter(|home| !home.is_empty())
        .and_then(|home| path.strip_prefix(home));
    match rest {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("~{}", rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agj::fixtures::instance;
    use crate::agj::AgentSession;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_known_agents() {
        assert_eq!(AgentType::infer("codex", &[]), AgentType::Codex);
        assert_eq!(
            AgentType::infer("node", &args(&["node", "/opt/homebrew/bin/Claude"])),
            AgentType::Claude
        );
        assert_eq!(AgentType::infer("Cursor Agent", &[]), AgentType::Cursor);
        assert_eq!(
            AgentType::infer("python3", &args(&["python3", "-m", "aider"])),
            AgentType::Aider
        );
    }

    #[test]
    fn test_codex_wins_over_claude() {
        let cmdline = args(&["codex", "--model", "claude-like"]);
        assert_eq!(AgentType::infer("node", &cmdline), AgentType::Codex);
    }

    #[test]
    fn test_unknown_agent_is_capitalized() {
        let agent = AgentType::infer("gOOSE", &args(&["goose"]));
        assert_eq!(agent, AgentType::Other("Goose".to_string()));
        assert_eq!(agent.display_name(), "Goose");
    }

    #[test]
    fn test_agent_label_includes_title() {
        let mut inst = instance(0, 10, Some("s1"), None);
        assert_eq!(inst.agent_label(), "Codex");

        inst.session = Some(AgentSession {
            title: Some("backend".to_string()),
            ..inst.session.clone().unwrap()
        });
        assert_eq!(inst.agent_label(), "Codex · backend");
    }

    #[test]
    fn test_paths() {
        let mut inst = instance(0, 10, Some("s1"), None);
        assert_eq!(inst.display_path(), None);

        if let Some(session) = inst.session.as_mut() {
            session.path = Some("/Users/dev/src/app".to_string());
        }
        assert_eq!(inst.display_path(), Some("/Users/dev/src/app"));
        assert_eq!(shorten_home("/Users/dev/src/app", Some("/Users/dev")), "~/src/app");
        assert_eq!(shorten_home("/srv/app", None), "/srv/app");
    }

    #[test]
    fn test_shorten_home_only_replaces_whole_prefix() {
        assert_eq!(shorten_home("/Users/dev", Some("/Users/dev")), "~");
        assert_eq!(shorten_home("/Users/dev2/app", Some("/Users/dev")), "/Users/dev2/app");
        assert_eq!(shorten_home("/tmp/Users/dev/app", Some("/Users/dev")), "/tmp/Users/dev/app");
        assert_eq!(shorten_home("/Users/dev/app", Some("")), "/Users/dev/app");
    }
}
