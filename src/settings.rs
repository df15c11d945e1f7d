use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Supported polling intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum RefreshInterval {
    #[default]
    ThreeSeconds,
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
}

impl RefreshInterval {
    pub const ALL: [RefreshInterval; 5] = [
        Self::ThreeSeconds,
        Self::OneMinute,
        Self::TwoMinutes,
        Self::FiveMinutes,
        Self::FifteenMinutes,
    ];

    pub fn seconds(self) -> u64 {
        match self {
            Self::ThreeSeconds => 3,
            Self::OneMinute => 60,
            Self::TwoMinutes => 120,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    pub fn from_secs(secs: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.seconds() == secs)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::ThreeSeconds => "Every 3 seconds",
            Self::OneMinute => "Every 1 minute",
            Self::TwoMinutes => "Every 2 minutes",
            Self::FiveMinutes => "Every 5 minutes",
            Self::FifteenMinutes => "Every 15 minutes",
        }
    }
}

/// Unknown values fall back to the default interval
impl From<u64> for RefreshInterval {
    fn from(secs: u64) -> Self {
        Self::from_secs(secs).unwrap_or_default()
    }
}

impl From<RefreshInterval> for u64 {
    fn from(interval: RefreshInterval) -> Self {
        interval.seconds()
    }
}

/// Sound played with a permission notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotificationSound {
    #[default]
    #[serde(rename = "default")]
    Default,
    Glass,
    Ping,
    Pop,
    #[serde(rename = "none")]
    Silent,
}

impl NotificationSound {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Glass => "Glass",
            Self::Ping => "Ping",
            Self::Pop => "Pop",
            Self::Silent => "None",
        }
    }
}

fn parse_interval(s: &str) -> Result<RefreshInterval, String> {
    let secs: u64 = s.parse().map_err(|_| format!("not a number of seconds: {}", s))?;
    RefreshInterval::from_secs(secs).ok_or_else(|| {
        let allowed: Vec<String> = RefreshInterval::ALL
            .iter()
            .map(|i| i.seconds().to_string())
            .collect();
        format!("unsupported interval {}s (allowed: {})", secs, allowed.join(", "))
    })
}

/// Command line arguments
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Watch coding agents and flag new permission prompts")]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Refresh interval in seconds (3, 60, 120, 300 or 900)
    #[arg(short = 'i', long, value_parser = parse_interval)]
    pub interval: Option<RefreshInterval>,

    /// agj command name or absolute path
    #[arg(long)]
    pub agj: Option<String>,

    /// Refresh once, print the snapshot as JSON and exit
    #[arg(long)]
    pub once: bool,
}

impl Config {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Persisted settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub refresh_interval: RefreshInterval,

    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,

    #[serde(default)]
    pub notification_sound: NotificationSound,

    /// agj command or path; empty means search PATH
    #[serde(default)]
    pub agj_command: String,
}

fn default_notifications_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval: RefreshInterval::default(),
            notifications_enabled: default_notifications_enabled(),
            notification_sound: NotificationSound::default(),
            agj_command: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                anyhow::bail!("Config file not found: {:?}", p);
            }
            return Self::load_from(p);
        }

        for path in Self::default_paths().iter().flatten() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn default_paths() -> [Option<PathBuf>; 2] {
        [
            dirs::config_dir().map(|p| p.join("agent-tap/config.toml")),
            dirs::home_dir().map(|p| p.join(".agent-tap.toml")),
        ]
    }

    /// Write settings as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(interval) = cli.interval {
            self.refresh_interval = interval;
        }
        if let Some(agj) = &cli.agj {
            self.agj_command = agj.clone();
        }
    }

    /// Override for binary resolution, `None` when blank
    pub fn command_override(&self) -> Option<String> {
        let trimmed = self.agj_command.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_interval_round_trip_through_seconds() {
        for interval in RefreshInterval::ALL {
            assert_eq!(RefreshInterval::from(u64::from(interval)), interval);
        }
        assert_eq!(RefreshInterval::from(7u64), RefreshInterval::ThreeSeconds);
        assert_eq!(RefreshInterval::FifteenMinutes.duration(), Duration::from_secs(900));
    }

    #[test]
    fn test_parse_interval_rejects_unsupported() {
        assert_eq!(parse_interval("120"), Ok(RefreshInterval::TwoMinutes));
        assert!(parse_interval("10").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.notifications_enabled);
        assert_eq!(settings.command_override(), None);
    }

    #[test]
    fn test_parse_full_file() {
        let settings: Settings = toml::from_str(
            r#"
            refresh_interval = 300
            notifications_enabled = false
            notification_sound = "Glass"
            agj_command = "  /opt/agj/bin/agj "
            "#,
        )
        .unwrap();

        assert_eq!(settings.refresh_interval, RefreshInterval::FiveMinutes);
        assert!(!settings.notifications_enabled);
        assert_eq!(settings.notification_sound, NotificationSound::Glass);
        assert_eq!(settings.command_override().as_deref(), Some("/opt/agj/bin/agj"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let settings = Settings {
            refresh_interval: RefreshInterval::OneMinute,
            notification_sound: NotificationSound::Silent,
            ..Settings::default()
        };

        settings.save(&path).unwrap();
        let loaded = Settings::load(Some(&path)).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("typo.toml");

        let err = Settings::load(Some(&path)).unwrap_err();

        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_cli_takes_precedence() {
        let mut settings = Settings::default();
        let cli = Config {
            interval: Some(RefreshInterval::FifteenMinutes),
            agj: Some("agj-dev".to_string()),
            ..Config::default()
        };

        settings.merge_cli(&cli);

        assert_eq!(settings.refresh_interval, RefreshInterval::FifteenMinutes);
        assert_eq!(settings.command_override().as_deref(), Some("agj-dev"));
    }
}
