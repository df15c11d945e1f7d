use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Canonical file name of the agj tool
pub const AGJ_BINARY_NAME: &str = "agj";

/// Environment variable that pins the absolute location of agj
pub const AGJ_PATH_ENV: &str = "AGJ_CLI_PATH";

/// Copy of the effective PATH exported to the child for introspection
pub const PATH_INTROSPECTION_ENV: &str = "__AGENTTAP_PATH__";

/// Used only when neither the login shell nor the environment has a PATH
pub const FALLBACK_PATH: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
];

/// Build the ordered, de-duplicated list of directories to search
///
/// Login shell entries come first, then the process `PATH`. A leading `~`
/// is expanded to `home` when one is known.
pub fn effective_path(
    env: &HashMap<String, String>,
    login_path: Option<&[String]>,
    home: Option<&Path>,
) -> Vec<String> {
    let mut components: Vec<String> = Vec::new();

    if let Some(login) = login_path {
        components.extend(login.iter().filter(|dir| !dir.is_empty()).cloned());
    }
    if let Some(env_path) = env.get("PATH") {
        components.extend(
            env_path
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(str::to_string),
        );
    }
    if components.is_empty() {
        components = FALLBACK_PATH.iter().map(|p| p.to_string()).collect();
    }

    let mut unique: Vec<String> = Vec::with_capacity(components.len());
    for dir in components {
        let dir = expand_home(&dir, home);
        if dir.is_empty() || unique.contains(&dir) {
            continue;
        }
        unique.push(dir);
    }
    unique
}

fn expand_home(dir: &str, home: Option<&Path>) -> String {
    match (dir.strip_prefix('~'), home) {
        (Some(rest), Some(home)) => format!("{}{}", home.display(), rest),
        _ => dir.to_string(),
    }
}

/// Current process environment, skipping pairs that are not valid UTF-8
///
/// Skipped variables are still inherited by child processes; they only
/// take no part in PATH handling.
pub fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Copy of `env` with `PATH` replaced by the effective search path
pub fn enriched_environment(
    env: &HashMap<String, String>,
    login_path: Option<&[String]>,
    home: Option<&Path>,
) -> HashMap<String, String> {
    let joined = effective_path(env, login_path, home).join(":");
    let mut result = env.clone();
    result.insert("PATH".to_string(), joined.clone());
    result.insert(PATH_INTROSPECTION_ENV.to_string(), joined);
    result
}

/// Locate the agj executable
///
/// Resolution order:
/// 1. `command_override` (trimmed). Anything containing a space is rejected;
///    an absolute override must exist and is never searched for.
/// 2. `AGJ_CLI_PATH` when it is absolute and exists.
/// 3. The effective PATH, looking for the override name or `agj`.
pub fn resolve_binary(
    command_override: Option<&str>,
    env: &HashMap<String, String>,
    login_path: Option<&[String]>,
) -> Option<PathBuf> {
    resolve_binary_in(command_override, env, login_path, dirs::home_dir().as_deref())
}

pub(crate) fn resolve_binary_in(
    command_override: Option<&str>,
    env: &HashMap<String, String>,
    login_path: Option<&[String]>,
    home: Option<&Path>,
) -> Option<PathBuf> {
    let name = command_override.map(str::trim).filter(|s| !s.is_empty());

    if let Some(name) = name {
        if name.contains(' ') {
            return None;
        }
        if name.starts_with('/') {
            let path = PathBuf::from(name);
            return path.exists().then_some(path);
        }
    }

    if let Some(pinned) = env.get(AGJ_PATH_ENV).filter(|p| p.starts_with('/')) {
        let path = PathBuf::from(pinned);
        return path.exists().then_some(path);
    }

    let file_name = name.unwrap_or(AGJ_BINARY_NAME);
    effective_path(env, login_path, home)
        .iter()
        .map(|dir| Path::new(dir).join(file_name))
        .find(|candidate| is_executable_file(candidate))
}

/// Regular file with at least one execute bit set
pub(crate) fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    metadata.is_file() && has_execute_bit(&metadata)
}

#[cfg(unix)]
fn has_execute_bit(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_execute_bit(_metadata: &std::fs::Metadata) -> bool {
    true
}
