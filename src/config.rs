use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_APP_FOLDER_NAME: &str = "ailos_app";
pub const DEFAULT_DEPENDENCY_URL_PREFIX: &str = "      url: git@ssh.dev.azure.com:v3/Ailos/Mobile/";
pub const DEFAULT_TERMINAL_NAME: &str = "Utils Well";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub workspace_roots: Vec<PathBuf>,
    pub commands_file: PathBuf,
    pub app_folder_name: String,
    pub manifest_file: String,
    pub lock_file: String,
    pub dependency_url_prefix: String,
    pub pub_cache_dir: PathBuf,
    pub source_extension: String,
    pub terminal_name: String,
    pub default_shell: Option<String>,
    pub ui_bundle_dir: PathBuf,
    pub log_level: String,
    pub audit_log_file: PathBuf,
    pub audit_log_max_size_bytes: u64,
    pub skipped_roots: Vec<SkippedRoot>,
}

fn expand_tilde(path_str: &str) -> Result<PathBuf, anyhow::Error> {
    Ok(PathBuf::from(shellexpand::tilde(path_str).as_ref()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A `WORKSPACE_ROOTS` entry that was left out, kept so it can be reported
/// once logging is up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRoot {
    pub entry: String,
    pub reason: String,
}

/// Parses a comma-separated root list. Entries that do not exist are
/// dropped rather than failing start-up.
fn parse_workspace_roots(roots_str: &str) -> (Vec<PathBuf>, Vec<SkippedRoot>) {
    let mut roots: Vec<PathBuf> = Vec::new();
    let mut skipped = Vec::new();
    for entry in roots_str.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match expand_tilde(entry).and_then(|p| dunce::canonicalize(&p).map_err(anyhow::Error::from)) {
            Ok(root) if root.is_dir() => {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
            Ok(root) => skipped.push(SkippedRoot {
                entry: root.display().to_string(),
                reason: "not a directory".to_string(),
            }),
            Err(e) => skipped.push(SkippedRoot {
                entry: entry.to_string(),
                reason: e.to_string(),
            }),
        }
    }
    (roots, skipped)
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let (workspace_roots, skipped_roots) = match std::env::var("WORKSPACE_ROOTS") {
            Ok(roots_str) => parse_workspace_roots(&roots_str),
            Err(_) => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                (vec![dunce::canonicalize(&cwd).unwrap_or(cwd)], Vec::new())
            }
        };

        let commands_file = expand_tilde(&env_or("COMMANDS_FILE", "~/.config/utils-well/commands.json"))?;

        let pub_cache_dir = expand_tilde(&env_or("PUB_CACHE_DIR", "~/.pub-cache/git"))?;

        let ui_bundle_dir = expand_tilde(&env_or("UI_BUNDLE_DIR", "react_vite_ui/build"))?;

        let default_shell = std::env::var("DEFAULT_SHELL").ok().filter(|s| !s.is_empty());

        let log_level = env_or("LOG_LEVEL", "info");

        let log_dir_base = match std::env::var("MCP_LOG_DIR") {
            Ok(s) => expand_tilde(&s)?,
            Err(_) => workspace_roots
                .first()
                .cloned()
                .unwrap_or_else(std::env::temp_dir)
                .join(".utils-well-logs"),
        };

        let audit_log_max_size_bytes = env_or("AUDIT_LOG_MAX_SIZE_MB", "10")
            .parse::<u64>()
            .context("Invalid AUDIT_LOG_MAX_SIZE_MB")?
            * 1024
            * 1024;

        Ok(Config {
            workspace_roots,
            commands_file,
            app_folder_name: env_or("APP_FOLDER_NAME", DEFAULT_APP_FOLDER_NAME),
            manifest_file: env_or("MANIFEST_FILE", "pubspec.yaml"),
            lock_file: env_or("LOCK_FILE", "pubspec.lock"),
            dependency_url_prefix: env_or("DEPENDENCY_URL_PREFIX", DEFAULT_DEPENDENCY_URL_PREFIX),
            pub_cache_dir,
            source_extension: env_or("SOURCE_EXTENSION", ".dart"),
            terminal_name: env_or("TERMINAL_NAME", DEFAULT_TERMINAL_NAME),
            default_shell,
            ui_bundle_dir,
            log_level,
            audit_log_file: log_dir_base.join("tool_calls.log"),
            audit_log_max_size_bytes,
            skipped_roots,
        })
    }

    /// Configuration rooted in `dir`, used by tests that build their own
    /// workspace and cache trees.
    #[cfg(test)]
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Config {
            workspace_roots: vec![dir.join(DEFAULT_APP_FOLDER_NAME)],
            commands_file: dir.join("commands.json"),
            app_folder_name: DEFAULT_APP_FOLDER_NAME.to_string(),
            manifest_file: "pubspec.yaml".to_string(),
            lock_file: "pubspec.lock".to_string(),
            dependency_url_prefix: DEFAULT_DEPENDENCY_URL_PREFIX.to_string(),
            pub_cache_dir: dir.join("pub-cache").join("git"),
            source_extension: ".dart".to_string(),
            terminal_name: DEFAULT_TERMINAL_NAME.to_string(),
            default_shell: None,
            ui_bundle_dir: dir.join("react_vite_ui").join("build"),
            log_level: "debug".to_string(),
            audit_log_file: dir.join("logs").join("tool_calls.log"),
            audit_log_max_size_bytes: 1024,
            skipped_roots: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_roots_skip_missing_and_duplicate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::create_dir(&a).unwrap();
        let missing = dir.path().join("missing");

        let roots_str = format!("{}, {} ,{},", a.display(), missing.display(), a.display());
        let (roots, skipped) = parse_workspace_roots(&roots_str);

        assert_eq!(roots, vec![dunce::canonicalize(&a).unwrap()]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].entry, missing.display().to_string());
    }

    #[test]
    fn workspace_roots_ignore_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        let (roots, skipped) = parse_workspace_roots(&file.display().to_string());
        assert!(roots.is_empty());
        assert_eq!(skipped[0].reason, "not a directory");
    }
}
