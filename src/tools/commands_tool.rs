use crate::error::AppError;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Commands shown when the user has no command file yet.
const BUILTIN_COMMANDS: &[&str] = &[
    "flutter clean && flutter pub get",
    "rm pubspec.lock && flutter clean && flutter pub get",
    "cd ios && rm Podfile.lock && pod install --repo-update",
    "very_good test --test-randomize-ordering-seed=random",
];

const SETTINGS_SKELETON: &str = "{\n  \"list\": [],\n  \"config\": []\n}\n";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandEntry {
    pub command: String,
    pub label: String,
    pub own_terminal: bool,
    pub target_subfolders: Vec<String>,
}

impl CommandEntry {
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            label: command.clone(),
            command,
            own_terminal: false,
            target_subfolders: Vec::new(),
        }
    }
}

/// Builds the command list from the `{ list, config }` settings document.
/// Entries with wrong field types are dropped without error.
pub fn parse_command_entries(settings: &Value) -> Vec<CommandEntry> {
    let folder_configs = settings.get("config").and_then(Value::as_array);
    let Some(list) = settings.get("list").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for item in list {
        let Some(obj) = item.as_object() else { continue };

        let command = match obj.get("command") {
            Some(Value::String(c)) if !c.is_empty() => c.clone(),
            _ => continue,
        };
        let label = match obj.get("label") {
            None | Some(Value::Null) => None,
            Some(Value::String(l)) if l.is_empty() => None,
            Some(Value::String(l)) => Some(l.clone()),
            Some(_) => continue,
        };
        let own_terminal = match obj.get("ownTerminal") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => continue,
        };

        let mut entry = CommandEntry::new(command);
        if let Some(label) = label {
            entry.label = label;
        }
        entry.own_terminal = own_terminal;

        let folders = folder_configs
            .and_then(|configs| {
                configs
                    .iter()
                    .find(|c| c.get("label").and_then(Value::as_str) == Some(entry.label.as_str()))
            })
            .and_then(|c| c.get("folders"))
            .and_then(Value::as_array);
        if let Some(folders) = folders {
            entry.target_subfolders = folders.iter().filter_map(Value::as_str).map(String::from).collect();
        }

        entries.push(entry);
    }
    entries
}

pub fn builtin_command_entries() -> Vec<CommandEntry> {
    BUILTIN_COMMANDS.iter().map(|c| CommandEntry::new(*c)).collect()
}

/// The loaded command list. Readers get a snapshot; a reload swaps the
/// whole list.
#[derive(Debug)]
pub struct CommandRegistry {
    commands_file: PathBuf,
    entries: StdRwLock<Arc<Vec<CommandEntry>>>,
}

impl CommandRegistry {
    pub fn new(commands_file: PathBuf) -> Self {
        let entries = load_entries(&commands_file);
        Self {
            commands_file,
            entries: StdRwLock::new(Arc::new(entries)),
        }
    }

    pub fn commands_file(&self) -> &Path {
        &self.commands_file
    }

    pub fn snapshot(&self) -> Arc<Vec<CommandEntry>> {
        match self.entries.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn find(&self, label: &str) -> Result<CommandEntry, AppError> {
        let entries = self.snapshot();
        entries
            .iter()
            .find(|e| e.label == label)
            .or_else(|| entries.iter().find(|e| e.command == label))
            .cloned()
            .ok_or_else(|| AppError::CommandNotFound(label.to_string()))
    }

    #[instrument(skip(self), fields(file = %self.commands_file.display()))]
    pub fn reload(&self) {
        let entries = Arc::new(load_entries(&self.commands_file));
        info!(count = entries.len(), "Command list reloaded");
        match self.entries.write() {
            Ok(mut guard) => *guard = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
    }

    /// Path of the user command file, created with an empty skeleton when
    /// missing so the host can open it for editing.
    pub async fn ensure_settings_file(&self) -> Result<PathBuf, AppError> {
        if !tokio::fs::try_exists(&self.commands_file).await? {
            if let Some(parent) = self.commands_file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.commands_file, SETTINGS_SKELETON).await?;
            info!(file = %self.commands_file.display(), "Created command settings file");
        }
        Ok(self.commands_file.clone())
    }
}

fn load_entries(commands_file: &Path) -> Vec<CommandEntry> {
    let content = match std::fs::read_to_string(commands_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(file = %commands_file.display(), "No command settings file, using built-in commands");
            return builtin_command_entries();
        }
        Err(e) => {
            warn!(file = %commands_file.display(), error = %e, "Could not read command settings");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(settings) => parse_command_entries(&settings),
        Err(e) => {
            warn!(file = %commands_file.display(), error = %e, "Command settings are not valid JSON");
            Vec::new()
        }
    }
}

/// Watches the directory holding the command file and reloads the
/// registry once changes settle. The returned watcher must be kept alive.
pub fn spawn_settings_watcher(registry: Arc<CommandRegistry>) -> Result<RecommendedWatcher, AppError> {
    let watched_file = registry.commands_file().to_path_buf();
    let (notify_tx, mut notify_rx) = mpsc::channel(1);
    let file_for_filter = watched_file.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if event.paths.iter().any(|p| p.file_name() == file_for_filter.file_name()) {
                let _ = notify_tx.try_send(());
            }
        }
    })
    .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to create settings watcher: {}", e)))?;

    let watch_dir = watched_file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    if watch_dir.exists() {
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to watch {}: {}", watch_dir.display(), e)))?;
    } else {
        warn!(dir = %watch_dir.display(), "Settings directory does not exist, changes will not be picked up");
    }

    tokio::spawn(async move {
        let mut pending = false;
        loop {
            if pending {
                tokio::select! {
                    Some(()) = notify_rx.recv() => {}
                    () = tokio::time::sleep(RELOAD_DEBOUNCE) => {
                        registry.reload();
                        pending = false;
                    }
                }
            } else if notify_rx.recv().await.is_some() {
                pending = true;
            } else {
                break;
            }
        }
    });

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_defaults_to_command_text() {
        let entries = parse_command_entries(&json!({ "list": [{ "command": "flutter clean" }] }));
        assert_eq!(entries, vec![CommandEntry::new("flutter clean")]);
        assert_eq!(entries[0].label, "flutter clean");
    }

    #[test]
    fn malformed_entries_are_dropped_in_order() {
        let settings = json!({
            "list": [
                { "command": "a" },
                { "command": 42 },
                { "command": "" },
                { "command": "b", "label": 7 },
                { "command": "c", "ownTerminal": "yes" },
                "not an object",
                { "command": "d", "label": "Dee", "ownTerminal": true }
            ]
        });
        let entries = parse_command_entries(&settings);
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "Dee"]);
        assert!(entries[1].own_terminal);
        assert_eq!(entries[1].command, "d");
    }

    #[test]
    fn folders_attach_by_effective_label() {
        let settings = json!({
            "list": [
                { "command": "flutter test", "label": "Test" },
                { "command": "flutter analyze" }
            ],
            "config": [
                { "label": "Test", "folders": ["packages/a", 3, "packages/b"] },
                { "label": "flutter analyze", "folders": ["apps/x"] },
                { "label": "Unused", "folders": ["nowhere"] }
            ]
        });
        let entries = parse_command_entries(&settings);
        assert_eq!(entries[0].target_subfolders, vec!["packages/a", "packages/b"]);
        assert_eq!(entries[1].target_subfolders, vec!["apps/x"]);
    }

    #[test]
    fn non_array_folders_are_ignored() {
        let settings = json!({
            "list": [{ "command": "x" }],
            "config": [{ "label": "x", "folders": "packages/a" }]
        });
        assert!(parse_command_entries(&settings)[0].target_subfolders.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_builtin_commands() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CommandRegistry::new(dir.path().join("commands.json"));
        assert_eq!(*registry.snapshot(), builtin_command_entries());
    }

    #[test]
    fn reload_replaces_the_whole_list() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("commands.json");
        std::fs::write(&file, r#"{ "list": [{ "command": "one" }] }"#).unwrap();
        let registry = CommandRegistry::new(file.clone());
        let before = registry.snapshot();

        std::fs::write(&file, r#"{ "list": [{ "command": "two" }, { "command": "three" }] }"#).unwrap();
        registry.reload();

        assert_eq!(before.len(), 1);
        let labels: Vec<String> = registry.snapshot().iter().map(|e| e.label.clone()).collect();
        assert_eq!(labels, vec!["two", "three"]);
    }

    #[test]
    fn find_by_label_or_command() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("commands.json");
        std::fs::write(&file, r#"{ "list": [{ "command": "flutter clean", "label": "Clean" }] }"#).unwrap();
        let registry = CommandRegistry::new(file);

        assert_eq!(registry.find("Clean").unwrap().command, "flutter clean");
        assert_eq!(registry.find("flutter clean").unwrap().label, "Clean");
        assert!(matches!(registry.find("Build"), Err(AppError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn settings_file_is_created_with_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CommandRegistry::new(dir.path().join("nested").join("commands.json"));

        let path = registry.ensure_settings_file().await.unwrap();

        let settings: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parse_command_entries(&settings).is_empty());
    }
}
