use crate::tools::commands_tool::CommandEntry;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Command,
    Root,
    Subfolder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickPrompt {
    pub kind: PromptKind,
    pub placeholder: String,
    pub options: Vec<String>,
}

/// Single-choice selection. `None` means the user dismissed the prompt.
#[async_trait]
pub trait Picker: Send + Sync {
    async fn pick(&self, prompt: PickPrompt) -> Option<usize>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum PickOutcome {
    Target(PathBuf),
    NoWorkspace,
    Cancelled,
}

fn root_label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Chooses the command from `entries`, prompting when there are several.
pub async fn pick_command<'a>(entries: &'a [CommandEntry], picker: &dyn Picker) -> Option<&'a CommandEntry> {
    let prompt = PickPrompt {
        kind: PromptKind::Command,
        placeholder: "Select a command to run".to_string(),
        options: entries.iter().map(|e| e.label.clone()).collect(),
    };
    let idx = picker.pick(prompt).await?;
    entries.get(idx)
}

/// Resolves the directory a command runs in: the single root, or the
/// root the user picks, then the entry's subfolder if it declares any.
/// Dismissing a prompt cancels the whole dispatch.
pub async fn pick_target_dir(roots: &[PathBuf], entry: &CommandEntry, picker: &dyn Picker) -> PickOutcome {
    let root = match roots {
        [] => return PickOutcome::NoWorkspace,
        [only] => only.clone(),
        _ => {
            let prompt = PickPrompt {
                kind: PromptKind::Root,
                placeholder: "Select a folder to run the command".to_string(),
                options: roots.iter().map(|r| root_label(r)).collect(),
            };
            match picker.pick(prompt).await.and_then(|idx| roots.get(idx)) {
                Some(root) => root.clone(),
                None => {
                    debug!("Root selection dismissed");
                    return PickOutcome::Cancelled;
                }
            }
        }
    };

    if entry.target_subfolders.is_empty() {
        return PickOutcome::Target(root);
    }

    let prompt = PickPrompt {
        kind: PromptKind::Subfolder,
        placeholder: "Select a subfolder to run the command".to_string(),
        options: entry.target_subfolders.clone(),
    };
    match picker.pick(prompt).await.and_then(|idx| entry.target_subfolders.get(idx)) {
        Some(subfolder) => PickOutcome::Target(root.join(subfolder)),
        None => {
            debug!("Subfolder selection dismissed");
            PickOutcome::Cancelled
        }
    }
}

/// Answers prompts from choices the host sent with the request. The first
/// prompt without an answer is kept so the host can ask the user and retry.
#[derive(Debug, Default)]
pub struct PresetPicker {
    command: Option<String>,
    root: Option<String>,
    subfolder: Option<String>,
    pending: StdMutex<Option<PickPrompt>>,
}

impl PresetPicker {
    pub fn new(command: Option<String>, root: Option<String>, subfolder: Option<String>) -> Self {
        Self {
            command,
            root,
            subfolder,
            pending: StdMutex::new(None),
        }
    }

    pub fn pending_prompt(&self) -> Option<PickPrompt> {
        match self.pending.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Picker for PresetPicker {
    async fn pick(&self, prompt: PickPrompt) -> Option<usize> {
        let answer = match prompt.kind {
            PromptKind::Command => self.command.as_deref(),
            PromptKind::Root => self.root.as_deref(),
            PromptKind::Subfolder => self.subfolder.as_deref(),
        };
        let Some(answer) = answer else {
            if let Ok(mut pending) = self.pending.lock() {
                pending.get_or_insert(prompt);
            }
            return None;
        };
        // Roots may be answered with their label or their full path.
        prompt.options.iter().position(|o| o == answer).or_else(|| {
            (prompt.kind == PromptKind::Root)
                .then(|| Path::new(answer).file_name().map(|n| n.to_string_lossy().into_owned()))
                .flatten()
                .and_then(|label| prompt.options.iter().position(|o| *o == label))
        })
    }
}
