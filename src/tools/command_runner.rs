use crate::config::Config;
use crate::error::AppError;
use crate::tools::commands_tool::{CommandEntry, CommandRegistry};
use crate::tools::terminal_tool::{DispatchResult, TerminalDispatcher};
use crate::tools::workspace_picker::{pick_command, pick_target_dir, PickOutcome, PickPrompt, PresetPicker};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

const NO_WORKSPACE_MESSAGE: &str = "No workspace or project folder open.";

#[derive(Debug, Default, Deserialize)]
pub struct RunCommandParams {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub subfolder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CopyCommandParams {
    pub command: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunCommandResult {
    Dispatched(DispatchResult),
    SelectionRequired { prompt: PickPrompt },
    NoWorkspace { message: String },
    Cancelled,
}

#[derive(Debug, Serialize)]
pub struct CopyCommandResult {
    pub command: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsFileResult {
    pub path: PathBuf,
}

/// The "command shortcuts" surface: lists the configured commands and runs
/// one in the chosen folder.
#[derive(Debug)]
pub struct CommandRunner {
    config: Arc<Config>,
    registry: Arc<CommandRegistry>,
    dispatcher: TerminalDispatcher,
}

impl CommandRunner {
    pub fn new(config: Arc<Config>, registry: Arc<CommandRegistry>, dispatcher: TerminalDispatcher) -> Self {
        Self {
            config,
            registry,
            dispatcher,
        }
    }

    pub async fn list_commands(&self) -> Result<Vec<CommandEntry>, AppError> {
        Ok(self.registry.snapshot().as_ref().clone())
    }

    #[instrument(skip(self, params), fields(command = ?params.command))]
    pub async fn run_command(&self, params: &RunCommandParams) -> Result<RunCommandResult, AppError> {
        let picker = PresetPicker::new(params.command.clone(), params.root.clone(), params.subfolder.clone());

        let entries = self.registry.snapshot();
        let entry = match &params.command {
            Some(label) => self.registry.find(label)?,
            None => match pick_command(&entries, &picker).await {
                Some(entry) => entry.clone(),
                None => return Ok(Self::unanswered(&picker)),
            },
        };

        match pick_target_dir(&self.config.workspace_roots, &entry, &picker).await {
            PickOutcome::NoWorkspace => {
                info!("{}", NO_WORKSPACE_MESSAGE);
                Ok(RunCommandResult::NoWorkspace {
                    message: NO_WORKSPACE_MESSAGE.to_string(),
                })
            }
            PickOutcome::Cancelled => Ok(Self::unanswered(&picker)),
            PickOutcome::Target(folder) => {
                let result = self.dispatcher.dispatch(&entry, &folder).await?;
                Ok(RunCommandResult::Dispatched(result))
            }
        }
    }

    fn unanswered(picker: &PresetPicker) -> RunCommandResult {
        match picker.pending_prompt() {
            Some(prompt) => RunCommandResult::SelectionRequired { prompt },
            None => RunCommandResult::Cancelled,
        }
    }

    pub async fn copy_command(&self, params: &CopyCommandParams) -> Result<CopyCommandResult, AppError> {
        let entry = self.registry.find(&params.command)?;
        Ok(CopyCommandResult {
            message: format!("Command copied to clipboard: {}", entry.label),
            command: entry.command,
        })
    }

    pub async fn open_user_settings(&self) -> Result<SettingsFileResult, AppError> {
        let path = self.registry.ensure_settings_file().await?;
        Ok(SettingsFileResult { path })
    }
}
