use crate::config::Config;
use crate::error::AppError;
use crate::tools::commands_tool::CommandEntry;
use crate::utils::path_utils::shell_quote;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio as StdProcessStdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, instrument, warn};

/// Named, long-lived terminal sessions. Sending text is one-way: nothing
/// about the command's output or exit status comes back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Whether a session with this name exists and is still running.
    async fn is_live(&self, name: &str) -> bool;
    async fn create(&self, name: &str, cwd: &Path) -> Result<(), AppError>;
    async fn show(&self, name: &str) -> Result<(), AppError>;
    async fn send_text(&self, name: &str, text: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
pub struct DispatchResult {
    pub terminal: String,
    pub folder: PathBuf,
    pub reused: bool,
    pub message: String,
}

#[derive(Debug)]
struct ShellSession {
    child: Child,
    stdin: ChildStdin,
}

/// Sessions backed by interactive shells with piped stdin. Output is only
/// drained into the debug log.
#[derive(Debug)]
pub struct ShellTerminalBackend {
    shell: String,
    sessions: TokioMutex<HashMap<String, ShellSession>>,
    foreground: TokioMutex<Option<String>>,
}

fn default_shell(config: &Config) -> String {
    if let Some(shell) = &config.default_shell {
        return shell.clone();
    }
    if cfg!(windows) {
        return "cmd.exe".to_string();
    }
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.is_empty() {
            return shell;
        }
    }
    ["bash", "sh"]
        .iter()
        .find_map(|candidate| which::which(candidate).ok())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

impl ShellTerminalBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            shell: default_shell(config),
            sessions: TokioMutex::new(HashMap::new()),
            foreground: TokioMutex::new(None),
        }
    }

    pub async fn foreground(&self) -> Option<String> {
        self.foreground.lock().await.clone()
    }
}

fn drain_to_log<R>(name: String, stream: &'static str, reader: R)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(terminal = %name, stream, "{}", line);
        }
    });
}

#[async_trait]
impl TerminalBackend for ShellTerminalBackend {
    async fn is_live(&self, name: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let exited = match sessions.get_mut(name) {
            None => return false,
            Some(session) => !matches!(session.child.try_wait(), Ok(None)),
        };
        if exited {
            info!(terminal = %name, "Terminal session has exited, dropping it");
            sessions.remove(name);
        }
        !exited
    }

    async fn create(&self, name: &str, cwd: &Path) -> Result<(), AppError> {
        let mut command = TokioCommand::new(&self.shell);
        command
            .current_dir(cwd)
            .stdin(StdProcessStdio::piped())
            .stdout(StdProcessStdio::piped())
            .stderr(StdProcessStdio::piped())
            .kill_on_drop(true);

        debug!(shell = %self.shell, terminal = %name, cwd = %cwd.display(), "Spawning terminal shell");
        let mut child = command.spawn().map_err(|e| {
            error!(error = %e, shell = %self.shell, "Failed to spawn terminal shell");
            AppError::TerminalError(format!("Failed to start shell '{}' in {}: {}", self.shell, cwd.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::TerminalError("Shell stdin was not captured".to_string()))?;
        if let Some(stdout) = child.stdout.take() {
            drain_to_log(name.to_string(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            drain_to_log(name.to_string(), "stderr", stderr);
        }

        info!(terminal = %name, pid = ?child.id(), "Terminal session created");
        self.sessions
            .lock()
            .await
            .insert(name.to_string(), ShellSession { child, stdin });
        Ok(())
    }

    async fn show(&self, name: &str) -> Result<(), AppError> {
        *self.foreground.lock().await = Some(name.to_string());
        Ok(())
    }

    async fn send_text(&self, name: &str, text: &str) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(name)
            .ok_or_else(|| AppError::TerminalError(format!("Terminal '{}' is not open", name)))?;
        let mut line = text.to_string();
        line.push('\n');
        let written = async {
            session.stdin.write_all(line.as_bytes()).await?;
            session.stdin.flush().await
        }
        .await;
        written.map_err(|e| {
            warn!(terminal = %name, error = %e, "Failed to write to terminal");
            AppError::TerminalError(format!("Failed to send text to terminal '{}': {}", name, e))
        })
    }
}

/// Runs command entries in named terminal sessions.
pub struct TerminalDispatcher {
    backend: Arc<dyn TerminalBackend>,
    shared_name: String,
}

impl std::fmt::Debug for TerminalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalDispatcher").field("shared_name", &self.shared_name).finish()
    }
}

impl TerminalDispatcher {
    pub fn new(backend: Arc<dyn TerminalBackend>, shared_name: impl Into<String>) -> Self {
        Self {
            backend,
            shared_name: shared_name.into(),
        }
    }

    pub fn session_name(&self, entry: &CommandEntry, folder: &Path) -> String {
        if entry.own_terminal {
            format!("{} - {} - {}", self.shared_name, entry.label, folder.display())
        } else {
            self.shared_name.clone()
        }
    }

    /// Sends the entry's command to its session. A reused session gets a
    /// `cd` first since its working directory is unknown; a new one starts
    /// in `folder`.
    #[instrument(skip(self, entry, folder), fields(command = %entry.command, folder = %folder.display()))]
    pub async fn dispatch(&self, entry: &CommandEntry, folder: &Path) -> Result<DispatchResult, AppError> {
        let name = self.session_name(entry, folder);
        let reused = self.backend.is_live(&name).await;
        if !reused {
            self.backend.create(&name, folder).await?;
        }
        self.backend.show(&name).await?;
        if reused {
            self.backend.send_text(&name, &format!("cd {}", shell_quote(folder))).await?;
        }
        self.backend.send_text(&name, &entry.command).await?;

        info!(terminal = %name, reused, "Command sent to terminal");
        Ok(DispatchResult {
            message: format!("Running '{}' in terminal '{}'", entry.label, name),
            terminal: name,
            folder: folder.to_path_buf(),
            reused,
        })
    }
}
