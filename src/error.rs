use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    StdIoError(#[from] std::io::Error),

    #[error("No workspace or project folder open.")]
    WorkspaceNotOpen,

    #[error("Directory {0} not found among the workspace folders")]
    AppDirectoryNotFound(String),

    #[error("Manifest file not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Lock file not found: {0}")]
    LockFileNotFound(PathBuf),

    #[error("Related dep {0} not found on lock file")]
    UnresolvedDependency(String),

    #[error("Could not locate the cache directory {0}")]
    CacheDirectoryNotFound(PathBuf),

    #[error("Repo {0} not found")]
    RepositoryNotFound(String),

    #[error("Error reading file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Search on repositories is not implemented on {0}")]
    UnsupportedPlatform(&'static str),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Terminal error: {0}")]
    TerminalError(String),

    #[error("Search task failed: {0}")]
    SearchTaskFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Invalid input argument: {0}")]
    InvalidInputArgument(String),
}

impl AppError {
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::FileRead {
            path: path.into(),
            source,
        }
    }
}

impl From<AppError> for rust_mcp_schema::schema_utils::CallToolError {
    fn from(err: AppError) -> Self {
        tracing::error!("AppError converted to CallToolError: {:?}", err);
        rust_mcp_schema::schema_utils::CallToolError::new(err)
    }
}
