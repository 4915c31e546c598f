use crate::config::Config;
use crate::error::AppError;
use crate::utils::line_ending_handler::split_lines;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const RESOLVED_REF_KEY: &str = "resolved-ref: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReference {
    pub name: String,
    pub resolved_commit: String,
}

impl DependencyReference {
    /// Directory name of this dependency inside the git cache.
    pub fn cache_dir_name(&self) -> String {
        format!("{}-{}", self.name, self.resolved_commit)
    }
}

/// Pairs every git dependency of the manifest with the commit the lock
/// file pinned it to. One missing entry fails the whole resolution.
pub fn resolve_dependencies<M, L>(
    manifest: &[M],
    lock: &[L],
    url_prefix: &str,
) -> Result<Vec<DependencyReference>, AppError>
where
    M: AsRef<str>,
    L: AsRef<str>,
{
    manifest
        .iter()
        .filter_map(|line| line.as_ref().strip_prefix(url_prefix))
        .map(|rest| {
            let name = rest.trim();
            find_resolved_commit(lock, name)
                .map(|resolved_commit| DependencyReference {
                    name: name.to_string(),
                    resolved_commit,
                })
                .ok_or_else(|| AppError::UnresolvedDependency(name.to_string()))
        })
        .collect()
}

fn find_resolved_commit<L: AsRef<str>>(lock: &[L], name: &str) -> Option<String> {
    let anchor = format!("  {}:", name);
    let start = lock.iter().position(|line| line.as_ref() == anchor)?;
    lock[start..]
        .iter()
        .find_map(|line| line.as_ref().trim_start().strip_prefix(RESOLVED_REF_KEY))
        .map(|commit| commit.replace('"', "").trim().to_string())
}

/// Workspace root holding the app project, matched on its last path
/// component.
pub fn find_app_root<'a>(roots: &'a [PathBuf], app_folder_name: &str) -> Result<&'a Path, AppError> {
    if roots.is_empty() {
        return Err(AppError::WorkspaceNotOpen);
    }
    roots
        .iter()
        .find(|root| root.file_name().is_some_and(|n| n == app_folder_name))
        .map(PathBuf::as_path)
        .ok_or_else(|| AppError::AppDirectoryNotFound(app_folder_name.to_string()))
}

async fn read_lines(path: &Path, missing: fn(PathBuf) -> AppError) -> Result<Vec<String>, AppError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(missing(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await.map_err(|e| AppError::file_read(path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(split_lines(&content).into_iter().map(String::from).collect())
}

/// Reads the manifest and lock file of the app project and resolves its
/// git dependencies.
#[instrument(skip(config))]
pub async fn load_dependency_references(config: &Config) -> Result<Vec<DependencyReference>, AppError> {
    let app_root = find_app_root(&config.workspace_roots, &config.app_folder_name)?;
    let manifest = read_lines(&app_root.join(&config.manifest_file), AppError::ManifestNotFound).await?;
    let lock = read_lines(&app_root.join(&config.lock_file), AppError::LockFileNotFound).await?;

    let references = resolve_dependencies(&manifest, &lock, &config.dependency_url_prefix)?;
    debug!(count = references.len(), app_root = %app_root.display(), "Resolved dependency references");
    Ok(references)
}
