use crate::config::Config;
use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::error;

const MAX_LOGGED_ARGUMENT_LEN: usize = 1024;

/// Appends one line per tool call, rotating the file once it grows past
/// the configured size.
#[derive(Debug)]
pub struct AuditLogger {
    log_file_path: PathBuf,
    max_size_bytes: u64,
}

impl AuditLogger {
    pub fn new(config: &Config) -> Self {
        if let Some(parent_dir) = config.audit_log_file.parent() {
            if !parent_dir.exists() {
                if let Err(e) = std::fs::create_dir_all(parent_dir) {
                    error!(path = %parent_dir.display(), error = %e, "Failed to create audit log directory");
                }
            }
        }
        Self {
            log_file_path: config.audit_log_file.clone(),
            max_size_bytes: config.audit_log_max_size_bytes,
        }
    }

    async fn rotate_log_if_needed(&self) -> Result<()> {
        if !self.log_file_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_file_path).await?;
        if metadata.len() >= self.max_size_bytes {
            let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
            let file_stem = self.log_file_path.file_stem().unwrap_or_default().to_string_lossy();
            let extension = self.log_file_path.extension().unwrap_or_default().to_string_lossy();

            let backup_file_name = format!("{}_{}.{}", file_stem, timestamp, extension);
            let backup_path = self.log_file_path.with_file_name(backup_file_name);

            fs::rename(&self.log_file_path, backup_path).await?;
        }
        Ok(())
    }

    pub async fn log_tool_call(&self, tool_name: &str, arguments: &Value) {
        if let Err(e) = self.try_log_tool_call(tool_name, arguments).await {
            error!(tool = %tool_name, error = %e, "Failed to write audit log");
        }
    }

    async fn try_log_tool_call(&self, tool_name: &str, arguments: &Value) -> Result<()> {
        self.rotate_log_if_needed().await?;

        let timestamp = Utc::now().to_rfc3339();

        // Queries and command lines are short; anything huge is a client bug.
        let mut sanitized_args = arguments.clone();
        if let Some(obj) = sanitized_args.as_object_mut() {
            for value in obj.values_mut() {
                if value.as_str().is_some_and(|s| s.len() > MAX_LOGGED_ARGUMENT_LEN) {
                    *value = Value::String("<truncated for log>".to_string());
                }
            }
        }

        let args_string = serde_json::to_string(&sanitized_args)?;
        let log_entry = format!("{} | {:<22} | Arguments: {}\n", timestamp, tool_name, args_string);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .await?;

        file.write_all(log_entry.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_one_line_per_call_and_truncates_long_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(dir.path());
        let logger = AuditLogger::new(&config);

        logger.log_tool_call("search_repos", &json!({ "query": "TODO" })).await;
        logger
            .log_tool_call("run_command", &json!({ "command": "x".repeat(2000) }))
            .await;

        let content = std::fs::read_to_string(&config.audit_log_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("search_repos") && lines[0].contains("TODO"));
        assert!(lines[1].contains("<truncated for log>"));
    }

    #[tokio::test]
    async fn rotates_when_size_limit_is_reached() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(dir.path());
        let logger = AuditLogger::new(&config);
        std::fs::write(&config.audit_log_file, "x".repeat(2048)).unwrap();

        logger.log_tool_call("list_commands", &json!({})).await;

        let log_dir = config.audit_log_file.parent().unwrap();
        let entries = std::fs::read_dir(log_dir).unwrap().count();
        assert_eq!(entries, 2);
        let content = std::fs::read_to_string(&config.audit_log_file).unwrap();
        assert!(content.starts_with(char::is_numeric));
    }
}
