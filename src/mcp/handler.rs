use crate::config::Config;
use crate::error::AppError;
use crate::mcp::schemas::*;
use crate::tools::{
    command_runner::{CommandRunner, CopyCommandParams, RunCommandParams},
    commands_tool::CommandRegistry,
    feature_panel::{FeatureMessageParams, FeaturePanel},
    search_panel::{OpenFileParams, SearchPanel, SearchReposParams, ToggleFolderParams},
    terminal_tool::{ShellTerminalBackend, TerminalDispatcher},
};
use crate::utils::audit_logger::AuditLogger;

use async_trait::async_trait;
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult, RpcError, Tool,
};
use rust_mcp_sdk::mcp_server::ServerHandler;
use rust_mcp_sdk::McpServer;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

// Everything a tool call can reach, built once from the config.
#[derive(Debug)]
pub struct AppManagers {
    config: Arc<Config>,
    command_runner: Arc<CommandRunner>,
    search_panel: Arc<SearchPanel>,
    feature_panel: Arc<FeaturePanel>,
    audit_logger: Arc<AuditLogger>,
}

impl AppManagers {
    pub fn new(config: Arc<Config>, registry: Arc<CommandRegistry>) -> Self {
        let backend = Arc::new(ShellTerminalBackend::new(&config));
        let dispatcher = TerminalDispatcher::new(backend, config.terminal_name.clone());
        let command_runner = Arc::new(CommandRunner::new(config.clone(), registry, dispatcher));
        let search_panel = Arc::new(SearchPanel::new(config.clone()));
        let feature_panel = Arc::new(FeaturePanel::new(config.clone()));
        let audit_logger = Arc::new(AuditLogger::new(&config));

        Self {
            config,
            command_runner,
            search_panel,
            feature_panel,
            audit_logger,
        }
    }
}

#[derive(Debug)]
pub struct UtilsWellServerHandler {
    managers: Arc<AppManagers>,
}

impl UtilsWellServerHandler {
    pub fn new(config: Arc<Config>, registry: Arc<CommandRegistry>) -> Self {
        Self {
            managers: Arc::new(AppManagers::new(config, registry)),
        }
    }
}

fn tool(name: &str, description: &str, input_schema: Value) -> Result<Tool, serde_json::Error> {
    serde_json::from_value(json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
    }))
}

pub fn tool_definitions() -> Result<Vec<Tool>, serde_json::Error> {
    Ok(vec![
        // Command shortcuts
        tool("list_commands", "List the configured terminal command shortcuts.", empty_schema())?,
        tool(
            "run_command",
            "Run a command shortcut in a terminal session. Missing choices are returned as `selection_required` prompts; call again with the answer.",
            run_command_schema(),
        )?,
        tool("copy_command", "Get the text of a command shortcut for the clipboard.", copy_command_schema())?,
        tool("open_user_settings", "Get the path of the command shortcut file, creating it if missing.", empty_schema())?,
        // Dependency search
        tool("search_repos", "Search the cached sources of the app's git dependencies.", search_repos_schema())?,
        tool("toggle_folder", "Expand or collapse a folder in the search results.", toggle_folder_schema())?,
        tool("open_file", "Resolve a search result link to a file and line.", open_file_schema())?,
        tool("get_search_view", "Get the current search panel view.", empty_schema())?,
        // Feature creator
        tool("open_feature_creator", "Open (or reveal) the feature creator panel.", empty_schema())?,
        tool("feature_creator_message", "Deliver a message from the feature creator UI.", feature_creator_message_schema())?,
        tool("close_feature_creator", "Close the feature creator panel.", empty_schema())?,
        // Config
        tool("get_config", "Get current server configuration.", empty_schema())?,
    ])
}

/// Wraps a serializable value as the text content of a tool result.
fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, AppError> {
    let text = serde_json::to_string_pretty(value)?;
    Ok(serde_json::from_value(json!({
        "content": [{ "type": "text", "text": text }]
    }))?)
}

#[async_trait]
impl ServerHandler for UtilsWellServerHandler {
    #[instrument(skip(self, _request, _runtime))]
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: &dyn McpServer,
    ) -> Result<ListToolsResult, RpcError> {
        info!("Handling list_tools request");
        let tools = tool_definitions().map_err(|e| {
            error!(error = %e, "Failed to build tool definitions");
            RpcError::internal_error().with_message(e.to_string())
        })?;
        Ok(ListToolsResult {
            tools,
            meta: None,
            next_cursor: None,
        })
    }

    #[instrument(skip(self, request, _runtime), fields(tool_name = %request.params.name))]
    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: &dyn McpServer,
    ) -> Result<CallToolResult, CallToolError> {
        info!("Handling call_tool request for: {}", request.params.name);
        let args = Value::Object(request.params.arguments.unwrap_or_default());
        self.managers.audit_logger.log_tool_call(&request.params.name, &args).await;

        // Parses the arguments and awaits the manager method; `@infallible`
        // marks methods that return their value directly.
        macro_rules! handle_tool {
            ($manager_field:ident . $method:ident :: <$param_type:ty> ()) => {{
                let params: $param_type = serde_json::from_value(args.clone())
                    .map_err(|e| AppError::InvalidInputArgument(e.to_string()))?;
                let result = self.managers.$manager_field.$method(&params).await?;
                Ok(json_result(&result)?)
            }};
            ($manager_field:ident . $method:ident ()) => {{
                let result = self.managers.$manager_field.$method().await?;
                Ok(json_result(&result)?)
            }};
            (@infallible $manager_field:ident . $method:ident :: <$param_type:ty> ()) => {{
                let params: $param_type = serde_json::from_value(args.clone())
                    .map_err(|e| AppError::InvalidInputArgument(e.to_string()))?;
                let result = self.managers.$manager_field.$method(&params).await;
                Ok(json_result(&result)?)
            }};
            (@infallible $manager_field:ident . $method:ident ()) => {{
                let result = self.managers.$manager_field.$method().await;
                Ok(json_result(&result)?)
            }};
        }

        match request.params.name.as_str() {
            // Command shortcuts
            "list_commands" => handle_tool!(command_runner.list_commands()),
            "run_command" => handle_tool!(command_runner.run_command::<RunCommandParams>()),
            "copy_command" => handle_tool!(command_runner.copy_command::<CopyCommandParams>()),
            "open_user_settings" => handle_tool!(command_runner.open_user_settings()),
            // Dependency search
            "search_repos" => handle_tool!(search_panel.submit_search::<SearchReposParams>()),
            "toggle_folder" => handle_tool!(@infallible search_panel.toggle_folder::<ToggleFolderParams>()),
            "open_file" => handle_tool!(search_panel.open_file::<OpenFileParams>()),
            "get_search_view" => handle_tool!(@infallible search_panel.view()),
            // Feature creator
            "open_feature_creator" => handle_tool!(@infallible feature_panel.open()),
            "feature_creator_message" => {
                handle_tool!(@infallible feature_panel.handle_message::<FeatureMessageParams>())
            }
            "close_feature_creator" => {
                let closed = self.managers.feature_panel.dispose().await;
                debug!(closed, "Feature panel close requested");
                Ok(json_result(&json!({ "closed": closed }))?)
            }
            // Config
            "get_config" => Ok(json_result(self.managers.config.as_ref())?),

            _ => {
                error!("Unknown tool called: {}", request.params.name);
                Err(CallToolError::unknown_tool(request.params.name))
            }
        }
    }
}
