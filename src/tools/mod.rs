pub mod command_runner;
pub mod commands_tool;
pub mod dependency_resolver;
pub mod feature_panel;
pub mod repo_search_tool;
pub mod result_renderer;
pub mod search_panel;
pub mod terminal_tool;
pub mod workspace_picker;
