//! Input schemas of the tools, as JSON Schema objects.

use serde_json::{json, Map, Value};

fn create_prop(type_str: &str, description: &str) -> Value {
    json!({
        "type": type_str,
        "description": description
    })
}

fn object_schema(required: &[&str], properties: Vec<(&str, Value)>) -> Value {
    let properties: Map<String, Value> = properties.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn empty_schema() -> Value {
    object_schema(&[], Vec::new())
}

pub fn run_command_schema() -> Value {
    object_schema(
        &[],
        vec![
            ("command", create_prop("string", "Label (or command text) of the configured command. Omit to be asked to choose.")),
            ("root", create_prop("string", "Workspace root to run in, by folder name or full path. Only needed when several roots are open.")),
            ("subfolder", create_prop("string", "Configured subfolder to run in, for commands that declare subfolders.")),
        ],
    )
}

pub fn copy_command_schema() -> Value {
    object_schema(
        &["command"],
        vec![("command", create_prop("string", "Label (or command text) of the configured command to copy."))],
    )
}

pub fn search_repos_schema() -> Value {
    object_schema(
        &["query"],
        vec![(
            "query",
            create_prop("string", "Literal, case-sensitive text to find in the dependency sources. Blank clears the results."),
        )],
    )
}

pub fn toggle_folder_schema() -> Value {
    object_schema(
        &["id"],
        vec![("id", create_prop("string", "Folder id from the `data-target` attribute of a folder row."))],
    )
}

pub fn open_file_schema() -> Value {
    object_schema(
        &["link"],
        vec![("link", create_prop("string", "`path:line` link from the `data-link` attribute of a file or line row."))],
    )
}

pub fn feature_creator_message_schema() -> Value {
    object_schema(
        &["command"],
        vec![
            ("command", create_prop("string", "Message command posted by the feature creator UI.")),
            ("text", create_prop("string", "Optional message payload.")),
        ],
    )
}
