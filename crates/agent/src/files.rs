//! Detects tool results that produced a file on disk.

use std::path::Path;

use steward_core::tool::ToolResult;

/// (tool, action) pairs that always write a file.
const FILE_WRITING_ACTIONS: &[(&str, &str)] = &[
    ("file", "write"),
    ("file", "edit"),
    ("screen", "screenshot"),
    ("screen", "capture"),
];

/// Action names that write a file for any tool.
const GENERIC_WRITE_ACTIONS: &[&str] = &["write", "save", "create", "export", "download"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub name: String,
    pub size: u64,
}

/// The file a successful writing action left at `data.path`, if any.
pub fn detect_generated_file(tool_name: &str, action_name: &str, result: &ToolResult) -> Option<GeneratedFile> {
    if !result.is_success() {
        return None;
    }
    let writes = FILE_WRITING_ACTIONS.contains(&(tool_name, action_name))
        || GENERIC_WRITE_ACTIONS.contains(&action_name);
    if !writes {
        return None;
    }

    let path = result
        .data
        .as_ref()?
        .get("path")?
        .as_str()
        .filter(|p| !p.is_empty())?;
    let metadata = std::fs::metadata(path).ok().filter(|m| m.is_file())?;
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Some(GeneratedFile {
        path: path.to_string(),
        name,
        size: metadata.len(),
    })
}
