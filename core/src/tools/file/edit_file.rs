//! Applies one or more find/replace edits to a file atomically: all edits are
//! applied to an in-memory copy first, and the file is written once at the end.
//! Mirrors the teacher's multiedit tool, including its "create new file" special
//! case when the target is missing and the first edit's `old_string` is empty.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

use super::path::resolve_path_under;

pub const TOOL_EDIT_FILE: &str = "edit_file";

pub struct EditFileTool;

#[derive(Deserialize)]
struct Edit {
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Deserialize)]
struct Args {
    path: String,
    edits: Vec<Edit>,
}

fn apply_edit(content: &str, edit: &Edit) -> Result<String, ToolError> {
    if edit.replace_all {
        if !content.contains(edit.old_string.as_str()) {
            return Err(ToolError::new(format!(
                "old_string not found: {:?}",
                edit.old_string
            )));
        }
        return Ok(content.replace(&edit.old_string, &edit.new_string));
    }

    let count = content.matches(edit.old_string.as_str()).count();
    if count == 0 {
        return Err(ToolError::new(format!("old_string not found: {:?}", edit.old_string))
            .with_suggestion("check the exact text including whitespace"));
    }
    if count > 1 {
        return Err(ToolError::new(format!(
            "old_string is not unique ({count} occurrences); set replace_all or include more context"
        )));
    }
    Ok(content.replacen(&edit.old_string, &edit.new_string, 1))
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        TOOL_EDIT_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_EDIT_FILE.into(),
            description: "Applies one or more exact find/replace edits to a file atomically. \
                          If the file does not exist and the first edit's old_string is empty, \
                          creates the file with that edit's new_string as its content.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "edits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "old_string": {"type": "string"},
                                "new_string": {"type": "string"},
                                "replace_all": {"type": "boolean"}
                            },
                            "required": ["old_string", "new_string"]
                        }
                    }
                },
                "required": ["path", "edits"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;
        let resolved = resolve_path_under(&session.fs_root, &args.path)?;

        if args.edits.is_empty() {
            return Err(ToolError::new("edits must not be empty"));
        }

        if !resolved.exists() {
            let first = &args.edits[0];
            if first.old_string.is_empty() {
                if let Some(parent) = resolved.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ToolError::new(format!("failed to create parent directories: {e}")))?;
                }
                let mut content = first.new_string.clone();
                for edit in &args.edits[1..] {
                    content = apply_edit(&content, edit)?;
                }
                tokio::fs::write(&resolved, &content)
                    .await
                    .map_err(|e| ToolError::new(format!("failed to write file: {e}")))?;
                return Ok(ToolCallContent::text(format!("created {}", args.path)));
            }
            return Err(ToolError::new(format!("no such file: {}", args.path)));
        }

        let mut content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::new(format!("failed to read file: {e}")))?;

        for edit in &args.edits {
            content = apply_edit(&content, edit)?;
        }

        tokio::fs::write(&resolved, &content)
            .await
            .map_err(|e| ToolError::new(format!("failed to write file: {e}")))?;

        Ok(ToolCallContent::text(format!("edited {}", args.path)))
    }
}
