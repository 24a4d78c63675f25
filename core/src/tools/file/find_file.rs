//! Finds files by glob pattern under the project root.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

pub const TOOL_FIND_FILE: &str = "find_file";

pub struct FindFileTool;

#[derive(Deserialize)]
struct Args {
    pattern: String,
}

#[async_trait]
impl Tool for FindFileTool {
    fn name(&self) -> &str {
        TOOL_FIND_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_FIND_FILE.into(),
            description: "Finds files under the project directory matching a glob pattern, e.g. \"**/*.rs\".".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"}
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;

        let root = session.fs_root.clone();
        let pattern = args.pattern.clone();
        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<String>, ToolError> {
            let full_pattern = root.join(&pattern);
            let full_pattern = full_pattern
                .to_str()
                .ok_or_else(|| ToolError::new("pattern contains invalid UTF-8"))?
                .to_string();
            let mut found = Vec::new();
            for entry in glob::glob(&full_pattern)
                .map_err(|e| ToolError::new(format!("invalid glob pattern: {e}")))?
            {
                if let Ok(path) = entry {
                    let rel = path.strip_prefix(&root).unwrap_or(&path);
                    found.push(rel.display().to_string());
                }
            }
            Ok(found)
        })
        .await
        .map_err(|e| ToolError::new(format!("glob search failed: {e}")))??;

        Ok(ToolCallContent::text(matches.join("\n")))
    }
}
