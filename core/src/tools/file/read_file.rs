//! Reads a file, returning `cat -n` style line-numbered content.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

use super::path::resolve_path_under;

pub const TOOL_READ_FILE: &str = "read_file";

pub struct ReadFileTool;

#[derive(Deserialize)]
struct Args {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_READ_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_READ_FILE.into(),
            description: "Reads a text file within the project directory, returning numbered lines.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "offset": {"type": "integer", "description": "1-based line to start from"},
                    "limit": {"type": "integer", "description": "max number of lines to return"}
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;
        let resolved = resolve_path_under(&session.fs_root, &args.path)?;

        if !resolved.is_file() {
            return Err(ToolError::new(format!("no such file: {}", args.path))
                .with_suggestion("use list_files to check the path"));
        }

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::new(format!("failed to read file: {e}")))?;

        let offset = args.offset.unwrap_or(1).max(1);
        let limit = args.limit.unwrap_or(2000);

        let numbered: String = content
            .lines()
            .enumerate()
            .skip(offset - 1)
            .take(limit)
            .map(|(i, line)| format!("{:>6}\t{}\n", i + 1, line))
            .collect();

        Ok(ToolCallContent::text(numbered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn reads_file_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let session = Session::new(
            uuid::Uuid::new_v4(),
            None,
            dir.path().to_path_buf(),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        let result = ReadFileTool
            .call(serde_json::json!({"path": "a.txt"}), &session)
            .await
            .unwrap();
        let text = result.value.as_str().unwrap();
        assert!(text.contains("     1\tone"));
        assert!(text.contains("     3\tthree"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(
            uuid::Uuid::new_v4(),
            None,
            dir.path().to_path_buf(),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        let err = ReadFileTool
            .call(serde_json::json!({"path": "missing.txt"}), &session)
            .await
            .unwrap_err();
        assert!(err.message.contains("no such file"));
    }
}
