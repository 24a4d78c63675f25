//! Creates a new file (and its parent directories), refusing to overwrite an existing one.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

use super::path::resolve_path_under;

pub const TOOL_CREATE_FILE: &str = "create_file";

pub struct CreateFileTool;

#[derive(Deserialize)]
struct Args {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        TOOL_CREATE_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_CREATE_FILE.into(),
            description: "Creates a new file within the project directory with the given content. Fails if the file already exists.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;
        let resolved = resolve_path_under(&session.fs_root, &args.path)?;

        if resolved.exists() {
            return Err(ToolError::new(format!("file already exists: {}", args.path))
                .with_suggestion("use edit_file to modify an existing file"));
        }

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::new(format!("failed to create parent directories: {e}")))?;
        }

        tokio::fs::write(&resolved, &args.content)
            .await
            .map_err(|e| ToolError::new(format!("failed to write file: {e}")))?;

        Ok(ToolCallContent::text(format!("created {}", args.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(
            uuid::Uuid::new_v4(),
            None,
            dir.path().to_path_buf(),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        CreateFileTool
            .call(serde_json::json!({"path": "sub/a.txt", "content": "hi"}), &session)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("sub/a.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn refuses_to_overwrite_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "existing").unwrap();
        let session = Session::new(
            uuid::Uuid::new_v4(),
            None,
            dir.path().to_path_buf(),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        let err = CreateFileTool
            .call(serde_json::json!({"path": "a.txt", "content": "new"}), &session)
            .await
            .unwrap_err();
        assert!(err.message.contains("already exists"));
    }
}
