//! Lists files under a directory within the project, honoring `.gitignore`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

use super::path::resolve_path_under;

pub const TOOL_LIST_FILES: &str = "list_files";

pub struct ListFilesTool;

#[derive(Deserialize)]
struct Args {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_depth: Option<usize>,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        TOOL_LIST_FILES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_LIST_FILES.into(),
            description: "Lists files and directories under a path in the project, honoring .gitignore.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "defaults to the project root"},
                    "max_depth": {"type": "integer"}
                }
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;
        let rel = args.path.unwrap_or_default();
        let resolved = resolve_path_under(&session.fs_root, &rel)?;

        if !resolved.exists() {
            return Err(ToolError::new(format!("no such path: {rel}")));
        }

        let root = resolved.clone();
        let max_depth = args.max_depth;
        let entries = tokio::task::spawn_blocking(move || {
            let mut builder = ignore::WalkBuilder::new(&root);
            if let Some(depth) = max_depth {
                builder.max_depth(Some(depth));
            }
            builder
                .build()
                .filter_map(Result::ok)
                .filter(|entry| entry.path() != root)
                .map(|entry| entry.path().strip_prefix(&root).unwrap_or(entry.path()).display().to_string())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ToolError::new(format!("walk failed: {e}")))?;

        Ok(ToolCallContent::text(entries.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn lists_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        let session = Session::new(
            uuid::Uuid::new_v4(),
            None,
            dir.path().to_path_buf(),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        let result = ListFilesTool.call(serde_json::json!({}), &session).await.unwrap();
        let text = result.value.as_str().unwrap();
        assert!(text.contains("src/main.rs") || text.contains("src\\main.rs"));
    }
}
