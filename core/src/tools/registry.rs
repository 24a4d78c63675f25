//! Stores tools by name (mirrors the teacher's `ToolRegistry`).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry with every tool described in §4.4.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::file::ReadFileTool));
        registry.register(Arc::new(super::file::CreateFileTool));
        registry.register(Arc::new(super::file::EditFileTool));
        registry.register(Arc::new(super::file::ListFilesTool));
        registry.register(Arc::new(super::file::FindFileTool));
        registry.register(Arc::new(super::file::GrepTool));
        registry.register(Arc::new(super::ExecuteCommandTool));
        registry.register(Arc::new(super::HandoffTool));
        registry.register(Arc::new(super::SubmitReportTool));
        registry.register(Arc::new(super::AskUserTool));
        registry.register(Arc::new(super::PrintTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub async fn call(&self, name: &str, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::new(format!("unknown tool: {name}")).with_suggestion("check the tool name against the list of registered tools"))?;
        tool.call(args, session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn default_tools_registers_every_named_tool() {
        let registry = ToolRegistry::with_default_tools();
        let mut names = registry.names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "ask_user",
                "create_file",
                "edit_file",
                "execute_command",
                "find_file",
                "grep",
                "handoff",
                "list_files",
                "print",
                "read_file",
                "submit_report",
            ]
        );
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: "echoes input".into(),
                input_schema: serde_json::json!({}),
            }
        }
        async fn call(&self, args: Value, _session: &Session) -> Result<ToolCallContent, ToolError> {
            Ok(ToolCallContent { value: args })
        }
    }

    #[tokio::test]
    async fn call_unknown_tool_returns_not_found_style_error() {
        let registry = ToolRegistry::new();
        let session = crate::tools::Session::new(
            uuid::Uuid::new_v4(),
            None,
            std::path::PathBuf::from("/tmp"),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        let err = registry.call("missing", Value::Null, &session).await.unwrap_err();
        assert!(err.message.contains("unknown tool"));
    }

    #[tokio::test]
    async fn registered_tool_is_listed_and_callable() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.names(), vec!["echo".to_string()]);
        let session = crate::tools::Session::new(
            uuid::Uuid::new_v4(),
            None,
            std::path::PathBuf::from("/tmp"),
            Arc::new(crate::memory_store::InMemoryStore::new()),
        );
        let result = registry.call("echo", serde_json::json!({"x": 1}), &session).await.unwrap();
        assert_eq!(result.value, serde_json::json!({"x": 1}));
    }
}
