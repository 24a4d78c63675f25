//! Sends a value back to the conversation without counting against the
//! per-tool usage statistics (excluded by the statistics interceptor, §4.4).

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

pub const TOOL_PRINT: &str = "print";

pub struct PrintTool;

#[async_trait]
impl Tool for PrintTool {
    fn name(&self) -> &str {
        TOOL_PRINT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_PRINT.into(),
            description: "Sends a value back to the conversation, e.g. to show intermediate output.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "value": {}
                },
                "required": ["value"]
            }),
        }
    }

    async fn call(&self, args: Value, _session: &Session) -> Result<ToolCallContent, ToolError> {
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| ToolError::new("missing value"))?;
        Ok(ToolCallContent { value })
    }
}
