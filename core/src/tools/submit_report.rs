//! Final report tool. By convention used once per run; enforcement is left to
//! the agent's prompt rather than to the interpreter (open question, see
//! DESIGN.md).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

pub const TOOL_SUBMIT_REPORT: &str = "submit_report";

pub struct SubmitReportTool;

#[derive(Deserialize)]
struct Args {
    summary: String,
}

#[async_trait]
impl Tool for SubmitReportTool {
    fn name(&self) -> &str {
        TOOL_SUBMIT_REPORT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SUBMIT_REPORT.into(),
            description: "Submits the final report for this task. Call this once, when the task is complete.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"}
                },
                "required": ["summary"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;
        session.put_scratch("final_report", Value::String(args.summary.clone())).await;
        Ok(ToolCallContent::text(format!("report submitted: {}", args.summary)))
    }
}
