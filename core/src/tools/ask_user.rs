//! Posts a question back to the user and suspends the task awaiting their reply.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::task::Phase;
use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

pub const TOOL_ASK_USER: &str = "ask_user";

pub struct AskUserTool;

#[derive(Deserialize)]
struct Args {
    question: String,
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        TOOL_ASK_USER
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_ASK_USER.into(),
            description: "Asks the user a clarifying question and waits for their reply before continuing.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"}
                },
                "required": ["question"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;

        let mut task = session
            .store
            .get_task(session.task_id)
            .await
            .map_err(|e| ToolError::new(format!("failed to load task: {e}")))?;
        task.desired_phase = Some(Phase::AwaitInput);
        session
            .store
            .save_task(&task)
            .await
            .map_err(|e| ToolError::new(format!("failed to persist suspend: {e}")))?;

        Ok(ToolCallContent::text(args.question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{InMemoryStore, MemoryStore};
    use crate::task::Task;
    use std::sync::Arc;

    #[tokio::test]
    async fn suspends_task_awaiting_user_input() {
        let store = Arc::new(InMemoryStore::new());
        let task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();
        let session = Session::new(task.id, None, std::env::temp_dir(), store.clone());

        AskUserTool
            .call(serde_json::json!({"question": "which branch?"}), &session)
            .await
            .unwrap();

        let updated = store.get_task(task.id).await.unwrap();
        assert_eq!(updated.desired_phase, Some(Phase::AwaitInput));
    }
}
