//! Transfers the task to a different agent by name.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{Session, Tool, ToolCallContent, ToolError, ToolSpec};

pub const TOOL_HANDOFF: &str = "handoff";

pub struct HandoffTool;

#[derive(Deserialize)]
struct Args {
    agent_name: String,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        TOOL_HANDOFF
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_HANDOFF.into(),
            description: "Transfers the task to a different named agent, who continues from the current conversation.".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_name": {"type": "string"},
                    "reason": {"type": "string"}
                },
                "required": ["agent_name"]
            }),
        }
    }

    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::new(format!("invalid arguments: {e}")))?;

        let agent = session.store.get_agent_by_name(&args.agent_name).await.map_err(|e| {
            ToolError::new(format!("no such agent: {}", args.agent_name))
                .with_suggestion("check the agent name")
                .with_suggestion(e.to_string())
        })?;

        let mut task = session
            .store
            .get_task(session.task_id)
            .await
            .map_err(|e| ToolError::new(format!("failed to load task: {e}")))?;
        task.agent_id = Some(agent.id);
        session
            .store
            .save_task(&task)
            .await
            .map_err(|e| ToolError::new(format!("failed to persist handoff: {e}")))?;

        let text = match args.reason {
            Some(reason) => format!("handed off to {} ({reason})", agent.name),
            None => format!("handed off to {}", agent.name),
        };
        Ok(ToolCallContent::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Agent;
    use crate::memory_store::{InMemoryStore, MemoryStore};
    use crate::task::Task;
    use std::sync::Arc;

    #[tokio::test]
    async fn reassigns_task_to_named_agent() {
        let store = Arc::new(InMemoryStore::new());
        let agent = Agent {
            id: uuid::Uuid::new_v4(),
            name: "reviewer".into(),
            instructions_template: "review the code".into(),
            default_model_id: uuid::Uuid::new_v4(),
        };
        store.put_agent(agent.clone()).await.unwrap();

        let task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();

        let session = Session::new(task.id, None, std::env::temp_dir(), store.clone());
        let result = HandoffTool
            .call(serde_json::json!({"agent_name": "reviewer"}), &session)
            .await
            .unwrap();
        assert!(result.value.as_str().unwrap().contains("reviewer"));

        let updated = store.get_task(task.id).await.unwrap();
        assert_eq!(updated.agent_id, Some(agent.id));
    }

    #[tokio::test]
    async fn unknown_agent_name_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();
        let session = Session::new(task.id, None, std::env::temp_dir(), store.clone());
        let err = HandoffTool
            .call(serde_json::json!({"agent_name": "nobody"}), &session)
            .await
            .unwrap_err();
        assert!(err.message.contains("no such agent"));
    }
}
