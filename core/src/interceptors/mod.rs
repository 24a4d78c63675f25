//! The four-stage chain every tool call is routed through (§4.4), outermost to
//! innermost: tool-name tagging, per-tool statistics, event publication, and a
//! durable function-call log consumed by the interpreter's result.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use stream_event::{
    ContentState, MessageMetadata, MessagePart, MessageRole, MessageStatus, SubscribeResponse,
    WireMessage,
};

use crate::hub::Hub;
use crate::tools::{Session, ToolCallContent, ToolError, ToolRegistry, TOOL_PRINT};

/// One tool invocation as recorded by the durable function log.
#[derive(Clone, Debug, serde::Serialize)]
pub struct FunctionCall {
    pub name: String,
    pub input: Value,
    pub output: Result<Value, String>,
}

fn wire_tool_event(task_id: Uuid, role: MessageRole, part: MessagePart) -> WireMessage {
    let now = Utc::now();
    WireMessage {
        metadata: MessageMetadata {
            id: Uuid::new_v4(),
            task_id,
            role,
            agent_id: None,
            model_id: None,
            created_at: now,
            updated_at: now,
        },
        content: vec![part],
        status: MessageStatus {
            content_state: ContentState::Complete,
            is_final_response: false,
            usage: None,
        },
    }
}

/// Wraps a [`ToolRegistry`] with the interceptor chain. `hub` is optional so the
/// chain works in tests or offline replays with no live subscribers.
pub struct InterceptorChain {
    registry: Arc<ToolRegistry>,
    hub: Option<Hub>,
}

impl InterceptorChain {
    pub fn new(registry: Arc<ToolRegistry>, hub: Option<Hub>) -> Self {
        Self { registry, hub }
    }

    /// Invokes `name` through all four stages, appending the outcome to `log`.
    pub async fn call(
        &self,
        name: &str,
        args: Value,
        session: &Session,
        log: &Mutex<Vec<FunctionCall>>,
    ) -> Result<ToolCallContent, ToolError> {
        *session.current_tool.lock().await = Some(name.to_string());

        if name != TOOL_PRINT {
            let mut scratch = session.scratch.lock().await;
            let key = format!("tool_calls::{name}");
            let count = scratch.get(&key).and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            scratch.insert(key, Value::from(count));
        }

        if let Some(hub) = &self.hub {
            let call_part = MessagePart::ToolCall {
                tool_name: name.to_string(),
                input: args.clone(),
            };
            hub.publish(
                session.task_id,
                SubscribeResponse::Message(wire_tool_event(session.task_id, MessageRole::Assistant, call_part)),
            )
            .await;
        }

        let result = self.registry.call(name, args.clone(), session).await;

        if let Some(hub) = &self.hub {
            let result_value = match &result {
                Ok(content) => content.value.clone(),
                Err(e) => serde_json::json!({"error": e.message, "suggestions": e.suggestions}),
            };
            let result_part = MessagePart::ToolResult {
                tool_name: name.to_string(),
                result: result_value,
            };
            hub.publish(
                session.task_id,
                SubscribeResponse::Message(wire_tool_event(session.task_id, MessageRole::System, result_part)),
            )
            .await;
        }

        log.lock().await.push(FunctionCall {
            name: name.to_string(),
            input: args,
            output: result
                .as_ref()
                .map(|c| c.value.clone())
                .map_err(|e| e.message.clone()),
        });

        *session.current_tool.lock().await = None;
        result
    }
}
