//! Wire-level event types (§6 of the design): type + payload, tagged the way the
//! teacher's `ProtocolEvent` tags its variants. Envelope (session/event id) is
//! applied separately by [`crate::envelope`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role a message was authored under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Declared high-level state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    AwaitInput,
    InvokeModel,
    ExecuteTools,
    Suspended,
}

/// Token usage for one assistant message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost_usd: f64,
}

/// One part of a message's content, tagged by `type` (§6: `MessagePart`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { content: String },
    Error { message: String },
    ToolCall { tool_name: String, input: Value },
    ToolResult { tool_name: String, result: Value },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentState {
    Partial,
    Complete,
}

/// Fixed, per-message identity: does not change as content streams in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub id: Uuid,
    pub task_id: Uuid,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Streaming status attached to a message at the time it was published.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageStatus {
    pub content_state: ContentState,
    pub is_final_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<MessageUsage>,
}

/// A message as delivered to a subscriber: metadata + content parts + status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub metadata: MessageMetadata,
    pub content: Vec<MessagePart>,
    pub status: MessageStatus,
}

/// A task-level event not tied to any single message (currently: phase changes).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    PhaseChanged { task_id: Uuid, phase: TaskPhase },
}

/// Union delivered over `Hub::subscribe`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscribeResponse {
    Message(WireMessage),
    TaskEvent(TaskEvent),
}

impl SubscribeResponse {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
