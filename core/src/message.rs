//! Message and block types (§3 of the design): the unit the reconciler reads and writes.
//!
//! A message belongs to a task and carries an ordered sequence of content blocks.
//! `processed_time` is the reconciler's bookkeeping: `None` means the message still
//! needs attention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    User,
    Assistant,
    System,
}

/// Token/cost accounting for one assistant message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cost_usd += other.cost_usd;
    }
}

/// One content unit inside a message, tagged by `kind`.
///
/// Every non-text block carries a serialized payload whose schema is fixed by its tag;
/// the bridge in [`crate::proto`] is the only place that interprets tool-specific payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    NativeToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    NativeToolResult {
        call_id: String,
        name: String,
        result: serde_json::Value,
    },
    CodeInterpreterCall {
        id: String,
        script: String,
    },
    CodeInterpreterResult {
        call_id: String,
        console_output: String,
        tool_stats: std::collections::HashMap<String, i64>,
    },
}

impl Block {
    /// Returns true for the blocks that represent an LLM-issued tool/script call
    /// (native_tool_call or code_interpreter_call).
    pub fn is_call(&self) -> bool {
        matches!(self, Block::NativeToolCall { .. } | Block::CodeInterpreterCall { .. })
    }
}

/// One message in a task's history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub task_id: Uuid,
    pub source: MessageSource,
    pub content: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// `None` while the reconciler still owes this message a reaction.
    pub processed_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(task_id: Uuid, source: MessageSource, content: Vec<Block>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            source,
            content,
            usage: None,
            processed_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user(task_id: Uuid, text: impl Into<String>) -> Self {
        Self::new(task_id, MessageSource::User, vec![Block::Text { text: text.into() }])
    }

    pub fn is_processed(&self) -> bool {
        self.processed_time.is_some()
    }

    pub fn mark_processed(&mut self) {
        let now = Utc::now();
        self.processed_time = Some(now);
        self.updated_at = now;
    }

    /// True when this message has at least one call block awaiting a tool result.
    pub fn has_pending_calls(&self) -> bool {
        self.content.iter().any(Block::is_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_is_unprocessed_with_single_text_block() {
        let m = Message::user(Uuid::new_v4(), "hello");
        assert!(!m.is_processed());
        assert_eq!(m.content.len(), 1);
        assert!(matches!(&m.content[0], Block::Text { text } if text == "hello"));
    }

    #[test]
    fn mark_processed_sets_processed_time() {
        let mut m = Message::user(Uuid::new_v4(), "hi");
        m.mark_processed();
        assert!(m.is_processed());
    }

    #[test]
    fn usage_add_accumulates_all_fields() {
        let mut total = Usage::default();
        total.add(&Usage { input_tokens: 5, output_tokens: 2, cache_write_tokens: 0, cache_read_tokens: 0, cost_usd: 0.01 });
        total.add(&Usage { input_tokens: 3, output_tokens: 1, cache_write_tokens: 1, cache_read_tokens: 2, cost_usd: 0.02 });
        assert_eq!(total.input_tokens, 8);
        assert_eq!(total.output_tokens, 3);
        assert_eq!(total.cache_write_tokens, 1);
        assert_eq!(total.cache_read_tokens, 2);
        assert!((total.cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn has_pending_calls_detects_tool_and_script_calls() {
        let task_id = Uuid::new_v4();
        let mut m = Message::new(task_id, MessageSource::Assistant, vec![Block::Text { text: "ok".into() }]);
        assert!(!m.has_pending_calls());
        m.content.push(Block::CodeInterpreterCall { id: "1".into(), script: "print(1)".into() });
        assert!(m.has_pending_calls());
    }
}
