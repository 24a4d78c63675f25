//! Bidirectional conversion among persisted blocks, internal messages, and the
//! external wire form (§4.5). This is the only place that knows the shape tool-call
//! and tool-result payloads take on the wire; every other component treats
//! `Block`/`MessagePart` as opaque.
//!
//! The interpreter's script call is bridged to the `code_interpreter` tool name on
//! the wire (matching §6's enumeration of `code_interpreter_call`/`code_interpreter_result`
//! as block kinds); everything else is a native tool call/result pass-through.

use thiserror::Error;
use uuid::Uuid;

use stream_event::{
    ContentState, MessageMetadata, MessagePart, MessageRole, MessageStatus, MessageUsage,
    WireMessage,
};

use crate::message::{Block, Message, MessageSource, Usage};

pub(crate) const CODE_INTERPRETER_TOOL_NAME: &str = "code_interpreter";

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unknown block kind: {0}")]
    UnknownBlockKind(String),
    #[error("malformed payload for {tool}: {detail}")]
    MalformedPayload { tool: String, detail: String },
}

fn source_to_role(source: MessageSource) -> MessageRole {
    match source {
        MessageSource::User => MessageRole::User,
        MessageSource::Assistant => MessageRole::Assistant,
        MessageSource::System => MessageRole::System,
    }
}

fn role_to_source(role: MessageRole) -> MessageSource {
    match role {
        MessageRole::User => MessageSource::User,
        MessageRole::Assistant => MessageSource::Assistant,
        MessageRole::System => MessageSource::System,
    }
}

fn usage_to_wire(usage: &Usage) -> MessageUsage {
    MessageUsage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_write_tokens: usage.cache_write_tokens,
        cache_read_tokens: usage.cache_read_tokens,
        cost_usd: usage.cost_usd,
    }
}

fn wire_to_usage(usage: &MessageUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_write_tokens: usage.cache_write_tokens,
        cache_read_tokens: usage.cache_read_tokens,
        cost_usd: usage.cost_usd,
    }
}

/// Converts one persisted block to its wire representation.
pub fn block_to_part(block: &Block) -> MessagePart {
    match block {
        Block::Text { text } => MessagePart::Text { content: text.clone() },
        Block::NativeToolCall { name, input, .. } => MessagePart::ToolCall {
            tool_name: name.clone(),
            input: input.clone(),
        },
        Block::NativeToolResult { name, result, .. } => MessagePart::ToolResult {
            tool_name: name.clone(),
            result: result.clone(),
        },
        Block::CodeInterpreterCall { script, .. } => MessagePart::ToolCall {
            tool_name: CODE_INTERPRETER_TOOL_NAME.to_string(),
            input: serde_json::json!({ "script": script }),
        },
        Block::CodeInterpreterResult {
            console_output,
            tool_stats,
            ..
        } => MessagePart::ToolResult {
            tool_name: CODE_INTERPRETER_TOOL_NAME.to_string(),
            result: serde_json::json!({
                "console_output": console_output,
                "tool_stats": tool_stats,
            }),
        },
    }
}

/// Converts one wire part back to a persisted block. Calls/results addressed to
/// `code_interpreter` round-trip to the script variants; everything else is native.
pub fn part_to_block(part: &MessagePart) -> Result<Block, ProtoError> {
    match part {
        MessagePart::Text { content } => Ok(Block::Text { text: content.clone() }),
        MessagePart::Error { message } => Ok(Block::Text {
            text: format!("error: {message}"),
        }),
        MessagePart::ToolCall { tool_name, input } if tool_name == CODE_INTERPRETER_TOOL_NAME => {
            let script = input
                .get("script")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProtoError::MalformedPayload {
                    tool: tool_name.clone(),
                    detail: "missing script field".into(),
                })?
                .to_string();
            Ok(Block::CodeInterpreterCall {
                id: Uuid::new_v4().to_string(),
                script,
            })
        }
        MessagePart::ToolCall { tool_name, input } => Ok(Block::NativeToolCall {
            id: Uuid::new_v4().to_string(),
            name: tool_name.clone(),
            input: input.clone(),
        }),
        MessagePart::ToolResult { tool_name, result } if tool_name == CODE_INTERPRETER_TOOL_NAME => {
            let console_output = result
                .get("console_output")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let tool_stats = result
                .get("tool_stats")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            Ok(Block::CodeInterpreterResult {
                call_id: Uuid::new_v4().to_string(),
                console_output,
                tool_stats,
            })
        }
        MessagePart::ToolResult { tool_name, result } => Ok(Block::NativeToolResult {
            call_id: Uuid::new_v4().to_string(),
            name: tool_name.clone(),
            result: result.clone(),
        }),
    }
}

/// Converts a persisted message to the wire form delivered over `Hub::subscribe`.
pub fn message_to_wire(message: &Message) -> WireMessage {
    WireMessage {
        metadata: MessageMetadata {
            id: message.id,
            task_id: message.task_id,
            role: source_to_role(message.source),
            agent_id: None,
            model_id: None,
            created_at: message.created_at,
            updated_at: message.updated_at,
        },
        content: message.content.iter().map(block_to_part).collect(),
        status: MessageStatus {
            content_state: if message.is_processed() {
                ContentState::Complete
            } else {
                ContentState::Partial
            },
            is_final_response: message.is_processed() && message.source == MessageSource::Assistant,
            usage: message.usage.as_ref().map(usage_to_wire),
        },
    }
}

/// Converts a wire message back into a persisted message. Used when a caller's
/// `append_user_message` arrives already shaped as a `WireMessage`.
pub fn wire_to_message(wire: &WireMessage) -> Result<Message, ProtoError> {
    let content = wire
        .content
        .iter()
        .map(part_to_block)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Message {
        id: wire.metadata.id,
        task_id: wire.metadata.task_id,
        source: role_to_source(wire.metadata.role),
        content,
        usage: wire.status.usage.as_ref().map(wire_to_usage),
        processed_time: None,
        created_at: wire.metadata.created_at,
        updated_at: wire.metadata.updated_at,
    })
}
