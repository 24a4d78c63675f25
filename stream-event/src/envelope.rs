//! Envelope (session/sequence) injection for subscriber-facing events.
//!
//! Each subscriber sees a monotonically increasing `event_id` so it can detect
//! gaps after a `lagged` drop; `session_id` here is the subscription id handed
//! back by `Hub::subscribe`, constant for the lifetime of that subscription.

use crate::event::SubscribeResponse;
use serde_json::Value;

/// Envelope fields attached to each delivered event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Subscription id; constant within one `Hub::subscribe` call.
    pub session_id: Option<String>,
    /// Per-subscriber sequence number; monotonically increasing within a stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Per-subscription sequencing state: session id plus the next `event_id` to hand out.
pub struct EnvelopeState {
    pub session_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            next_event_id: 1,
        }
    }

    /// Injects envelope into the event value and advances the sequence counter.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }
}

/// Converts a subscriber-facing event to JSON and injects the envelope using the given state.
pub fn to_json(
    event: &SubscribeResponse,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        ContentState, MessageMetadata, MessagePart, MessageRole, MessageStatus, WireMessage,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_message() -> SubscribeResponse {
        let id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        SubscribeResponse::Message(WireMessage {
            metadata: MessageMetadata {
                id,
                task_id,
                role: MessageRole::Assistant,
                agent_id: None,
                model_id: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            content: vec![MessagePart::Text {
                content: "hi".to_string(),
            }],
            status: MessageStatus {
                content_state: ContentState::Complete,
                is_final_response: true,
                usage: None,
            },
        })
    }

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"content": []});
        let env = Envelope::new().with_session_id("sub-1").with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["session_id"], "sub-1");
        assert_eq!(obj["event_id"], 1);
    }

    #[test]
    fn to_json_injects_envelope_and_increments() {
        let ev = sample_message();
        let mut state = EnvelopeState::new("sub-42".to_string());
        let first = to_json(&ev, &mut state).unwrap();
        let second = to_json(&ev, &mut state).unwrap();
        assert_eq!(first["session_id"], "sub-42");
        assert_eq!(first["event_id"], 1);
        assert_eq!(second["event_id"], 2);
    }
}
