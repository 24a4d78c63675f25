//! Wire protocol for the reconciler's outward-facing events: type + payload + envelope.
//!
//! This crate defines the shape a subscriber actually receives over `Hub::subscribe`.
//! It does not depend on the rest of the core: `core` bridges its own persisted/model
//! representations into `SubscribeResponse` and injects the envelope via `EnvelopeState`.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::{
    MessageMetadata, MessagePart, MessageRole, MessageStatus, MessageUsage, SubscribeResponse,
    TaskEvent, TaskPhase, WireMessage,
};
