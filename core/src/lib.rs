//! Reconciler, interpreter, event hub and provider contract for the coding-agent core.
//!
//! [`engine::Engine`] is the caller-facing facade; everything else is internal
//! machinery it composes: persistence ([`memory_store`]), the task state machine
//! ([`reconciler`]), the sandboxed script runtime ([`interpreter`]) and its tools
//! ([`tools`]), the LLM provider contract ([`provider`]), and outward event
//! delivery ([`hub`]).

pub mod domain;
pub mod engine;
pub mod event_bus;
pub mod hub;
pub mod interceptors;
pub mod interpreter;
pub mod memory_store;
pub mod message;
pub mod proto;
pub mod provider;
pub mod reconciler;
pub mod system_prompt;
pub mod task;
pub mod title_generator;
pub mod tools;

pub use engine::Engine;
