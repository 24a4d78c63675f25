//! Tool registry and contract (§4.4): named host functions with descriptions and
//! JSON-schema input, called from the interpreter's sandboxed script.
//!
//! Mirrors the teacher's `Tool`/`ToolSource` split: [`Tool`] is the per-tool
//! implementation; [`ToolRegistry`] stores them by name. Interceptors (see
//! [`crate::interceptors`]) wrap every call before it reaches the handler.

mod ask_user;
mod exec;
pub mod file;
mod handoff;
mod print;
mod registry;
mod submit_report;

pub use ask_user::{AskUserTool, TOOL_ASK_USER};
pub use exec::{ExecuteCommandTool, TOOL_EXECUTE_COMMAND};
pub use handoff::{HandoffTool, TOOL_HANDOFF};
pub use print::{PrintTool, TOOL_PRINT};
pub use registry::ToolRegistry;
pub use submit_report::{SubmitReportTool, TOOL_SUBMIT_REPORT};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::memory_store::MemoryStore;

/// Tool specification: name, description for the LLM, JSON schema for arguments.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Structured result of one tool call: what the interpreter reports back to the script.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ToolCallContent {
    pub value: Value,
}

impl ToolCallContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: Value::String(text.into()),
        }
    }
}

/// Remediation-aware tool failure (§4.4's error convention): carries a user-facing
/// message and suggestions; the interceptor chain attaches the tool name.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Shared handle used to interrupt the interpreter's VM when a task is cancelled (§5).
#[derive(Clone, Default)]
pub struct VmHandle {
    pub cancelled: Arc<AtomicBool>,
}

impl VmHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Per-run context a tool handler executes with (§4.4).
pub struct Session {
    pub task_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub fs_root: PathBuf,
    pub store: Arc<dyn MemoryStore>,
    pub vm: VmHandle,
    /// Set/cleared by the tool-name-tagging interceptor around each call.
    pub current_tool: Mutex<Option<String>>,
    /// Scratchpad interceptors use to pass data to each other (e.g. the "result"
    /// the event-publisher interceptor reads after a call).
    pub scratch: Mutex<HashMap<String, Value>>,
}

impl Session {
    pub fn new(task_id: Uuid, agent_id: Option<Uuid>, fs_root: PathBuf, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            task_id,
            agent_id,
            fs_root,
            store,
            vm: VmHandle::default(),
            current_tool: Mutex::new(None),
            scratch: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the session's VM handle, e.g. so its cancellation flag can be
    /// wired to an external `CancellationToken` before running a script.
    pub fn with_vm(mut self, vm: VmHandle) -> Self {
        self.vm = vm;
        self
    }

    pub async fn put_scratch(&self, key: impl Into<String>, value: Value) {
        self.scratch.lock().await.insert(key.into(), value);
    }

    pub async fn take_scratch(&self, key: &str) -> Option<Value> {
        self.scratch.lock().await.remove(key)
    }
}

/// A single host function the interpreter can call by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    async fn call(&self, args: Value, session: &Session) -> Result<ToolCallContent, ToolError>;
}
