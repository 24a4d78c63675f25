//! Task entity and its declared phase (§3, §4.2).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Usage;

/// Declared high-level state of a task, recomputed by the reconciler on every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitInput,
    InvokeModel,
    ExecuteTools,
    Suspended,
}

/// One user conversation with a specific agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    /// Absolute path the interpreter and its tools are rooted at.
    pub project_dir: std::path::PathBuf,
    pub usage: Usage,
    /// Tool name -> invocation count, accumulated over the task's lifetime.
    pub tool_use_counts: HashMap<String, i64>,
    pub phase: Phase,
    /// User-requested phase; `Suspended` here overrides whatever reconcile would compute.
    pub desired_phase: Option<Phase>,
    pub turn_count: u32,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(agent_id: Uuid, project_dir: std::path::PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id: Some(agent_id),
            project_dir,
            usage: Usage::default(),
            tool_use_counts: HashMap::new(),
            phase: Phase::AwaitInput,
            desired_phase: None,
            turn_count: 0,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[cfg(test)]
    pub fn fixture() -> Self {
        Self::new(Uuid::new_v4(), std::path::PathBuf::from("/tmp/agentcore-fixture"))
    }

    pub fn is_processable(&self) -> bool {
        self.agent_id.is_some()
    }

    pub fn record_tool_use(&mut self, name: &str) {
        *self.tool_use_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_in_await_input_with_no_description() {
        let t = Task::fixture();
        assert_eq!(t.phase, Phase::AwaitInput);
        assert!(t.description.is_empty());
        assert!(t.is_processable());
    }

    #[test]
    fn record_tool_use_increments_per_name_counter() {
        let mut t = Task::fixture();
        t.record_tool_use("read_file");
        t.record_tool_use("read_file");
        t.record_tool_use("grep");
        assert_eq!(t.tool_use_counts["read_file"], 2);
        assert_eq!(t.tool_use_counts["grep"], 1);
    }
}
