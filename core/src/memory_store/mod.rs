//! Transactional persistence of agents, models, tasks, messages, usage (§3, §4 overview).
//!
//! [`MemoryStore`] is the real contract; the reconciler is written against
//! `Arc<dyn MemoryStore>` so a durable backend can be swapped in without touching it.
//! [`InMemoryStore`] is the concrete in-process implementation shipped here.

mod in_memory;

pub use in_memory::InMemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Agent, Model, ModelProviderConfig};
use crate::message::Message;
use crate::task::Task;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Transactional persistence contract.
///
/// `InMemoryStore` guarantees writes made inside [`MemoryStore::save_task_and_message`]
/// (the one multi-row write the reconciler performs) are serializable per task; callers
/// needing the abstract "transaction(fn)" primitive called out in the design should use
/// that method rather than issuing separate `save_task`/`append_message` calls under
/// concurrent access. See DESIGN.md for why this is a dedicated method rather than a
/// generic closure parameter on the trait (trait objects can't carry generic methods).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn create_task(&self, task: Task) -> Result<(), StoreError>;
    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError>;
    async fn save_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Appends a message, marking it unprocessed by default.
    async fn append_message(&self, message: Message) -> Result<(), StoreError>;
    async fn save_message(&self, message: &Message) -> Result<(), StoreError>;

    /// Atomically persists the task (phase/usage/counters) and one message together,
    /// serialized per task id. This is the `transaction(fn)` primitive from §5.
    async fn save_task_and_message(
        &self,
        task: &Task,
        message: Message,
    ) -> Result<(), StoreError>;

    /// All messages for a task with `processed_time.is_none()`, in create-time order.
    async fn unprocessed_messages(&self, task_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// All messages for a task in create-time order (the task's total order, §3c).
    async fn all_messages(&self, task_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// Most recent `limit` messages in create-time order (oldest first), for hub replay.
    async fn recent_messages(&self, task_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError>;

    async fn get_agent(&self, id: Uuid) -> Result<Agent, StoreError>;
    async fn get_agent_by_name(&self, name: &str) -> Result<Agent, StoreError>;
    async fn put_agent(&self, agent: Agent) -> Result<(), StoreError>;

    async fn get_model(&self, id: Uuid) -> Result<Model, StoreError>;
    async fn put_model(&self, model: Model) -> Result<(), StoreError>;

    async fn get_provider_config(&self, id: Uuid) -> Result<ModelProviderConfig, StoreError>;
    async fn put_provider_config(&self, config: ModelProviderConfig) -> Result<(), StoreError>;
}
