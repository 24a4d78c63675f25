//! Caller surface (§6): a thin facade over the store, hub and reconciler. Not
//! itself an RPC or CLI layer — one is expected to sit in front of this.

use std::sync::Arc;

use futures::stream::BoxStream;
use stream_event::SubscribeResponse;
use uuid::Uuid;

use crate::memory_store::{MemoryStore, StoreError};
use crate::message::Message;
use crate::proto;
use crate::reconciler::Reconciler;
use crate::task::{Phase, Task};

pub struct Engine {
    store: Arc<dyn MemoryStore>,
    reconciler: Arc<Reconciler>,
}

impl Engine {
    pub fn new(store: Arc<dyn MemoryStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }

    pub async fn create_task(&self, agent_id: Uuid, project_dir: std::path::PathBuf) -> Result<Uuid, StoreError> {
        let task = Task::new(agent_id, project_dir);
        let id = task.id;
        self.store.create_task(task).await?;
        Ok(id)
    }

    /// Appends a user message, publishes it to the hub (§4.1's "user echo"
    /// envelope), and wakes the reconciler for this task.
    pub async fn append_user_message(&self, task_id: Uuid, text: impl Into<String>) -> Result<(), StoreError> {
        let message = Message::user(task_id, text);
        self.store.append_message(message.clone()).await?;
        self.reconciler
            .hub()
            .publish(task_id, SubscribeResponse::Message(proto::message_to_wire(&message)))
            .await;
        self.reconciler.enqueue(task_id).await;
        Ok(())
    }

    /// Best-effort interruption of whatever step is currently in flight.
    pub async fn cancel_task(&self, task_id: Uuid) {
        self.reconciler.cancel(task_id).await;
    }

    /// Sets the task's desired phase (only `Suspended` has caller-visible meaning
    /// today: it overrides whatever `reconcile` would otherwise compute) and wakes
    /// the reconciler so the change takes effect promptly.
    pub async fn set_desired_phase(&self, task_id: Uuid, phase: Phase) -> Result<(), StoreError> {
        let mut task = self.store.get_task(task_id).await?;
        task.desired_phase = Some(phase);
        self.store.save_task(&task).await?;
        self.reconciler.enqueue(task_id).await;
        Ok(())
    }

    /// Subscribes to a task's event stream; replays a bounded tail of history first.
    pub async fn subscribe(
        &self,
        task_id: Uuid,
    ) -> Result<(BoxStream<'static, serde_json::Value>, impl FnOnce() + Send + 'static), StoreError> {
        self.reconciler.hub().subscribe(task_id).await
    }
}
