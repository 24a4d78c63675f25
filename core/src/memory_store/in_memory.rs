//! In-process `MemoryStore`. Not persistent; per-task writes are serialized via a
//! per-task `tokio::sync::Mutex` so `save_task_and_message` is atomic with respect
//! to other writers of the same task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::{Agent, Model, ModelProviderConfig};
use crate::message::Message;
use crate::task::Task;

use super::{MemoryStore, StoreError};

#[derive(Default)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    messages: RwLock<HashMap<Uuid, Vec<Message>>>,
    agents: RwLock<HashMap<Uuid, Agent>>,
    models: RwLock<HashMap<Uuid, Model>>,
    providers: RwLock<HashMap<Uuid, ModelProviderConfig>>,
    /// One lock per task id, created lazily; guards `save_task_and_message`.
    task_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, task_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.task_locks.read().await.get(&task_id) {
            return lock.clone();
        }
        let mut locks = self.task_locks.write().await;
        locks
            .entry(task_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn create_task(&self, task: Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
    }

    async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn append_message(&self, message: Message) -> Result<(), StoreError> {
        self.messages
            .write()
            .await
            .entry(message.task_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut all = self.messages.write().await;
        let list = all
            .get_mut(&message.task_id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", message.task_id)))?;
        let slot = list
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message.id)))?;
        *slot = message.clone();
        Ok(())
    }

    async fn save_task_and_message(
        &self,
        task: &Task,
        message: Message,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(task.id).await;
        let _guard = lock.lock().await;
        self.tasks.write().await.insert(task.id, task.clone());
        self.messages
            .write()
            .await
            .entry(task.id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn unprocessed_messages(&self, task_id: Uuid) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .get(&task_id)
            .map(|list| list.iter().filter(|m| !m.is_processed()).cloned().collect())
            .unwrap_or_default())
    }

    async fn all_messages(&self, task_id: Uuid) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_messages(&self, task_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        let all = self.all_messages(task_id).await?;
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn get_agent(&self, id: Uuid) -> Result<Agent, StoreError> {
        self.agents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("agent {id}")))
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<Agent, StoreError> {
        self.agents
            .read()
            .await
            .values()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("agent named {name}")))
    }

    async fn put_agent(&self, agent: Agent) -> Result<(), StoreError> {
        self.agents.write().await.insert(agent.id, agent);
        Ok(())
    }

    async fn get_model(&self, id: Uuid) -> Result<Model, StoreError> {
        self.models
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("model {id}")))
    }

    async fn put_model(&self, model: Model) -> Result<(), StoreError> {
        self.models.write().await.insert(model.id, model);
        Ok(())
    }

    async fn get_provider_config(&self, id: Uuid) -> Result<ModelProviderConfig, StoreError> {
        self.providers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("provider config {id}")))
    }

    async fn put_provider_config(&self, config: ModelProviderConfig) -> Result<(), StoreError> {
        self.providers.write().await.insert(config.id, config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageSource;

    #[tokio::test]
    async fn create_and_get_task_roundtrips() {
        let store = InMemoryStore::new();
        let task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();
        let got = store.get_task(task.id).await.unwrap();
        assert_eq!(got.id, task.id);
    }

    #[tokio::test]
    async fn get_task_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get_task(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn unprocessed_messages_excludes_processed() {
        let store = InMemoryStore::new();
        let task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();
        let mut m1 = Message::new(task.id, MessageSource::User, vec![]);
        m1.mark_processed();
        let m2 = Message::new(task.id, MessageSource::User, vec![]);
        store.append_message(m1).await.unwrap();
        store.append_message(m2.clone()).await.unwrap();
        let pending = store.unprocessed_messages(task.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, m2.id);
    }

    #[tokio::test]
    async fn save_task_and_message_is_atomic_per_task() {
        let store = InMemoryStore::new();
        let mut task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();
        task.turn_count += 1;
        let msg = Message::new(task.id, MessageSource::Assistant, vec![]);
        store.save_task_and_message(&task, msg).await.unwrap();
        let got = store.get_task(task.id).await.unwrap();
        assert_eq!(got.turn_count, 1);
        assert_eq!(store.all_messages(task.id).await.unwrap().len(), 1);
    }
}
