//! Single-flight background title generation (§4.2): concurrent callers for the
//! same task id join the same in-flight attempt instead of issuing a second
//! provider call.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::warn;
use uuid::Uuid;

use crate::memory_store::MemoryStore;
use crate::message::{Message, MessageSource};
use crate::provider::{InvokeOptions, ModelProvider};

pub struct TitleGenerator {
    inflight: Mutex<HashMap<Uuid, Arc<Notify>>>,
}

impl Default for TitleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TitleGenerator {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Generates and persists a title for `task_id` if it still has none, unless
    /// a generation for this task id is already running (in which case this call
    /// waits for it and returns without doing any work itself).
    pub async fn generate_once(
        &self,
        task_id: Uuid,
        store: Arc<dyn MemoryStore>,
        provider: Arc<dyn ModelProvider>,
        model_name: &str,
    ) {
        let existing = {
            let mut guard = self.inflight.lock().await;
            match guard.get(&task_id) {
                Some(notify) => Some(notify.clone()),
                None => {
                    guard.insert(task_id, Arc::new(Notify::new()));
                    None
                }
            }
        };

        if let Some(notify) = existing {
            notify.notified().await;
            return;
        }

        if let Err(e) = self.run(task_id, &store, &*provider, model_name).await {
            warn!(%task_id, error = %e, "title generation failed");
        }

        if let Some(notify) = self.inflight.lock().await.remove(&task_id) {
            notify.notify_waiters();
        }
    }

    async fn run(
        &self,
        task_id: Uuid,
        store: &Arc<dyn MemoryStore>,
        provider: &dyn ModelProvider,
        model_name: &str,
    ) -> Result<(), crate::memory_store::StoreError> {
        let mut task = store.get_task(task_id).await?;
        if !task.description.is_empty() {
            return Ok(());
        }

        let messages = store.all_messages(task_id).await?;
        let first_user = messages.iter().find(|m| m.source == MessageSource::User);
        let Some(first_user) = first_user else {
            return Ok(());
        };

        let prompt = "Summarize the user's request in five words or fewer, as a task title.";
        let response = provider
            .invoke_model(model_name, prompt, std::slice::from_ref(first_user), InvokeOptions::default())
            .await;

        let title = match response {
            Ok(resp) => resp
                .content
                .iter()
                .find_map(|block| match block {
                    crate::message::Block::Text { text } => Some(text.trim().to_string()),
                    _ => None,
                })
                .unwrap_or_default(),
            Err(_) => return Ok(()),
        };

        if title.is_empty() {
            return Ok(());
        }

        task.description = title;
        store.save_task(&task).await?;
        Ok(())
    }
}
