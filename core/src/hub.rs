//! Per-task event fan-out to subscribers (§4.1, §5), with history replay on subscribe.
//!
//! `Hub` is a cheap, `Clone`-able handle (an `Arc` internally, matching the design
//! notes' preference for explicit handles over ambient globals). Publishers never
//! block: delivery to each subscriber's bounded channel uses `try_send`, and a
//! subscriber that can't keep up is dropped rather than slowing everyone else down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use stream_event::{EnvelopeState, SubscribeResponse};

use crate::memory_store::{MemoryStore, StoreError};
use crate::proto;

const SUBSCRIBER_BUFFER: usize = 256;
const DEFAULT_REPLAY_DEPTH: usize = 50;

/// Item handed to a subscriber's channel: either a real event, or a marker that the
/// subscriber missed events because it could not keep up (buffer overflow).
enum HubItem {
    Event(SubscribeResponse),
    Lagged,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<HubItem>,
    lagged: Arc<AtomicBool>,
}

struct HubInner {
    store: Arc<dyn MemoryStore>,
    subscribers: RwLock<HashMap<Uuid, Vec<Subscriber>>>,
    replay_depth: usize,
}

#[derive(Clone)]
pub struct Hub(Arc<HubInner>);

impl Hub {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self::with_replay_depth(store, DEFAULT_REPLAY_DEPTH)
    }

    pub fn with_replay_depth(store: Arc<dyn MemoryStore>, replay_depth: usize) -> Self {
        Self(Arc::new(HubInner {
            store,
            subscribers: RwLock::new(HashMap::new()),
            replay_depth,
        }))
    }

    /// Delivers `event` to every current subscriber of `task_id`. Never blocks: a
    /// subscriber whose buffer is full is marked lagged and dropped.
    pub async fn publish(&self, task_id: Uuid, event: SubscribeResponse) {
        let subs = {
            let table = self.0.subscribers.read().await;
            match table.get(&task_id) {
                Some(list) => list.iter().map(|s| (s.id, s.tx.clone(), s.lagged.clone())).collect::<Vec<_>>(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, tx, lagged) in subs {
            if tx.try_send(HubItem::Event(event.clone())).is_err() {
                lagged.store(true, Ordering::SeqCst);
                let _ = tx.try_send(HubItem::Lagged);
                warn!(%task_id, subscriber = %id, "subscriber lagged, dropping");
                dead.push(id);
            }
        }
        if !dead.is_empty() {
            let mut table = self.0.subscribers.write().await;
            if let Some(list) = table.get_mut(&task_id) {
                list.retain(|s| !dead.contains(&s.id));
            }
        }
    }

    /// Subscribes to `task_id`: returns a stream that first replays a bounded tail
    /// of persisted history, then delivers live events, each stamped with this
    /// subscription's envelope (session id + monotonically increasing event id).
    /// The returned closure unsubscribes (idempotent).
    pub async fn subscribe(
        &self,
        task_id: Uuid,
    ) -> Result<(BoxStream<'static, serde_json::Value>, impl FnOnce() + Send + 'static), StoreError>
    {
        let sub_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let lagged = Arc::new(AtomicBool::new(false));

        {
            let mut table = self.0.subscribers.write().await;
            table.entry(task_id).or_default().push(Subscriber {
                id: sub_id,
                tx,
                lagged,
            });
        }

        let history = self.0.store.recent_messages(task_id, self.0.replay_depth).await?;
        let replay: Vec<SubscribeResponse> = history
            .iter()
            .map(|m| SubscribeResponse::Message(proto::message_to_wire(m)))
            .collect();

        let live = tokio_stream::wrappers::ReceiverStream::new(rx).filter_map(|item| async move {
            match item {
                HubItem::Event(e) => Some(e),
                HubItem::Lagged => None,
            }
        });

        let combined = stream::iter(replay).chain(live);

        let mut state = EnvelopeState::new(sub_id.to_string());
        let stamped = combined
            .map(move |event| stream_event::to_json(&event, &mut state).unwrap_or(serde_json::Value::Null))
            .boxed();

        let hub = self.clone();
        let unsubscribe = move || {
            tokio::spawn(async move {
                let mut table = hub.0.subscribers.write().await;
                if let Some(list) = table.get_mut(&task_id) {
                    list.retain(|s| s.id != sub_id);
                }
            });
        };

        Ok((stamped, unsubscribe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageSource};
    use crate::memory_store::InMemoryStore;
    use crate::task::Task;

    #[tokio::test]
    async fn subscribe_replays_history_then_live_event() {
        let store = Arc::new(InMemoryStore::new());
        let task = Task::fixture();
        store.create_task(task.clone()).await.unwrap();
        let mut past = Message::user(task.id, "hello");
        past.mark_processed();
        store.append_message(past).await.unwrap();

        let hub = Hub::new(store);
        let (mut stream, _unsub) = hub.subscribe(task.id).await.unwrap();

        let first = stream.next().await.unwrap();
        assert!(first.get("content").is_some(), "{first:?}");
        assert_eq!(first["event_id"], 1);

        let live_msg = Message::user(task.id, "live");
        hub.publish(task.id, SubscribeResponse::Message(proto::message_to_wire(&live_msg)))
            .await;

        let second = stream.next().await.unwrap();
        assert_eq!(second["event_id"], 2);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let hub = Hub::new(store);
        let task_id = Uuid::new_v4();
        let msg = Message::user(task_id, "x");
        hub.publish(task_id, SubscribeResponse::Message(proto::message_to_wire(&msg)))
            .await;
    }
}
