//! Delaying, de-duplicating work queue keyed by task id (§4.2, §5).
//!
//! One in-flight item per key: a re-`enqueue` while a key is in-flight sets a
//! dirty bit rather than queuing a duplicate entry, and is redelivered on `done`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Uuid>,
    queued: HashSet<Uuid>,
    in_flight: HashSet<Uuid>,
    dirty: HashSet<Uuid>,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        })
    }

    /// Adds `id` immediately unless it's already queued or in flight (in which
    /// case, if in flight, it's marked dirty for redelivery on `done`).
    pub async fn enqueue(self: &Arc<Self>, id: Uuid) {
        let mut state = self.state.lock().await;
        if state.in_flight.contains(&id) {
            state.dirty.insert(id);
            return;
        }
        if state.queued.insert(id) {
            state.pending.push_back(id);
            self.notify.notify_one();
        }
    }

    /// Schedules `id` to be (re-)enqueued after `delay`.
    pub fn enqueue_after(self: &Arc<Self>, id: Uuid, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(id).await;
        });
    }

    /// Pops the next id, suspending the caller until one is available.
    pub async fn get(self: &Arc<Self>) -> Uuid {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(id) = state.pending.pop_front() {
                    state.queued.remove(&id);
                    state.in_flight.insert(id);
                    return id;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Marks `id` as no longer in flight, redelivering it if it was marked
    /// dirty while the previous pass was running.
    pub async fn done(self: &Arc<Self>, id: Uuid) {
        let redeliver = {
            let mut state = self.state.lock().await;
            state.in_flight.remove(&id);
            state.dirty.remove(&id)
        };
        if redeliver {
            self.enqueue(id).await;
        }
    }
}
