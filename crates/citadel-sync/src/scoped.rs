use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use citadel_store::{SocialStore, StoreError};
use citadel_types::keys;
use citadel_types::models::{ChannelLog, Message};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::{next_signal, Signal, SyncLayer};

pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Cancellation handle for a scoped subscription. Cancels on `cancel()` or
/// drop; independent of any session-level subscription.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SyncLayer {
    /// Observe one channel's message log; `callback` fires once per appended
    /// message. Messages already in the log do not replay.
    pub async fn subscribe_channel(
        &self,
        bastion_id: &str,
        channel_id: &str,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_log(keys::channel_key(bastion_id, channel_id), Arc::new(callback))
            .await
    }

    /// Observe one DM thread; `callback` fires once per appended message from
    /// either participant.
    pub async fn subscribe_thread(
        &self,
        user_a: &str,
        user_b: &str,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_log(keys::thread_key(user_a, user_b), Arc::new(callback))
            .await
    }

    async fn subscribe_log(&self, key: String, callback: MessageCallback) -> Subscription {
        let store = self.store();
        let watch = store.watch();
        let seen = match read_ids(&store, &key).await {
            Ok(seen) => seen,
            Err(err) => {
                debug!("scoped subscription on {key}: baseline read failed: {err}");
                HashSet::new()
            }
        };
        let poll_interval = self.poll_interval();

        Subscription {
            task: tokio::spawn(async move {
                run_scoped(store, key, watch, seen, callback, poll_interval).await;
            }),
        }
    }
}

async fn read_ids(
    store: &Arc<dyn SocialStore>,
    key: &str,
) -> Result<HashSet<Uuid>, StoreError> {
    match store.get(key).await? {
        // DM threads and channel logs share the message-list shape.
        Some(value) => {
            let log: ChannelLog = serde_json::from_value(value)?;
            Ok(log.messages.iter().map(|m| m.id).collect())
        }
        None => Ok(HashSet::new()),
    }
}

async fn run_scoped(
    store: Arc<dyn SocialStore>,
    key: String,
    mut watch: Option<tokio::sync::broadcast::Receiver<citadel_store::StoreChange>>,
    mut seen: HashSet<Uuid>,
    callback: MessageCallback,
    poll_interval: Duration,
) {
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    poll.tick().await;

    loop {
        let relevant = match next_signal(&mut watch, &mut poll).await {
            Signal::Changed(changed) => changed == key,
            Signal::Sweep => true,
        };
        if !relevant {
            continue;
        }

        match store.get(&key).await {
            Ok(Some(value)) => {
                let Ok(log) = serde_json::from_value::<ChannelLog>(value) else {
                    continue;
                };
                for message in &log.messages {
                    if seen.insert(message.id) {
                        callback(message);
                    }
                }
                // Ids evicted off the capped log cannot come back; dropping
                // them keeps the set bounded by the log itself.
                let current: HashSet<Uuid> = log.messages.iter().map(|m| m.id).collect();
                seen.retain(|id| current.contains(id));
            }
            Ok(None) => {}
            Err(err) => debug!("scoped subscription on {key}: read failed: {err}"),
        }
    }
}
