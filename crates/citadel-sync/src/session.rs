use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use citadel_store::{SocialStore, StoreError};
use citadel_types::keys;
use citadel_types::models::{DmThread, Message, Notification, NotificationKind, User, UserStatus};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{next_signal, Signal};

/// Poll cadence when the backend offers no push channel, and the safety-net
/// cadence when it does.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Callback surface for one subscribed session. All methods default to
/// no-ops so implementers override only what they present.
pub trait SessionListener: Send + Sync {
    fn on_new_notification(&self, _notification: &Notification) {}
    fn on_new_dm(&self, _partner: &str, _message: &Message) {}
    fn on_friend_request(&self, _from: &str) {}
    fn on_friend_accept(&self, _from: &str) {}
    fn on_status_change(&self, _username: &str, _status: UserStatus) {}
}

/// Session-level subscriptions: at most one listener task per username.
pub struct SyncLayer {
    store: Arc<dyn SocialStore>,
    poll_interval: Duration,
    sessions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SyncLayer {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self::with_poll_interval(store, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(store: Arc<dyn SocialStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn SocialStore> {
        self.store.clone()
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Establish the session subscription for `username`, tearing down any
    /// previous one first. The baseline snapshot is taken before this
    /// returns: everything already in the store counts as delivered, and
    /// every later mutation fires callbacks exactly once.
    pub async fn subscribe(&self, username: &str, listener: Arc<dyn SessionListener>) {
        let username = username.to_lowercase();
        self.unsubscribe(&username);

        // Acquire the push channel before the snapshot so no mutation can
        // slip between them unobserved.
        let watch = self.store.watch();
        let state = match SessionState::snapshot(&self.store, &username).await {
            Ok(state) => state,
            Err(err) => {
                warn!("session {username}: baseline snapshot failed: {err}");
                SessionState::empty()
            }
        };

        let store = self.store.clone();
        let me = username.clone();
        let poll_interval = self.poll_interval;
        let task = tokio::spawn(async move {
            run_session(store, me, listener, watch, state, poll_interval).await;
        });

        // Two concurrent subscribes for the same name can both get past the
        // unsubscribe above; the loser of the insert race is aborted here.
        let replaced = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .insert(username.clone(), task);
        if let Some(previous) = replaced {
            previous.abort();
        }
        info!("session {username} subscribed");
    }

    /// Cancel the session subscription. Idempotent; callable even if
    /// `username` never subscribed.
    pub fn unsubscribe(&self, username: &str) {
        let removed = self
            .sessions
            .lock()
            .expect("session registry lock poisoned")
            .remove(&username.to_lowercase());
        if let Some(task) = removed {
            task.abort();
            debug!("session {username} unsubscribed");
        }
    }
}

impl Drop for SyncLayer {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            for (_, task) in sessions.drain() {
                task.abort();
            }
        }
    }
}

/// Last-delivered markers for one session. Shared by the push and poll paths;
/// whichever notices a change first advances the markers, so the other cannot
/// re-fire the same logical event.
struct SessionState {
    started_at: DateTime<Utc>,
    seen_notifications: HashSet<String>,
    friends: HashSet<String>,
    statuses: HashMap<String, UserStatus>,
    thread_heads: HashMap<String, usize>,
}

impl SessionState {
    fn empty() -> Self {
        Self {
            started_at: Utc::now(),
            seen_notifications: HashSet::new(),
            friends: HashSet::new(),
            statuses: HashMap::new(),
            thread_heads: HashMap::new(),
        }
    }

    async fn snapshot(store: &Arc<dyn SocialStore>, me: &str) -> Result<Self, StoreError> {
        let mut state = Self::empty();

        let Some(value) = store.get(&keys::user_key(me)).await? else {
            return Ok(state);
        };
        let user: User = serde_json::from_value(value)?;

        state.seen_notifications = user.notifications.iter().map(|n| n.id.clone()).collect();
        state.friends = user.friends.iter().cloned().collect();

        for friend in &user.friends {
            if let Some(value) = store.get(&keys::user_key(friend)).await? {
                if let Ok(record) = serde_json::from_value::<User>(value) {
                    state.statuses.insert(friend.clone(), record.status);
                }
            }
        }

        for partner in &user.dm_partners {
            let key = keys::thread_key(me, partner);
            let head = match store.get(&key).await? {
                Some(value) => serde_json::from_value::<DmThread>(value)?.messages.len(),
                None => 0,
            };
            state.thread_heads.insert(key, head);
        }

        Ok(state)
    }
}

async fn run_session(
    store: Arc<dyn SocialStore>,
    me: String,
    listener: Arc<dyn SessionListener>,
    mut watch: Option<tokio::sync::broadcast::Receiver<citadel_store::StoreChange>>,
    mut state: SessionState,
    poll_interval: Duration,
) {
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; the baseline snapshot already
    // covers that instant.
    poll.tick().await;

    loop {
        let outcome = match next_signal(&mut watch, &mut poll).await {
            Signal::Changed(key) => {
                reconcile_key(&store, &me, &key, &mut state, listener.as_ref()).await
            }
            Signal::Sweep => reconcile_all(&store, &me, &mut state, listener.as_ref()).await,
        };
        if let Err(err) = outcome {
            debug!("session {me}: reconcile failed, will retry on next signal: {err}");
        }
    }
}

async fn reconcile_key(
    store: &Arc<dyn SocialStore>,
    me: &str,
    key: &str,
    state: &mut SessionState,
    listener: &dyn SessionListener,
) -> Result<(), StoreError> {
    if key == keys::user_key(me) {
        reconcile_self(store, me, state, listener).await?;
        return Ok(());
    }

    if let Some((a, b)) = keys::thread_participants(key) {
        let partner = if a == me {
            Some(b.to_string())
        } else if b == me {
            Some(a.to_string())
        } else {
            None
        };
        if let Some(partner) = partner {
            reconcile_thread(store, me, &partner, state, listener).await?;
        }
        return Ok(());
    }

    if let Some(other) = key.strip_prefix("users/") {
        let other = other.to_string();
        reconcile_status(store, &other, state, listener).await?;
    }

    Ok(())
}

async fn reconcile_all(
    store: &Arc<dyn SocialStore>,
    me: &str,
    state: &mut SessionState,
    listener: &dyn SessionListener,
) -> Result<(), StoreError> {
    let Some(user) = reconcile_self(store, me, state, listener).await? else {
        return Ok(());
    };

    for partner in &user.dm_partners {
        reconcile_thread(store, me, partner, state, listener).await?;
    }
    for friend in &user.friends {
        reconcile_status(store, friend, state, listener).await?;
    }
    Ok(())
}

/// Diff the session's own record: new notifications (firing kind-specific
/// callbacks too) and the authoritative friends list.
async fn reconcile_self(
    store: &Arc<dyn SocialStore>,
    me: &str,
    state: &mut SessionState,
    listener: &dyn SessionListener,
) -> Result<Option<User>, StoreError> {
    let Some(value) = store.get(&keys::user_key(me)).await? else {
        return Ok(None);
    };
    let user: User = serde_json::from_value(value)?;

    // Stored newest-first; deliver oldest-first.
    let fresh: Vec<&Notification> = user
        .notifications
        .iter()
        .filter(|n| !state.seen_notifications.contains(&n.id))
        .collect();
    for notification in fresh.into_iter().rev() {
        listener.on_new_notification(notification);
        match notification.kind {
            NotificationKind::FriendRequest => listener.on_friend_request(&notification.from),
            NotificationKind::FriendAccept => listener.on_friend_accept(&notification.from),
            // The thread reconcile carries the message payload.
            NotificationKind::Dm => {}
        }
    }

    // Entries truncated off the capped log can never re-fire, so tracking
    // exactly the current ids keeps this set bounded.
    state.seen_notifications = user.notifications.iter().map(|n| n.id.clone()).collect();

    state.friends = user.friends.iter().cloned().collect();
    let friends = state.friends.clone();
    state.statuses.retain(|name, _| friends.contains(name));

    Ok(Some(user))
}

/// Diff one DM thread against its delivered head. Threads first observed
/// mid-session replay nothing older than the session itself.
async fn reconcile_thread(
    store: &Arc<dyn SocialStore>,
    me: &str,
    partner: &str,
    state: &mut SessionState,
    listener: &dyn SessionListener,
) -> Result<(), StoreError> {
    let key = keys::thread_key(me, partner);
    let Some(value) = store.get(&key).await? else {
        return Ok(());
    };
    let thread: DmThread = serde_json::from_value(value)?;

    let head = match state.thread_heads.get(&key) {
        Some(head) => (*head).min(thread.messages.len()),
        None => thread
            .messages
            .partition_point(|m| m.sent_at < state.started_at),
    };

    for message in &thread.messages[head..] {
        if message.sender != me {
            listener.on_new_dm(partner, message);
        }
    }
    state.thread_heads.insert(key, thread.messages.len());
    Ok(())
}

/// Presence fan-out for friends. The first observation of a friend's status
/// sets the baseline without firing.
async fn reconcile_status(
    store: &Arc<dyn SocialStore>,
    other: &str,
    state: &mut SessionState,
    listener: &dyn SessionListener,
) -> Result<(), StoreError> {
    if !state.friends.contains(other) {
        return Ok(());
    }
    let Some(value) = store.get(&keys::user_key(other)).await? else {
        return Ok(());
    };
    let Ok(user) = serde_json::from_value::<User>(value) else {
        return Ok(());
    };

    let previous = state.statuses.insert(other.to_string(), user.status);
    if let Some(previous) = previous {
        if previous != user.status {
            listener.on_status_change(other, user.status);
        }
    }
    Ok(())
}
