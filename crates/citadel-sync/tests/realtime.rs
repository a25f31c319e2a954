use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use citadel_core::SocialGraph;
use citadel_store::{MemoryStore, SocialStore, StoreChange, StoreError, TxApply};
use citadel_sync::{SessionListener, SyncLayer};
use citadel_types::models::{Message, Notification, NotificationKind, UserStatus};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Notification(NotificationKind, String),
    Dm(String, String),
    FriendRequest(String),
    FriendAccept(String),
    Status(String, UserStatus),
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<Event>>,
}

impl Recording {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionListener for Recording {
    fn on_new_notification(&self, notification: &Notification) {
        self.push(Event::Notification(
            notification.kind,
            notification.from.clone(),
        ));
    }

    fn on_new_dm(&self, partner: &str, message: &Message) {
        self.push(Event::Dm(partner.to_string(), message.text.clone()));
    }

    fn on_friend_request(&self, from: &str) {
        self.push(Event::FriendRequest(from.to_string()));
    }

    fn on_friend_accept(&self, from: &str) {
        self.push(Event::FriendAccept(from.to_string()));
    }

    fn on_status_change(&self, username: &str, status: UserStatus) {
        self.push(Event::Status(username.to_string(), status));
    }
}

/// Delegates to MemoryStore but hides its push channel, forcing subscribers
/// onto the polling rung.
struct NoPush(MemoryStore);

#[async_trait]
impl SocialStore for NoPush {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.0.set(key, value).await
    }

    async fn update(
        &self,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.0.update(key, fields).await
    }

    async fn transaction(&self, key: &str, apply: TxApply) -> Result<Option<Value>, StoreError> {
        self.0.transaction(key, apply).await
    }

    fn watch(&self) -> Option<broadcast::Receiver<StoreChange>> {
        None
    }
}

async fn wait_for(cond: impl Fn() -> bool) -> bool {
    for _ in 0..300 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn graph_with_users(store: Arc<dyn SocialStore>, users: &[&str]) -> SocialGraph {
    let graph = SocialGraph::new(store);
    for username in users {
        graph.create_user(username, "").await.unwrap();
    }
    graph
}

#[tokio::test]
async fn push_delivery_needs_no_polling() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    // Poll effectively disabled: any delivery must come over the push channel.
    let sync = SyncLayer::with_poll_interval(store, Duration::from_secs(3600));

    let listener = Arc::new(Recording::default());
    sync.subscribe("bob", listener.clone()).await;

    graph.send_request("alice", "bob").await.unwrap();

    assert!(
        wait_for(|| listener
            .events()
            .contains(&Event::FriendRequest("alice".into())))
        .await
    );
    assert!(listener
        .events()
        .contains(&Event::Notification(NotificationKind::FriendRequest, "alice".into())));
}

#[tokio::test]
async fn poll_fallback_covers_watchless_backends() {
    let store: Arc<dyn SocialStore> = Arc::new(NoPush(MemoryStore::new()));
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    let listener = Arc::new(Recording::default());
    sync.subscribe("bob", listener.clone()).await;

    graph.send_request("alice", "bob").await.unwrap();

    assert!(
        wait_for(|| listener
            .events()
            .contains(&Event::FriendRequest("alice".into())))
        .await
    );
}

#[tokio::test]
async fn events_fire_once_with_both_strategies_active() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    // Push available AND aggressive polling: still at most one delivery.
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    let listener = Arc::new(Recording::default());
    sync.subscribe("bob", listener.clone()).await;

    graph.send_request("alice", "bob").await.unwrap();

    assert!(
        wait_for(|| !listener.events().is_empty()).await
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    let events = listener.events();
    let requests = events
        .iter()
        .filter(|e| matches!(e, Event::FriendRequest(_)))
        .count();
    let notifications = events
        .iter()
        .filter(|e| matches!(e, Event::Notification(..)))
        .count();
    assert_eq!(requests, 1);
    assert_eq!(notifications, 1);
}

#[tokio::test]
async fn resubscribing_replaces_the_previous_listener() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    let first = Arc::new(Recording::default());
    let second = Arc::new(Recording::default());
    sync.subscribe("bob", first.clone()).await;
    sync.subscribe("bob", second.clone()).await;

    graph.send_request("alice", "bob").await.unwrap();

    assert!(
        wait_for(|| second
            .events()
            .contains(&Event::FriendRequest("alice".into())))
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(first.events().is_empty());
}

#[tokio::test]
async fn concurrent_subscribes_keep_a_single_session() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    // Interleaved on one task: neither subscribe sees the other's session
    // in the registry when it starts, so the insert race decides.
    let first = Arc::new(Recording::default());
    let second = Arc::new(Recording::default());
    tokio::join!(
        sync.subscribe("bob", first.clone()),
        sync.subscribe("bob", second.clone())
    );

    graph.send_request("alice", "bob").await.unwrap();

    assert!(wait_for(|| !first.events().is_empty() || !second.events().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Exactly one surviving session, so exactly one delivery overall.
    let all: Vec<Event> = first.events().into_iter().chain(second.events()).collect();
    let requests = all
        .iter()
        .filter(|e| matches!(e, Event::FriendRequest(_)))
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_stops_delivery() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    let listener = Arc::new(Recording::default());
    sync.subscribe("bob", listener.clone()).await;
    sync.unsubscribe("bob");
    sync.unsubscribe("bob");
    // Never subscribed at all: still fine.
    sync.unsubscribe("carol");

    graph.send_request("alice", "bob").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(listener.events().is_empty());
}

#[tokio::test]
async fn dm_events_reach_the_receiver_only() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    let alice_listener = Arc::new(Recording::default());
    let bob_listener = Arc::new(Recording::default());
    sync.subscribe("alice", alice_listener.clone()).await;
    sync.subscribe("bob", bob_listener.clone()).await;

    graph.send_direct("alice", "bob", "hi").await.unwrap();

    assert!(
        wait_for(|| bob_listener
            .events()
            .contains(&Event::Dm("alice".into(), "hi".into())))
        .await
    );
    assert!(bob_listener
        .events()
        .contains(&Event::Notification(NotificationKind::Dm, "alice".into())));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(alice_listener.events().is_empty());
}

#[tokio::test]
async fn friend_status_changes_fan_out() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob", "carol"]).await;
    graph.send_request("alice", "bob").await.unwrap();
    graph.accept_request("bob", "alice").await.unwrap();

    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));
    let listener = Arc::new(Recording::default());
    sync.subscribe("alice", listener.clone()).await;

    graph.set_status("bob", UserStatus::Online).await.unwrap();
    assert!(
        wait_for(|| listener
            .events()
            .contains(&Event::Status("bob".into(), UserStatus::Online)))
        .await
    );

    // Carol is not a friend; her presence is not alice's business.
    graph.set_status("carol", UserStatus::Online).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!listener
        .events()
        .iter()
        .any(|e| matches!(e, Event::Status(name, _) if name == "carol")));
}

#[tokio::test]
async fn scoped_channel_subscription_delivers_and_cancels() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    // History present before subscribing must not replay.
    graph
        .send_channel("fortress", "general", "alice", "old")
        .await
        .unwrap();

    let received: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = received.clone();
    let subscription = sync
        .subscribe_channel("fortress", "general", move |message| {
            sink.lock().unwrap().push(message.text.clone());
        })
        .await;

    graph
        .send_channel("fortress", "general", "alice", "new")
        .await
        .unwrap();
    assert!(wait_for(|| received.lock().unwrap().as_slice() == ["new"]).await);

    subscription.cancel();
    graph
        .send_channel("fortress", "general", "alice", "after-cancel")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(received.lock().unwrap().as_slice(), ["new"]);
}

#[tokio::test]
async fn scoped_thread_subscription_sees_both_senders() {
    let store: Arc<dyn SocialStore> = Arc::new(MemoryStore::new());
    let graph = graph_with_users(store.clone(), &["alice", "bob"]).await;
    let sync = SyncLayer::with_poll_interval(store, Duration::from_millis(50));

    let received: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = received.clone();
    let _subscription = sync
        .subscribe_thread("alice", "bob", move |message| {
            sink.lock().unwrap().push(message.text.clone());
        })
        .await;

    graph.send_direct("alice", "bob", "one").await.unwrap();
    graph.send_direct("bob", "alice", "two").await.unwrap();

    assert!(wait_for(|| received.lock().unwrap().as_slice() == ["one", "two"]).await);
}
