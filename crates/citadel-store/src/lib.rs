//! The store adapter: uniform key-addressed operations over an abstract
//! backend. All core logic is written once against [`SocialStore`]; backends
//! are selected at construction.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store unavailable: {0}")]
    Backend(String),
}

/// A committed mutation, identified by the key it touched. Watchers diff
/// against authoritative state rather than trusting a change payload.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub key: String,
}

/// Decision returned by a transaction closure.
pub enum Tx {
    Write(Value),
    Abort,
}

/// Read-modify-write closure for [`SocialStore::transaction`]. Owns its
/// captures so backends can run it wherever the write happens.
pub type TxApply = Box<dyn FnMut(Option<Value>) -> Tx + Send>;

/// Uniform contract over every persistence backend. Keys are hierarchical
/// strings (`users/<name>`, `dms/<pair>`, `bastion_msgs/<b>/<c>`); values are
/// JSON documents that round-trip losslessly.
#[async_trait]
pub trait SocialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Shallow field merge into the object at `key`, creating it if absent.
    async fn update(
        &self,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Atomic read-modify-write on a single key. Returns the committed value,
    /// or `None` if the closure aborted.
    async fn transaction(&self, key: &str, apply: TxApply) -> Result<Option<Value>, StoreError>;

    /// Push channel of committed mutations, when the backend supports one.
    /// `None` means observers must fall back to polling.
    fn watch(&self) -> Option<broadcast::Receiver<StoreChange>>;
}
