use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{SocialStore, StoreChange, StoreError, Tx, TxApply};

/// In-memory backend. Single-process consistent, and the only shipped backend
/// with a push channel: every committed mutation is broadcast to watchers.
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }

    fn notify(&self, key: &str) {
        // No receivers is fine; the poll path covers unsubscribed observers.
        let _ = self.changes.send(StoreChange { key: key.to_string() });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value);
        self.notify(key);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        {
            let mut map = self.lock()?;
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(serde_json::Map::new());
            }
            let obj = entry.as_object_mut().expect("just ensured object");
            for (k, v) in fields {
                obj.insert(k, v);
            }
        }
        self.notify(key);
        Ok(())
    }

    async fn transaction(
        &self,
        key: &str,
        mut apply: TxApply,
    ) -> Result<Option<Value>, StoreError> {
        let committed = {
            let mut map = self.lock()?;
            match apply(map.get(key).cloned()) {
                Tx::Write(value) => {
                    map.insert(key.to_string(), value.clone());
                    Some(value)
                }
                Tx::Abort => None,
            }
        };
        if committed.is_some() {
            self.notify(key);
        }
        Ok(committed)
    }

    fn watch(&self) -> Option<broadcast::Receiver<StoreChange>> {
        Some(self.changes.subscribe())
    }
}
