use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::{SocialStore, StoreChange, StoreError, Tx, TxApply};

/// Durable single-device backend over one `kv(key, value)` table. Has no
/// push channel, so observers take the polling rung of the fallback ladder.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers in other processes
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );
            ",
        )?;

        info!("social store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        f(&mut conn)
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<Value>, StoreError> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn write_value(conn: &Connection, key: &str, value: &Value) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[async_trait]
impl SocialStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.with_conn(|conn| read_value(conn, key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.with_conn(|conn| write_value(conn, key, &value))
    }

    async fn update(
        &self,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut obj = match read_value(&tx, key)? {
                Some(Value::Object(obj)) => obj,
                _ => serde_json::Map::new(),
            };
            for (k, v) in fields {
                obj.insert(k, v);
            }
            write_value(&tx, key, &Value::Object(obj))?;
            tx.commit()?;
            Ok(())
        })
    }

    async fn transaction(
        &self,
        key: &str,
        mut apply: TxApply,
    ) -> Result<Option<Value>, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let current = read_value(&tx, key)?;
            match apply(current) {
                Tx::Write(value) => {
                    write_value(&tx, key, &value)?;
                    tx.commit()?;
                    Ok(Some(value))
                }
                Tx::Abort => Ok(None),
            }
        })
    }

    fn watch(&self) -> Option<broadcast::Receiver<StoreChange>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn values_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citadel.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("users/alice", json!({"balance": 7})).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let got = store.get("users/alice").await.unwrap().unwrap();
        assert_eq!(got["balance"], 7);
    }

    #[tokio::test]
    async fn update_and_transaction_behave_like_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("citadel.db")).unwrap();

        let mut fields = serde_json::Map::new();
        fields.insert("status".into(), json!("online"));
        store.update("users/alice", fields).await.unwrap();
        assert_eq!(
            store.get("users/alice").await.unwrap().unwrap()["status"],
            "online"
        );

        let committed = store
            .transaction(
                "users/alice",
                Box::new(|old| {
                    let mut obj = old
                        .and_then(|v| v.as_object().cloned())
                        .unwrap_or_default();
                    obj.insert("status".into(), json!("offline"));
                    Tx::Write(Value::Object(obj))
                }),
            )
            .await
            .unwrap();
        assert!(committed.is_some());

        let aborted = store
            .transaction("users/missing", Box::new(|_| Tx::Abort))
            .await
            .unwrap();
        assert!(aborted.is_none());
        assert!(store.get("users/missing").await.unwrap().is_none());
    }

    #[test]
    fn sqlite_backend_has_no_push_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("citadel.db")).unwrap();
        assert!(store.watch().is_none());
    }
}
