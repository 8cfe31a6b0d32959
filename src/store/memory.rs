use super::{RealtimeStore, StoreChange};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// In-process realtime store.
///
/// Also supports failure injection so callers' error paths can be exercised:
/// [`MemoryStore::set_offline`] fails every operation, and
/// [`MemoryStore::fail_writes_under`] fails writes touching a path prefix.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Value>>>,
    changes: broadcast::Sender<StoreChange>,
    offline: Arc<AtomicBool>,
    failing_prefixes: Arc<std::sync::Mutex<Vec<String>>>,
    writes: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            changes: tx,
            offline: Arc::new(AtomicBool::new(false)),
            failing_prefixes: Arc::new(std::sync::Mutex::new(Vec::new())),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate a lost backend connection
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject any write batch that touches `prefix`
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        self.failing_prefixes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.failing_prefixes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.set_offline(false);
    }

    /// Number of write batches applied so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store is offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, path: &str) -> StoreResult<()> {
        let prefixes = self
            .failing_prefixes
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(StoreError::Backend(format!("write to {} rejected", path)));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        self.check_online()?;
        Ok(self.data.read().await.get(path).cloned())
    }

    async fn list(&self, path: &str) -> StoreResult<Vec<Value>> {
        self.check_online()?;
        let prefix = format!("{}/", path);
        let data = self.data.read().await;
        Ok(data
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn update(&self, writes: Vec<(String, Option<Value>)>) -> StoreResult<()> {
        self.check_online()?;
        for (path, _) in &writes {
            self.check_writable(path)?;
        }

        let changed: Vec<String> = {
            let mut data = self.data.write().await;
            writes
                .into_iter()
                .map(|(path, value)| {
                    match value {
                        Some(v) => {
                            data.insert(path.clone(), v);
                        }
                        None => {
                            data.remove(&path);
                        }
                    }
                    path
                })
                .collect()
        };
        self.writes.fetch_add(1, Ordering::SeqCst);

        for path in changed {
            // No subscribers is fine
            let _ = self.changes.send(StoreChange { path });
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a/b").await.unwrap(), None);

        store.set("a/b", Some(json!({"x": 1}))).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(json!({"x": 1})));

        store.set("a/b", None).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_list_direct_children_only() {
        let store = MemoryStore::new();
        store.set("board/a", Some(json!(1))).await.unwrap();
        store.set("board/b", Some(json!(2))).await.unwrap();
        store.set("board/b/deep", Some(json!(3))).await.unwrap();
        store.set("boardroom/c", Some(json!(4))).await.unwrap();

        assert_eq!(store.list("board").await.unwrap(), vec![json!(1), json!(2)]);
        assert!(store.list("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.fail_writes_under("leaderboard/");

        let result = store
            .update(vec![
                ("gameProgress/k".to_string(), Some(json!(1))),
                ("leaderboard/k".to_string(), Some(json!(2))),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(store.get("gameProgress/k").await.unwrap(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_fails_reads() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("x").await,
            Err(StoreError::Backend(_))
        ));
        store.clear_failures();
        assert!(store.get("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let store = MemoryStore::new();
        let mut rx = store.changes();
        store.set("leaderboard/k", Some(json!(1))).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.path, "leaderboard/k");
        assert!(change.affects("leaderboard"));
    }
}
