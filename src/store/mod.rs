//! Contract of the shared realtime store.
//!
//! The store is path-addressed JSON (`gameProgress/{key}`, `leaderboard/{key}`).
//! Only the read/write/subscribe contract matters to the runtime; the backend
//! is injected so tests and single-device runs can use [`MemoryStore`].

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Collection holding one [`GameProgress`](crate::types::GameProgress) per identity
pub const PROGRESS_ROOT: &str = "gameProgress";
/// Collection holding one [`LeaderboardEntry`](crate::types::LeaderboardEntry) per identity
pub const LEADERBOARD_ROOT: &str = "leaderboard";

pub fn progress_path(key: &str) -> String {
    format!("{}/{}", PROGRESS_ROOT, key)
}

pub fn leaderboard_path(key: &str) -> String {
    format!("{}/{}", LEADERBOARD_ROOT, key)
}

/// Notification that the value at `path` was written or deleted
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub path: String,
}

impl StoreChange {
    /// Whether this change touches `path` itself or anything below it
    pub fn affects(&self, path: &str) -> bool {
        self.path == path
            || self
                .path
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Value at `path`, `None` if absent
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Direct children of the collection at `path`, in key order
    async fn list(&self, path: &str) -> StoreResult<Vec<Value>>;

    /// Write several locations as one unit: either every write lands or none does.
    /// `None` deletes the location.
    async fn update(&self, writes: Vec<(String, Option<Value>)>) -> StoreResult<()>;

    /// Write (or delete with `None`) a single location
    async fn set(&self, path: &str, value: Option<Value>) -> StoreResult<()> {
        self.update(vec![(path.to_string(), value)]).await
    }

    /// Change feed. Receivers may lag; a lagging receiver should re-read.
    fn changes(&self) -> broadcast::Receiver<StoreChange>;
}
