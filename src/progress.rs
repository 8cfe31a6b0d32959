//! Progress store client.
//!
//! Typed operations over the realtime store for one player's progress record
//! and for the global leaderboard. Every progress write carries the matching
//! leaderboard entry in the same atomic batch, so the two never diverge.

use crate::clock::Clock;
use crate::device::DeviceState;
use crate::error::{ProgressError, ProgressResult, StoreError, StoreResult};
use crate::leaderboard;
use crate::store::{self, RealtimeStore, LEADERBOARD_ROOT};
use crate::types::*;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Result of a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The device is locked; nothing was written
    RejectedLocked,
}

/// Result of recording a puzzle solve
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Solved {
        progress: GameProgress,
        /// The final puzzle was just solved; the device is now locked
        finished: bool,
    },
    AlreadySolved(GameProgress),
    /// The session already has a completion time and can no longer change
    Frozen(GameProgress),
    /// The device is locked; nothing was written
    Locked,
}

/// Puzzle-page entry check: every earlier puzzle must be solved.
/// The error names the first incomplete puzzle to redirect to.
pub fn check_entry(progress: &GameProgress, puzzle: PuzzleId) -> ProgressResult<()> {
    if !(1..=PUZZLE_COUNT).contains(&puzzle) {
        return Err(ProgressError::InvalidPuzzle(puzzle));
    }
    match (1..puzzle).find(|p| !progress.is_solved(*p)) {
        Some(redirect_to) => Err(ProgressError::Prerequisite {
            requested: puzzle,
            redirect_to,
        }),
        None => Ok(()),
    }
}

/// Handle for a live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
pub struct ProgressClient {
    store: Arc<dyn RealtimeStore>,
    device: DeviceState,
    clock: Arc<dyn Clock>,
}

impl ProgressClient {
    pub fn new(store: Arc<dyn RealtimeStore>, device: DeviceState, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            device,
            clock,
        }
    }

    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Write a progress record and its derived leaderboard entry.
    ///
    /// Ignored (not an error) while the device is locked. Both records are
    /// written in one batch; a failure leaves neither changed.
    pub async fn save(&self, progress: &GameProgress) -> ProgressResult<SaveOutcome> {
        if self.device.is_locked() {
            tracing::info!(
                team_id = %progress.team_id,
                player_name = %progress.player_name,
                "System is locked, ignoring save"
            );
            return Ok(SaveOutcome::RejectedLocked);
        }

        let now = self.clock.now_ms();
        let key = progress.identity().key();
        let mut record = progress.clone();
        record.timestamp = Some(now);
        let entry = leaderboard::derive_entry(&record, now);

        let writes = vec![
            (
                store::progress_path(&key),
                Some(serde_json::to_value(&record).map_err(StoreError::from)?),
            ),
            (
                store::leaderboard_path(&key),
                Some(serde_json::to_value(&entry).map_err(StoreError::from)?),
            ),
        ];

        if let Err(e) = self.store.update(writes).await {
            tracing::error!(key, "Error saving game progress: {}", e);
            return Err(e.into());
        }

        tracing::debug!(
            key,
            completed = entry.completed_puzzles,
            total_time = entry.total_time,
            "Game progress saved"
        );
        Ok(SaveOutcome::Saved)
    }

    /// Save a record sent by the page, merged onto the stored one so that
    /// solved flags, `startTime` and `completionTime` never move backwards.
    pub async fn save_merged(&self, incoming: &GameProgress) -> ProgressResult<SaveOutcome> {
        if self.device.is_locked() {
            return Ok(SaveOutcome::RejectedLocked);
        }
        let stored = self.load(&incoming.identity()).await?;
        self.save(&stored.merged_with(incoming)).await
    }

    /// Stored progress, or a fresh default record when none exists.
    /// Backend failures are errors; absence is not.
    pub async fn load(&self, identity: &PlayerIdentity) -> ProgressResult<GameProgress> {
        match read_progress(self.store.clone(), store::progress_path(&identity.key())).await {
            Ok(Some(progress)) => Ok(progress),
            Ok(None) => Ok(GameProgress::new_default(identity)),
            Err(e) => {
                tracing::error!(key = %identity.key(), "Error loading game progress: {}", e);
                Err(e.into())
            }
        }
    }

    /// All leaderboard entries in ranking order
    pub async fn get_leaderboard(&self) -> ProgressResult<Vec<LeaderboardEntry>> {
        read_leaderboard(self.store.clone()).await.map_err(|e| {
            tracing::error!("Error loading leaderboard: {}", e);
            e.into()
        })
    }

    /// Delete both the progress record and the leaderboard entry
    pub async fn reset(&self, identity: &PlayerIdentity) -> ProgressResult<()> {
        let key = identity.key();
        self.store
            .update(vec![
                (store::progress_path(&key), None),
                (store::leaderboard_path(&key), None),
            ])
            .await
            .map_err(|e| {
                tracing::error!(key, "Error resetting game progress: {}", e);
                ProgressError::from(e)
            })?;
        tracing::info!(key, "Game progress reset");
        Ok(())
    }

    /// Push the current progress (or `None` when absent) now and on every change.
    /// Keeps delivering while the device is locked.
    pub fn subscribe_progress<F>(&self, identity: &PlayerIdentity, callback: F) -> Subscription
    where
        F: Fn(Option<GameProgress>) + Send + Sync + 'static,
    {
        let path = store::progress_path(&identity.key());
        self.spawn_subscription(
            path.clone(),
            move |store| read_progress(store, path.clone()).boxed(),
            callback,
        )
    }

    /// Push the ranked leaderboard now and on every change
    pub fn subscribe_leaderboard<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Vec<LeaderboardEntry>) + Send + Sync + 'static,
    {
        self.spawn_subscription(
            LEADERBOARD_ROOT.to_string(),
            |store| read_leaderboard(store).boxed(),
            callback,
        )
    }

    fn spawn_subscription<T, R, F>(&self, path: String, read: R, callback: F) -> Subscription
    where
        T: Send + 'static,
        R: Fn(Arc<dyn RealtimeStore>) -> BoxFuture<'static, StoreResult<T>> + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let store = self.store.clone();
        let device = self.device.clone();
        // Subscribe before the first read so no change slips in between
        let mut changes = store.changes();

        let task = tokio::spawn(async move {
            let deliver = |value: StoreResult<T>| match value {
                Ok(v) => {
                    if device.is_locked() {
                        tracing::debug!(path = %path, "System is locked, delivering read-only update");
                    }
                    callback(v);
                }
                Err(e) => tracing::error!(path = %path, "Subscription read failed: {}", e),
            };

            deliver(read(store.clone()).await);

            loop {
                match changes.recv().await {
                    Ok(change) if change.affects(&path) => deliver(read(store.clone()).await),
                    Ok(_) => {}
                    // Missed some changes; re-reading gives the latest value
                    Err(RecvError::Lagged(_)) => deliver(read(store.clone()).await),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription { task }
    }

    /// Begin (or resume) a session: cache the identity on the device and
    /// stamp `startTime` the first time only.
    pub async fn begin_session(&self, identity: &PlayerIdentity) -> ProgressResult<GameProgress> {
        self.device.cache_identity(identity)?;
        let mut progress = self.load(identity).await?;
        if !progress.has_started() {
            progress.start_time = self.clock.now_ms();
            self.save(&progress).await?;
            tracing::info!(key = %identity.key(), "Session started");
        }
        Ok(progress)
    }

    /// Record a solved puzzle.
    ///
    /// Checks that earlier puzzles are solved, raises `currentPage`, copies the
    /// narrative payload and, on the final puzzle, stamps `completionTime` and
    /// locks the device after the write lands.
    pub async fn record_solve(
        &self,
        identity: &PlayerIdentity,
        puzzle: PuzzleId,
        payload: SolvePayload,
    ) -> ProgressResult<SolveOutcome> {
        if self.device.is_locked() {
            return Ok(SolveOutcome::Locked);
        }

        let mut progress = self.load(identity).await?;
        check_entry(&progress, puzzle)?;

        if progress.completion_time.is_some() {
            return Ok(SolveOutcome::Frozen(progress));
        }
        if progress.is_solved(puzzle) {
            return Ok(SolveOutcome::AlreadySolved(progress));
        }

        progress.mark_solved(puzzle);
        progress.current_page = progress.current_page.max(u32::from(puzzle));
        if let Some(weapon) = payload.weapon {
            progress.weapon = weapon;
        }
        if let Some(killer) = payload.killer {
            progress.killer = killer;
        }
        let finished = progress.all_solved();
        if finished {
            progress.completion_time = Some(self.clock.now_ms());
        }

        match self.save(&progress).await? {
            SaveOutcome::RejectedLocked => return Ok(SolveOutcome::Locked),
            SaveOutcome::Saved => {}
        }

        if finished {
            tracing::info!(key = %identity.key(), "All puzzles solved, locking device");
            self.device.set_locked()?;
        }

        Ok(SolveOutcome::Solved { progress, finished })
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: serde_json::Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|source| StoreError::Decode {
        path: path.to_string(),
        source,
    })
}

async fn read_progress(
    store: Arc<dyn RealtimeStore>,
    path: String,
) -> StoreResult<Option<GameProgress>> {
    store
        .get(&path)
        .await?
        .map(|value| decode(&path, value))
        .transpose()
}

async fn read_leaderboard(store: Arc<dyn RealtimeStore>) -> StoreResult<Vec<LeaderboardEntry>> {
    let entries = store
        .list(LEADERBOARD_ROOT)
        .await?
        .into_iter()
        .map(|value| decode(LEADERBOARD_ROOT, value))
        .collect::<StoreResult<Vec<LeaderboardEntry>>>()?;
    Ok(leaderboard::rank(entries))
}
