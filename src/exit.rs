//! Exit capture: freeze the timer of a live session when the player leaves.
//!
//! Used when the page is hidden or unloaded, when the proctor disqualifies a
//! player, and before the unlock backdoor clears the device lock.

use crate::error::ProgressResult;
use crate::progress::{ProgressClient, SaveOutcome};
use crate::types::{EpochMs, PlayerIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// `completionTime` was stamped and saved
    Stamped { completion_time: EpochMs },
    /// Absent, never started, or already completed. Nothing written.
    NotLive,
    /// The device is locked, so the save was ignored
    Locked,
}

#[derive(Clone)]
pub struct ExitCapture {
    progress: ProgressClient,
}

impl ExitCapture {
    pub fn new(progress: ProgressClient) -> Self {
        Self { progress }
    }

    /// Stamp `completionTime = now` onto a live session.
    ///
    /// Idempotent: once stamped, the next call loads a completed record and
    /// does nothing.
    pub async fn capture_exit(&self, identity: &PlayerIdentity) -> ProgressResult<ExitOutcome> {
        let mut progress = self.progress.load(identity).await?;
        if !progress.is_live() {
            return Ok(ExitOutcome::NotLive);
        }

        let completion_time = self.progress.clock().now_ms();
        progress.completion_time = Some(completion_time);

        match self.progress.save(&progress).await? {
            SaveOutcome::Saved => {
                tracing::info!(
                    key = %identity.key(),
                    elapsed_ms = completion_time - progress.start_time,
                    "Game exit time saved"
                );
                Ok(ExitOutcome::Stamped { completion_time })
            }
            SaveOutcome::RejectedLocked => Ok(ExitOutcome::Locked),
        }
    }

    /// The page was hidden or unloaded. A locked device has nothing left to
    /// stamp, so the store is not touched.
    pub async fn on_page_hidden(&self) -> Option<ExitOutcome> {
        if self.progress.device().is_locked() {
            tracing::debug!("Page hidden on a locked device");
            return None;
        }
        self.stop_cached_timer().await
    }

    /// Stop the timer of whoever is cached on this device, if anyone.
    /// Failures are logged and swallowed; callers continue regardless.
    pub async fn stop_cached_timer(&self) -> Option<ExitOutcome> {
        let identity = self.progress.device().cached_identity()?;
        match self.capture_exit(&identity).await {
            Ok(outcome) => {
                tracing::info!(key = %identity.key(), ?outcome, "Timer stopped for cached player");
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(key = %identity.key(), "Error stopping timer: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::DeviceState;
    use crate::store::MemoryStore;
    use crate::types::GameProgress;
    use std::sync::Arc;

    fn setup() -> (ExitCapture, ProgressClient, MemoryStore, ManualClock) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(50_000);
        let client = ProgressClient::new(
            Arc::new(store.clone()),
            DeviceState::in_memory(),
            Arc::new(clock.clone()),
        );
        (ExitCapture::new(client.clone()), client, store, clock)
    }

    fn alice() -> PlayerIdentity {
        PlayerIdentity::new("alice", "red")
    }

    #[tokio::test]
    async fn test_capture_twice_stamps_once() {
        let (exit, client, store, clock) = setup();
        client.begin_session(&alice()).await.unwrap();
        let writes_after_start = store.write_count();

        clock.advance(12_000);
        assert_eq!(
            exit.capture_exit(&alice()).await.unwrap(),
            ExitOutcome::Stamped {
                completion_time: 62_000
            }
        );

        clock.advance(1_000);
        assert_eq!(
            exit.capture_exit(&alice()).await.unwrap(),
            ExitOutcome::NotLive
        );

        let progress = client.load(&alice()).await.unwrap();
        assert_eq!(progress.completion_time, Some(62_000));
        assert_eq!(store.write_count(), writes_after_start + 1);

        let board = client.get_leaderboard().await.unwrap();
        assert_eq!(board[0].total_time, 12_000);
    }

    #[tokio::test]
    async fn test_capture_ignores_unstarted_and_absent() {
        let (exit, client, store, _clock) = setup();
        assert_eq!(
            exit.capture_exit(&alice()).await.unwrap(),
            ExitOutcome::NotLive
        );

        client
            .save(&GameProgress::new_default(&alice()))
            .await
            .unwrap();
        assert_eq!(
            exit.capture_exit(&alice()).await.unwrap(),
            ExitOutcome::NotLive
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_capture_while_locked() {
        let (exit, client, _store, _clock) = setup();
        client.begin_session(&alice()).await.unwrap();
        client.device().set_locked().unwrap();

        assert_eq!(
            exit.capture_exit(&alice()).await.unwrap(),
            ExitOutcome::Locked
        );
        assert!(client.load(&alice()).await.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_stop_cached_timer() {
        let (exit, client, store, _clock) = setup();
        assert_eq!(exit.stop_cached_timer().await, None);

        client.begin_session(&alice()).await.unwrap();
        assert!(matches!(
            exit.stop_cached_timer().await,
            Some(ExitOutcome::Stamped { .. })
        ));

        store.set_offline(true);
        assert_eq!(exit.stop_cached_timer().await, None);
    }

    #[tokio::test]
    async fn test_page_hidden_skips_locked_device() {
        let (exit, client, store, _clock) = setup();
        client.begin_session(&alice()).await.unwrap();
        client.device().set_locked().unwrap();
        let writes = store.write_count();

        assert_eq!(exit.on_page_hidden().await, None);
        assert_eq!(store.write_count(), writes);

        client.device().clear_locked().unwrap();
        assert!(matches!(
            exit.on_page_hidden().await,
            Some(ExitOutcome::Stamped { .. })
        ));
    }
}
