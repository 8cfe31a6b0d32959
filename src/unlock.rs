//! Unlock backdoor.
//!
//! While the device is locked, every keystroke from any page is appended to
//! one process-wide buffer. Typing the secret code stops the cached player's
//! timer, clears the lock and reloads the page.

use crate::device::DeviceState;
use crate::exit::ExitCapture;
use crate::host::{HostPage, Notice, NoticeKind, Severity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const DEFAULT_UNLOCK_CODE: &str = "unlock2024";

/// Characters kept after a trim
const KEEP_TAIL: usize = 15;
/// Buffer length that triggers a trim
const TRIM_AT: usize = 30;

const UNLOCKED_NOTICE: Duration = Duration::from_secs(3);

/// Rolling lowercase keystroke buffer
#[derive(Debug)]
struct KeyBuffer {
    text: String,
    keep: usize,
    max: usize,
}

impl KeyBuffer {
    fn new(code_len: usize) -> Self {
        // The kept tail must hold a whole code, or a code typed across a
        // trim could be cut in half
        let keep = KEEP_TAIL.max(code_len);
        Self {
            text: String::new(),
            keep,
            max: TRIM_AT.max(keep * 2),
        }
    }

    /// Append a key and report whether the buffer now contains `code`.
    /// The buffer is emptied on a match.
    fn push(&mut self, key: &str, code: &str) -> bool {
        self.text.push_str(&key.to_lowercase());
        if self.text.contains(code) {
            self.text.clear();
            return true;
        }

        let len = self.text.chars().count();
        if len > self.max {
            if let Some((offset, _)) = self.text.char_indices().nth(len - self.keep) {
                self.text.drain(..offset);
            }
        }
        false
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

pub struct UnlockBackdoor {
    code: String,
    buffer: Mutex<KeyBuffer>,
    initialized: AtomicBool,
    device: DeviceState,
    exit: ExitCapture,
    reload_delay: Duration,
}

impl UnlockBackdoor {
    pub fn new(
        code: impl Into<String>,
        device: DeviceState,
        exit: ExitCapture,
        reload_delay: Duration,
    ) -> Self {
        let code = code.into().to_lowercase();
        Self {
            buffer: Mutex::new(KeyBuffer::new(code.chars().count())),
            code,
            initialized: AtomicBool::new(false),
            device,
            exit,
            reload_delay,
        }
    }

    /// Start listening. Returns false if already listening.
    pub fn init(&self) -> bool {
        let first = !self.initialized.swap(true, Ordering::SeqCst);
        if first {
            tracing::debug!("Unlock listener installed");
        }
        first
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Feed one keystroke. Returns true when it completed the code and the
    /// device was unlocked.
    pub async fn on_key(&self, key: &str, host: Arc<dyn HostPage>) -> bool {
        if !self.is_initialized() || !self.device.is_locked() {
            return false;
        }

        let matched = self
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key, &self.code);
        if !matched {
            return false;
        }

        tracing::info!("Unlock code entered");
        self.exit.stop_cached_timer().await;

        if let Err(e) = self.device.clear_locked() {
            tracing::error!("Failed to clear system lock: {}", e);
            return false;
        }
        tracing::info!("System unlocked");

        host.show_notice(Notice::new(
            NoticeKind::SystemUnlocked,
            "System Unlocked",
            "The system has been unlocked. Reloading...",
            Severity::Default,
            UNLOCKED_NOTICE,
        ));

        let delay = self.reload_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            host.reload();
        });
        true
    }

    #[cfg(test)]
    fn buffered_len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::testing::{HostCall, RecordingHost};
    use crate::progress::ProgressClient;
    use crate::store::MemoryStore;

    fn backdoor() -> (UnlockBackdoor, DeviceState) {
        let device = DeviceState::in_memory();
        let client = ProgressClient::new(
            Arc::new(MemoryStore::new()),
            device.clone(),
            Arc::new(ManualClock::new(1_000)),
        );
        let backdoor = UnlockBackdoor::new(
            DEFAULT_UNLOCK_CODE,
            device.clone(),
            ExitCapture::new(client),
            Duration::from_secs(1),
        );
        backdoor.init();
        (backdoor, device)
    }

    async fn type_text(backdoor: &UnlockBackdoor, text: &str, host: &Arc<RecordingHost>) -> bool {
        let mut unlocked = false;
        for c in text.chars() {
            unlocked |= backdoor.on_key(&c.to_string(), host.clone()).await;
        }
        unlocked
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_after_noise_unlocks() {
        let (backdoor, device) = backdoor();
        device.set_locked().unwrap();
        let host = Arc::new(RecordingHost::default());

        assert!(type_text(&backdoor, "xyzzyUNLOCK2024", &host).await);
        assert!(!device.is_locked());
        assert_eq!(host.notices(), vec![NoticeKind::SystemUnlocked]);
        assert_eq!(backdoor.buffered_len(), 0);
        assert!(!host.has(&HostCall::Reload));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(host.has(&HostCall::Reload));
    }

    #[tokio::test]
    async fn test_ignored_while_unlocked() {
        let (backdoor, device) = backdoor();
        let host = Arc::new(RecordingHost::default());

        assert!(!type_text(&backdoor, "unlock2024", &host).await);
        assert_eq!(backdoor.buffered_len(), 0);
        assert!(!device.is_locked());
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ignored_before_init() {
        let device = DeviceState::in_memory();
        device.set_locked().unwrap();
        let client = ProgressClient::new(
            Arc::new(MemoryStore::new()),
            device.clone(),
            Arc::new(ManualClock::new(1_000)),
        );
        let backdoor = UnlockBackdoor::new(
            "open",
            device.clone(),
            ExitCapture::new(client),
            Duration::from_secs(1),
        );
        let host = Arc::new(RecordingHost::default());

        assert!(!type_text(&backdoor, "open", &host).await);
        assert!(device.is_locked());

        assert!(backdoor.init());
        assert!(!backdoor.init());
        assert!(type_text(&backdoor, "open", &host).await);
    }

    #[tokio::test]
    async fn test_buffer_stays_bounded() {
        let (backdoor, device) = backdoor();
        device.set_locked().unwrap();
        let host = Arc::new(RecordingHost::default());

        for _ in 0..200 {
            backdoor.on_key("q", host.clone()).await;
            assert!(backdoor.buffered_len() <= TRIM_AT);
        }
        assert!(device.is_locked());

        // Code typed right across a trim still matches
        assert!(type_text(&backdoor, "unlock2024", &host).await);
    }

    #[test]
    fn test_buffer_grows_for_long_codes() {
        let code = "a-much-longer-secret-passphrase";
        let mut buffer = KeyBuffer::new(code.len());
        assert_eq!(buffer.keep, code.len());

        for c in "noise".chars().chain(code.chars()) {
            let hit = buffer.push(&c.to_string(), code);
            assert!(buffer.len() <= buffer.max);
            if hit {
                return;
            }
        }
        panic!("code was never matched");
    }

    #[test]
    fn test_named_keys_are_buffered_lowercase() {
        let mut buffer = KeyBuffer::new(4);
        assert!(!buffer.push("Shift", "open"));
        assert_eq!(buffer.text, "shift");
    }
}
