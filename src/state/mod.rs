use crate::clock::{Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::device::{DeviceState, FileStorage};
use crate::error::StorageError;
use crate::exit::ExitCapture;
use crate::host::HostPage;
use crate::proctor::ProctorSession;
use crate::progress::ProgressClient;
use crate::store::{MemoryStore, RealtimeStore};
use crate::unlock::UnlockBackdoor;
use std::sync::Arc;

/// Shared application state
///
/// One per device. Every connected page gets its own [`ProctorSession`]
/// but shares the lock flag, the store and the unlock buffer.
#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn RealtimeStore>,
    pub device: DeviceState,
    pub progress: ProgressClient,
    pub exit: ExitCapture,
    pub unlock: Arc<UnlockBackdoor>,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        store: Arc<dyn RealtimeStore>,
        device: DeviceState,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let progress = ProgressClient::new(store.clone(), device.clone(), clock.clone());
        let exit = ExitCapture::new(progress.clone());
        let unlock = Arc::new(UnlockBackdoor::new(
            config.unlock_code.clone(),
            device.clone(),
            exit.clone(),
            config.unlock_reload,
        ));
        Self {
            config,
            clock,
            store,
            device,
            progress,
            exit,
            unlock,
        }
    }

    /// Device flags persisted to `config.device_state`, in-process store
    pub fn from_config(config: RuntimeConfig) -> Result<Self, StorageError> {
        let storage = FileStorage::open(&config.device_state)?;
        Ok(Self::new(
            config,
            Arc::new(MemoryStore::new()),
            DeviceState::new(Arc::new(storage)),
            Arc::new(SystemClock),
        ))
    }

    /// Everything in memory
    pub fn in_memory(config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            DeviceState::in_memory(),
            clock,
        )
    }

    pub fn proctor_session(&self, host: Arc<dyn HostPage>) -> ProctorSession {
        ProctorSession::new(host, self.progress.clone(), self.config.timings)
    }
}
