use crate::types::PuzzleId;

/// Errors from the shared realtime store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("record at {path} could not be decoded: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from progress operations
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("puzzle {0} does not exist")]
    InvalidPuzzle(PuzzleId),

    #[error("puzzle {requested} requires puzzle {redirect_to} first")]
    Prerequisite {
        requested: PuzzleId,
        redirect_to: PuzzleId,
    },

    #[error("no player identity available")]
    MissingIdentity,

    #[error("progress for {0} does not belong to the player on this device")]
    WrongPlayer(String),

    #[error(transparent)]
    Device(#[from] StorageError),
}

/// Errors from device-local storage
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("device storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("device storage file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type ProgressResult<T> = Result<T, ProgressError>;
