// Public API for integration tests and potential library usage

pub mod api;
pub mod app;
pub mod clock;
pub mod config;
pub mod device;
pub mod elapsed;
pub mod error;
pub mod exit;
pub mod host;
pub mod leaderboard;
pub mod proctor;
pub mod progress;
pub mod protocol;
pub mod state;
pub mod store;
pub mod timer;
pub mod types;
pub mod unlock;
pub mod ws;
