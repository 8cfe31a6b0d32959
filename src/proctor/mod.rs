//! Proctoring: keep the player in fullscreen and on the game tab.
//!
//! [`ProctorMachine`] is the pure two-strike state machine.
//! [`ProctorSession`] drives it for one connected page: it owns the timers
//! (Escape recheck, disqualification grace, lock poll, timer ticker) and
//! carries out the machine's directives against a [`HostPage`](crate::host::HostPage).

mod keys;
mod machine;
mod session;

pub use keys::{classify, KeyClass, KeyPress, Shortcut};
pub use machine::{Directive, ProctorEvent, ProctorMachine, ProctorState, Violation};
pub use session::ProctorSession;

use std::time::Duration;

/// Entry page; disqualified and locked players are sent here
pub const HOME_PATH: &str = "/";
/// Read-only page that never arms proctoring
pub const LEADERBOARD_PATH: &str = "/leaderboard";

/// Delays and notice lengths used by the proctor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProctorTimings {
    /// First-strike warning notice
    pub warning_notice: Duration,
    /// Disqualification notice
    pub exit_notice: Duration,
    /// "Stay focused" reminders
    pub short_notice: Duration,
    /// Time the exit screen stays up before the device is locked
    pub disqualify_grace: Duration,
    /// Delay before checking whether an intercepted Escape left fullscreen anyway
    pub escape_recheck: Duration,
    pub lock_poll: Duration,
    pub lock_notice: Duration,
    /// Delay before sending a locked page home
    pub lock_redirect: Duration,
}

impl Default for ProctorTimings {
    fn default() -> Self {
        Self {
            warning_notice: Duration::from_secs(5),
            exit_notice: Duration::from_secs(10),
            short_notice: Duration::from_secs(3),
            disqualify_grace: Duration::from_secs(3),
            escape_recheck: Duration::from_millis(100),
            lock_poll: Duration::from_secs(5),
            lock_notice: Duration::from_secs(10),
            lock_redirect: Duration::from_secs(2),
        }
    }
}

/// Pages on which a previously armed session resumes automatically
pub fn is_game_path(path: &str) -> bool {
    path != HOME_PATH && path != LEADERBOARD_PATH
}
