//! The page on the other side of the agent.
//!
//! Runtime components never render anything themselves; they tell the
//! [`HostPage`] what to show. The WebSocket connection implements it by
//! sending [`ServerMessage`]s, tests implement it by recording calls.

use crate::protocol::ServerMessage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Default,
    Destructive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    TabWarning,
    ShortcutWarning,
    FullscreenRequired,
    StayFocused,
    GameExited,
    SystemLocked,
    SystemUnlocked,
    StoreError,
}

/// Toast-style message shown for a limited time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub duration_ms: u64,
}

impl Notice {
    pub fn new(
        kind: NoticeKind,
        title: &str,
        body: &str,
        severity: Severity,
        duration: Duration,
    ) -> Self {
        Self {
            kind,
            title: title.to_string(),
            body: body.to_string(),
            severity,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// What the runtime can ask of the page
pub trait HostPage: Send + Sync {
    fn show_notice(&self, notice: Notice);
    fn set_fullscreen_overlay(&self, visible: bool);
    /// Cancel the platform default for the key event being handled
    fn prevent_default(&self);
    fn request_fullscreen(&self);
    /// Full-screen terminal message after disqualification
    fn show_game_exited(&self);
    /// Full-screen terminal message for a locked device
    fn show_system_locked(&self);
    fn navigate(&self, path: &str);
    fn reload(&self);
    fn show_timer(&self, text: &str, animating: bool);
}

/// [`HostPage`] that forwards everything as [`ServerMessage`]s.
///
/// Sends to a page that has already gone away are dropped silently.
#[derive(Debug, Clone)]
pub struct ChannelHost {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ChannelHost {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx }
    }

    fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("Page already gone, dropping message");
        }
    }
}

impl HostPage for ChannelHost {
    fn show_notice(&self, notice: Notice) {
        self.send(ServerMessage::Notice { notice });
    }

    fn set_fullscreen_overlay(&self, visible: bool) {
        self.send(ServerMessage::FullscreenOverlay { visible });
    }

    fn prevent_default(&self) {
        self.send(ServerMessage::PreventDefault);
    }

    fn request_fullscreen(&self) {
        self.send(ServerMessage::RequestFullscreen);
    }

    fn show_game_exited(&self) {
        self.send(ServerMessage::GameExited);
    }

    fn show_system_locked(&self) {
        self.send(ServerMessage::SystemLocked);
    }

    fn navigate(&self, path: &str) {
        self.send(ServerMessage::Navigate {
            path: path.to_string(),
        });
    }

    fn reload(&self) {
        self.send(ServerMessage::Reload);
    }

    fn show_timer(&self, text: &str, animating: bool) {
        self.send(ServerMessage::Timer {
            text: text.to_string(),
            animating,
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Everything a [`RecordingHost`] was asked to do, in order
    #[derive(Debug, Clone, PartialEq)]
    pub enum HostCall {
        Notice(NoticeKind),
        Overlay(bool),
        PreventDefault,
        RequestFullscreen,
        GameExited,
        SystemLocked,
        Navigate(String),
        Reload,
        Timer(String, bool),
    }

    #[derive(Debug, Default)]
    pub struct RecordingHost {
        calls: Mutex<Vec<HostCall>>,
    }

    impl RecordingHost {
        pub fn calls(&self) -> Vec<HostCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn notices(&self) -> Vec<NoticeKind> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    HostCall::Notice(kind) => Some(kind),
                    _ => None,
                })
                .collect()
        }

        pub fn has(&self, call: &HostCall) -> bool {
            self.calls().contains(call)
        }

        fn push(&self, call: HostCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl HostPage for RecordingHost {
        fn show_notice(&self, notice: Notice) {
            self.push(HostCall::Notice(notice.kind));
        }
        fn set_fullscreen_overlay(&self, visible: bool) {
            self.push(HostCall::Overlay(visible));
        }
        fn prevent_default(&self) {
            self.push(HostCall::PreventDefault);
        }
        fn request_fullscreen(&self) {
            self.push(HostCall::RequestFullscreen);
        }
        fn show_game_exited(&self) {
            self.push(HostCall::GameExited);
        }
        fn show_system_locked(&self) {
            self.push(HostCall::SystemLocked);
        }
        fn navigate(&self, path: &str) {
            self.push(HostCall::Navigate(path.to_string()));
        }
        fn reload(&self) {
            self.push(HostCall::Reload);
        }
        fn show_timer(&self, text: &str, animating: bool) {
            self.push(HostCall::Timer(text.to_string(), animating));
        }
    }
}
