use super::keys::{classify, KeyClass, KeyPress, Shortcut};
use super::ProctorTimings;
use crate::host::{Notice, NoticeKind, Severity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProctorState {
    /// No game running on this page; listeners detached
    Inactive,
    Armed,
    /// The single shared warning has been used
    WarningIssued,
    /// Terminal
    Disqualified,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "shortcut")]
pub enum Violation {
    TabHidden,
    ForbiddenShortcut(Shortcut),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProctorEvent {
    VisibilityChanged { hidden: bool },
    FullscreenChanged { active: bool },
    KeyDown(KeyPress),
    /// Delayed check after an intercepted Escape
    FullscreenRecheck,
}

/// Side effects requested by the machine; the session carries them out
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Notify(Notice),
    SetOverlay(bool),
    PreventDefault,
    ScheduleFullscreenRecheck(Duration),
    /// Show the exit screen, then lock the device after the grace delay
    BeginDisqualification(Violation),
}

/// Two-strike proctoring state machine.
///
/// Pure: events in, directives out. Tab switches and forbidden shortcuts
/// share one warning; whichever comes second disqualifies. Leaving fullscreen
/// raises the return overlay and uses up the same warning for its message,
/// but never disqualifies on its own.
#[derive(Debug, Clone)]
pub struct ProctorMachine {
    state: ProctorState,
    warning_given: bool,
    fullscreen: bool,
    overlay_visible: bool,
    timings: ProctorTimings,
}

impl ProctorMachine {
    pub fn new(timings: ProctorTimings) -> Self {
        Self {
            state: ProctorState::Inactive,
            warning_given: false,
            fullscreen: false,
            overlay_visible: false,
            timings,
        }
    }

    pub fn state(&self) -> ProctorState {
        self.state
    }

    /// Listeners attached and monitoring
    pub fn is_armed(&self) -> bool {
        matches!(self.state, ProctorState::Armed | ProctorState::WarningIssued)
    }

    pub fn warning_given(&self) -> bool {
        self.warning_given
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    /// Start monitoring. No-op unless inactive.
    pub fn arm(&mut self) -> bool {
        if self.state != ProctorState::Inactive {
            return false;
        }
        self.state = ProctorState::Armed;
        true
    }

    /// Stop monitoring and forget page-level state. A disqualification stays terminal.
    pub fn disarm(&mut self) -> Vec<Directive> {
        if self.state != ProctorState::Disqualified {
            self.state = ProctorState::Inactive;
        }
        if self.overlay_visible {
            self.overlay_visible = false;
            return vec![Directive::SetOverlay(false)];
        }
        Vec::new()
    }

    /// Feed one event. `locked` is the device lock flag read just now; when it
    /// is already set someone else has escalated and violations are ignored.
    pub fn handle(&mut self, event: ProctorEvent, locked: bool) -> Vec<Directive> {
        if let ProctorEvent::FullscreenChanged { active } = event {
            self.fullscreen = active;
        }
        if !self.is_armed() {
            return Vec::new();
        }

        match event {
            ProctorEvent::VisibilityChanged { hidden: true } => {
                if locked {
                    return Vec::new();
                }
                self.strike(Violation::TabHidden)
            }
            ProctorEvent::VisibilityChanged { hidden: false } => Vec::new(),
            ProctorEvent::FullscreenChanged { active: false } => self.fullscreen_lost(),
            ProctorEvent::FullscreenChanged { active: true } => {
                if self.overlay_visible {
                    self.overlay_visible = false;
                    vec![Directive::SetOverlay(false)]
                } else {
                    Vec::new()
                }
            }
            ProctorEvent::KeyDown(key) => self.key_down(&key, locked),
            ProctorEvent::FullscreenRecheck => {
                if !self.fullscreen && !self.overlay_visible {
                    self.overlay_visible = true;
                    vec![Directive::SetOverlay(true)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn key_down(&mut self, key: &KeyPress, locked: bool) -> Vec<Directive> {
        match classify(key) {
            KeyClass::FullscreenExit if self.fullscreen => vec![
                Directive::PreventDefault,
                Directive::Notify(Notice::new(
                    NoticeKind::StayFocused,
                    "Stay Focused",
                    "Press the button to remain in fullscreen mode.",
                    Severity::Default,
                    self.timings.short_notice,
                )),
                Directive::ScheduleFullscreenRecheck(self.timings.escape_recheck),
            ],
            KeyClass::Forbidden(shortcut) => {
                let mut directives = vec![Directive::PreventDefault];
                if !locked {
                    directives.extend(self.strike(Violation::ForbiddenShortcut(shortcut)));
                }
                directives
            }
            KeyClass::FullscreenExit | KeyClass::Ordinary => Vec::new(),
        }
    }

    fn fullscreen_lost(&mut self) -> Vec<Directive> {
        self.overlay_visible = true;
        let notice = if self.warning_given {
            Notice::new(
                NoticeKind::StayFocused,
                "Stay Focused",
                "Please return to fullscreen mode to continue your investigation.",
                Severity::Default,
                self.timings.short_notice,
            )
        } else {
            self.warning_given = true;
            self.state = ProctorState::WarningIssued;
            Notice::new(
                NoticeKind::FullscreenRequired,
                "Fullscreen Required",
                "Please click the button to return to fullscreen mode.",
                Severity::Default,
                self.timings.warning_notice,
            )
        };
        vec![Directive::SetOverlay(true), Directive::Notify(notice)]
    }

    fn strike(&mut self, violation: Violation) -> Vec<Directive> {
        if !self.warning_given {
            self.warning_given = true;
            self.state = ProctorState::WarningIssued;
            tracing::warn!(?violation, "Proctoring warning issued");

            let notice = match violation {
                Violation::TabHidden => Notice::new(
                    NoticeKind::TabWarning,
                    "Warning!",
                    "Please stay focused on the game. Next tab switch will exit the game!",
                    Severity::Destructive,
                    self.timings.warning_notice,
                ),
                Violation::ForbiddenShortcut(_) => Notice::new(
                    NoticeKind::ShortcutWarning,
                    "Warning!",
                    "Keyboard shortcuts are disabled during the game. Next attempt will exit the game!",
                    Severity::Destructive,
                    self.timings.warning_notice,
                ),
            };
            return vec![Directive::Notify(notice)];
        }

        self.state = ProctorState::Disqualified;
        tracing::warn!(?violation, "Second violation, player disqualified");

        let body = match violation {
            Violation::TabHidden => "You have been removed from the game for tab switching.",
            Violation::ForbiddenShortcut(_) => {
                "You have been removed from the game for using forbidden shortcuts."
            }
        };
        vec![
            Directive::Notify(Notice::new(
                NoticeKind::GameExited,
                "Game Exited",
                body,
                Severity::Destructive,
                self.timings.exit_notice,
            )),
            Directive::BeginDisqualification(violation),
        ]
    }
}
