use crate::host::Notice;
use crate::timer::TimerFormat;
use crate::types::*;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

/// Messages from the page to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The page finished loading a route
    PageLoaded {
        path: String,
    },
    StartSession {
        player_name: String,
        team_id: String,
    },
    VisibilityChanged {
        hidden: bool,
    },
    FullscreenChanged {
        active: bool,
    },
    KeyDown {
        key: String,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        alt: bool,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        meta: bool,
    },
    /// Overlay button pressed
    ReturnToFullscreen,
    /// `pagehide` / `beforeunload`
    PageHidden,
    LoadProgress,
    SaveProgress {
        progress: GameProgress,
    },
    SolvePuzzle {
        puzzle: PuzzleId,
        #[serde(default)]
        weapon: Option<String>,
        #[serde(default)]
        killer: Option<String>,
    },
    ResetProgress,
    SubscribeLeaderboard,
    SubscribeProgress,
    WatchTimer {
        #[serde(default)]
        format: TimerFormat,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Solved,
    AlreadySolved,
    /// The session already ended; nothing changes
    Frozen,
    Locked,
}

/// Messages from the agent to the page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        locked: bool,
        identity: Option<PlayerIdentity>,
        server_now: String,
    },
    Notice {
        notice: Notice,
    },
    FullscreenOverlay {
        visible: bool,
    },
    RequestFullscreen,
    PreventDefault,
    Navigate {
        path: String,
    },
    Reload,
    SystemLocked,
    GameExited,
    Timer {
        text: String,
        animating: bool,
    },
    Progress {
        progress: Option<GameProgress>,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    SaveResult {
        saved: bool,
        locked: bool,
    },
    SolveResult {
        puzzle: PuzzleId,
        status: SolveStatus,
        finished: bool,
    },
    /// Earlier puzzles are unsolved; go to the first one
    Redirect {
        path: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

/// Route of a puzzle page
pub fn puzzle_path(puzzle: PuzzleId) -> String {
    format!("/puzzle-{}", puzzle)
}

/// Puzzle number of a route like `/puzzle-3`
pub fn parse_puzzle_path(path: &str) -> Option<PuzzleId> {
    path.strip_prefix("/puzzle-")?
        .trim_end_matches('/')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_down_modifiers_default_to_false() {
        let msg: ClientMessage = serde_json::from_str(r#"{"t":"key_down","key":"w","ctrl":true}"#).unwrap();
        match msg {
            ClientMessage::KeyDown {
                key,
                ctrl,
                alt,
                shift,
                meta,
            } => {
                assert_eq!(key, "w");
                assert!(ctrl);
                assert!(!alt && !shift && !meta);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_tagging() {
        let json = serde_json::to_value(ServerMessage::Navigate {
            path: "/".to_string(),
        })
        .unwrap();
        assert_eq!(json["t"], "navigate");
        assert_eq!(json["path"], "/");

        let json = serde_json::to_value(ServerMessage::SystemLocked).unwrap();
        assert_eq!(json, serde_json::json!({ "t": "system_locked" }));
    }

    #[test]
    fn test_puzzle_paths() {
        assert_eq!(puzzle_path(4), "/puzzle-4");
        assert_eq!(parse_puzzle_path("/puzzle-4"), Some(4));
        assert_eq!(parse_puzzle_path("/puzzle-9/"), Some(9));
        assert_eq!(parse_puzzle_path("/leaderboard"), None);
        assert_eq!(parse_puzzle_path("/puzzle-x"), None);
    }
}
