//! WebSocket message dispatch
//!
//! Page events go to the connection's proctoring session and the unlock
//! backdoor; progress requests go to the shared progress client.

use crate::error::ProgressError;
use crate::host::{Notice, NoticeKind, Severity};
use crate::proctor::{KeyPress, ProctorEvent, HOME_PATH};
use crate::progress::{check_entry, SaveOutcome, SolveOutcome};
use crate::protocol::{parse_puzzle_path, puzzle_path, ClientMessage, ServerMessage, SolveStatus};
use crate::state::AppState;
use crate::timer::{TimerDisplay, TimerFormat};
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;

use super::Connection;

const STORE_ERROR_NOTICE: Duration = Duration::from_secs(5);

/// Return early with an error reply when no player is cached on the device
macro_rules! require_player {
    ($state:expr) => {
        match $state.device.cached_identity() {
            Some(identity) => identity,
            None => return Some(error_reply(ProgressError::MissingIdentity)),
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::PageLoaded { path } => handle_page_loaded(conn, state, path).await,

        ClientMessage::StartSession {
            player_name,
            team_id,
        } => handle_start_session(conn, state, player_name, team_id).await,

        // Proctoring events
        ClientMessage::VisibilityChanged { hidden } => {
            conn.session.handle(ProctorEvent::VisibilityChanged { hidden });
            None
        }

        ClientMessage::FullscreenChanged { active } => {
            conn.session.handle(ProctorEvent::FullscreenChanged { active });
            None
        }

        ClientMessage::KeyDown {
            key,
            ctrl,
            alt,
            shift,
            meta,
        } => {
            // The backdoor listens regardless of proctoring state
            state.unlock.on_key(&key, conn.host.clone()).await;
            conn.session.handle(ProctorEvent::KeyDown(KeyPress {
                key,
                ctrl,
                alt,
                shift,
                meta,
            }));
            None
        }

        ClientMessage::ReturnToFullscreen => {
            conn.session.return_to_fullscreen();
            None
        }

        ClientMessage::PageHidden => {
            state.exit.on_page_hidden().await;
            None
        }

        // Progress
        ClientMessage::LoadProgress => {
            let identity = require_player!(state);
            match state.progress.load(&identity).await {
                Ok(progress) => Some(ServerMessage::Progress {
                    progress: Some(progress),
                }),
                Err(e) => Some(error_reply(e)),
            }
        }

        ClientMessage::SaveProgress { progress } => handle_save_progress(conn, state, progress).await,

        ClientMessage::SolvePuzzle {
            puzzle,
            weapon,
            killer,
        } => handle_solve_puzzle(conn, state, puzzle, SolvePayload { weapon, killer }).await,

        ClientMessage::ResetProgress => {
            let identity = require_player!(state);
            if state.device.is_locked() {
                tracing::info!("System is locked, ignoring reset");
                return Some(ServerMessage::SaveResult {
                    saved: false,
                    locked: true,
                });
            }
            match state.progress.reset(&identity).await {
                Ok(()) => Some(ServerMessage::Progress { progress: None }),
                Err(e) => Some(error_reply(e)),
            }
        }

        // Subscriptions; a new request replaces the previous one
        ClientMessage::SubscribeLeaderboard => {
            let tx = conn.tx.clone();
            conn.leaderboard_sub = Some(state.progress.subscribe_leaderboard(move |entries| {
                let _ = tx.send(ServerMessage::Leaderboard { entries });
            }));
            None
        }

        ClientMessage::SubscribeProgress => {
            let identity = require_player!(state);
            let tx = conn.tx.clone();
            conn.progress_sub = Some(state.progress.subscribe_progress(&identity, move |progress| {
                let _ = tx.send(ServerMessage::Progress { progress });
            }));
            None
        }

        ClientMessage::WatchTimer { format } => handle_watch_timer(conn, state, format).await,
    }
}

async fn handle_page_loaded(
    conn: &mut Connection,
    state: &Arc<AppState>,
    path: String,
) -> Option<ServerMessage> {
    state.unlock.init();
    let armed = conn.session.page_loaded(&path);
    tracing::debug!(path = %path, armed, "Page loaded");

    let puzzle = parse_puzzle_path(&path)?;
    if state.device.is_locked() {
        return None;
    }
    let Some(identity) = state.device.cached_identity() else {
        tracing::info!(path = %path, "No player on this device, sending home");
        return Some(ServerMessage::Redirect {
            path: HOME_PATH.to_string(),
        });
    };

    let entry = match state.progress.load(&identity).await {
        Ok(progress) => check_entry(&progress, puzzle),
        Err(e) => Err(e),
    };
    entry.err().map(error_reply)
}

async fn handle_start_session(
    conn: &mut Connection,
    state: &Arc<AppState>,
    player_name: String,
    team_id: String,
) -> Option<ServerMessage> {
    let identity = PlayerIdentity::new(player_name.trim(), team_id.trim());
    if !identity.is_complete() {
        return Some(ServerMessage::error(
            "INVALID_PLAYER",
            "Player name and team are both required",
        ));
    }

    if state.device.is_locked() {
        // Shows the locked screen
        conn.session.start_session();
        return None;
    }

    let progress = match state.progress.begin_session(&identity).await {
        Ok(progress) => progress,
        Err(e) => return Some(error_reply(e)),
    };
    conn.session.start_session();
    tracing::info!(key = %identity.key(), "Player started");

    Some(ServerMessage::Progress {
        progress: Some(progress),
    })
}

async fn handle_save_progress(
    conn: &mut Connection,
    state: &Arc<AppState>,
    progress: GameProgress,
) -> Option<ServerMessage> {
    let identity = require_player!(state);
    if progress.identity() != identity {
        tracing::warn!(
            cached = %identity.key(),
            sent = %progress.identity().key(),
            "Refusing to save another player's progress"
        );
        return Some(error_reply(ProgressError::WrongPlayer(progress.identity().key())));
    }

    match state.progress.save_merged(&progress).await {
        Ok(SaveOutcome::Saved) => Some(ServerMessage::SaveResult {
            saved: true,
            locked: false,
        }),
        Ok(SaveOutcome::RejectedLocked) => Some(ServerMessage::SaveResult {
            saved: false,
            locked: true,
        }),
        Err(e) => {
            conn.host.show_notice(save_failed_notice());
            Some(error_reply(e))
        }
    }
}

async fn handle_solve_puzzle(
    conn: &mut Connection,
    state: &Arc<AppState>,
    puzzle: PuzzleId,
    payload: SolvePayload,
) -> Option<ServerMessage> {
    let identity = require_player!(state);

    let (status, finished) = match state.progress.record_solve(&identity, puzzle, payload).await {
        Ok(SolveOutcome::Solved { finished, .. }) => (SolveStatus::Solved, finished),
        Ok(SolveOutcome::AlreadySolved(_)) => (SolveStatus::AlreadySolved, false),
        Ok(SolveOutcome::Frozen(_)) => (SolveStatus::Frozen, false),
        Ok(SolveOutcome::Locked) => (SolveStatus::Locked, false),
        Err(e @ ProgressError::Store(_)) => {
            conn.host.show_notice(save_failed_notice());
            return Some(error_reply(e));
        }
        Err(e) => return Some(error_reply(e)),
    };

    if finished {
        tracing::info!(key = %identity.key(), "Manor solved");
    }
    Some(ServerMessage::SolveResult {
        puzzle,
        status,
        finished,
    })
}

async fn handle_watch_timer(
    conn: &mut Connection,
    state: &Arc<AppState>,
    format: TimerFormat,
) -> Option<ServerMessage> {
    let identity = require_player!(state);
    match state.progress.load(&identity).await {
        Ok(progress) => {
            conn.session
                .watch_timer(TimerDisplay::for_progress(&progress, format));
            None
        }
        Err(e) => Some(error_reply(e)),
    }
}

fn save_failed_notice() -> Notice {
    Notice::new(
        NoticeKind::StoreError,
        "Error",
        "Failed to save progress. Please try again.",
        Severity::Destructive,
        STORE_ERROR_NOTICE,
    )
}

/// Reply for a failed progress operation. Missing prerequisites redirect
/// to the first unsolved puzzle instead of reporting an error.
pub fn error_reply(e: ProgressError) -> ServerMessage {
    match e {
        ProgressError::Prerequisite {
            requested,
            redirect_to,
        } => {
            tracing::info!(requested, redirect_to, "Puzzle locked, redirecting");
            ServerMessage::Redirect {
                path: puzzle_path(redirect_to),
            }
        }
        ProgressError::InvalidPuzzle(_) => ServerMessage::error("INVALID_PUZZLE", e.to_string()),
        ProgressError::MissingIdentity => ServerMessage::error("NO_PLAYER", e.to_string()),
        ProgressError::WrongPlayer(_) => ServerMessage::error("WRONG_PLAYER", e.to_string()),
        ProgressError::Store(_) => ServerMessage::error("STORE_ERROR", e.to_string()),
        ProgressError::Device(_) => ServerMessage::error("DEVICE_ERROR", e.to_string()),
    }
}
