//! Read-only HTTP API.
//!
//! Served whether or not the device is locked; nothing here writes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;
use crate::types::{LeaderboardEntry, PlayerIdentity};

#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    pub session_active: bool,
}

/// Ranked leaderboard.
///
/// GET /api/leaderboard
pub async fn get_leaderboard(State(state): State<Arc<AppState>>) -> Response {
    match state.progress.get_leaderboard().await {
        Ok(entries) => Json::<Vec<LeaderboardEntry>>(entries).into_response(),
        Err(e) => {
            tracing::error!("Leaderboard request failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("Store unavailable: {}", e)).into_response()
        }
    }
}

/// One player's progress.
///
/// GET /api/progress/{team}/{player}
///
/// Unknown players get a fresh default record, like the game itself sees.
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path((team_id, player_name)): Path<(String, String)>,
) -> Response {
    let identity = PlayerIdentity::new(player_name, team_id);
    if !identity.is_complete() {
        return (StatusCode::BAD_REQUEST, "Player name and team are required").into_response();
    }

    match state.progress.load(&identity).await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => {
            tracing::error!(key = %identity.key(), "Progress request failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("Store unavailable: {}", e)).into_response()
        }
    }
}

/// Device lock status.
///
/// GET /api/lock
pub async fn get_lock(State(state): State<Arc<AppState>>) -> Json<LockStatus> {
    Json(LockStatus {
        locked: state.device.is_locked(),
        session_active: state.device.is_session_active(),
    })
}
