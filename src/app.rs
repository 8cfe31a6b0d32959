use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{api, state::AppState, ws};

/// Every route the agent serves: the page socket, the read-only API and
/// the static page bundle as fallback.
pub fn build_app(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/api/leaderboard", get(api::get_leaderboard))
        .route("/api/progress/{team}/{player}", get(api::get_progress))
        .route("/api/lock", get(api::get_lock));

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api_routes)
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
