pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use ulid::Ulid;

use crate::clock::Clock;
use crate::host::{ChannelHost, HostPage};
use crate::proctor::ProctorSession;
use crate::progress::Subscription;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One connected page: its proctoring session and live subscriptions.
///
/// Everything meant for the page, handler replies included, goes through
/// one channel so the page sees it in order.
pub struct Connection {
    pub id: Ulid,
    pub session: ProctorSession,
    host: Arc<dyn HostPage>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    progress_sub: Option<Subscription>,
    leaderboard_sub: Option<Subscription>,
}

impl Connection {
    pub fn new(state: &AppState, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let host: Arc<dyn HostPage> = Arc::new(ChannelHost::new(tx.clone()));
        Self {
            id: Ulid::new(),
            session: state.proctor_session(host.clone()),
            host,
            tx,
            progress_sub: None,
            leaderboard_sub: None,
        }
    }

    pub fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("Connection closed, dropping message");
        }
    }

    pub fn has_progress_subscription(&self) -> bool {
        self.progress_sub.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn has_leaderboard_subscription(&self) -> bool {
        self.leaderboard_sub
            .as_ref()
            .is_some_and(Subscription::is_active)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Subscriptions end with their handles
        self.session.teardown();
    }
}

pub fn welcome(state: &AppState) -> ServerMessage {
    ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        locked: state.device.is_locked(),
        identity: state.device.cached_identity(),
        server_now: chrono::DateTime::from_timestamp_millis(state.clock.now_ms())
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut conn = Connection::new(&state, tx);

    state.unlock.init();
    conn.send(welcome(&state));
    tracing::info!(conn = %conn.id, "Page connected");

    loop {
        tokio::select! {
            // Directives and replies for the page
            outgoing = rx.recv() => {
                let Some(msg) = outgoing else { break };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            tracing::error!("Failed to send message");
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to serialize message: {}", e),
                }
            }

            // Handle page events
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(conn = %conn.id, "Received message: {}", text);
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &mut conn, &state).await
                                {
                                    conn.send(response);
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                conn.send(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(
        conn = %conn.id,
        path = %conn.session.current_path(),
        "Page disconnected"
    );
}
