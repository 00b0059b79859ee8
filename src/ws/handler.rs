//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ProtocolError;
use crate::game::{ConnectionId, GameHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Longest display name kept, in characters
pub const MAX_NAME_LEN: usize = 24;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name shown to other players
    pub name: Option<String>,
}

/// Trim and truncate a requested name; blank names get a generated placeholder
pub fn display_name(requested: Option<&str>) -> String {
    let trimmed = requested.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return format!("Player_{}", &Uuid::new_v4().simple().to_string()[..8]);
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let name = display_name(query.name.as_deref());
    debug!(name = %name, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, name: String, state: AppState) {
    let connection_id = ConnectionId::new();
    info!(connection_id = %connection_id, name = %name, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    if !state.game.connect(connection_id, name, outbound_tx) {
        error!(connection_id = %connection_id, "Game loop is not running");
        return;
    }

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
    run_session(
        connection_id,
        ws_sink,
        ws_stream,
        outbound_rx,
        &state.game,
        rate_limiter,
    )
    .await;

    // Signal disconnect to the game loop
    state.game.disconnect(connection_id);

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    connection_id: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMsg>,
    game: &GameHandle,
    rate_limiter: ConnectionRateLimiter,
) {
    // Spawn writer task: game loop -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        debug!(connection_id = %connection_id, "Outbound channel closed");
    });

    // Reader loop: WebSocket -> game loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %connection_id, "Rate limited client message");
                    continue;
                }

                let delivered = match ClientMsg::parse(&text) {
                    Ok(ClientMsg::PlayerInput(input)) => game.input(connection_id, input),
                    Ok(ClientMsg::RestartGame) => game.restart(connection_id),
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Dropping client message");
                        true
                    }
                };

                if !delivered {
                    debug!(connection_id = %connection_id, "Game loop stopped");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, error = %ProtocolError::BinaryFrame, "Dropping client message");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
