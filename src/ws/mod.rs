pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::{Sink, SinkExt},
    stream::StreamExt,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{new_connection_id, ConnectionId};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message. Returns false if the socket is gone.
async fn send_message<S>(sender: &mut S, msg: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Liveness of one connection. Every tick sends a ping; a tick that finds the
/// previous ping still unanswered means the client is gone.
#[derive(Debug, Default)]
pub struct Heartbeat {
    awaiting_pong: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Ping,
    Dead,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> Beat {
        if self.awaiting_pong {
            return Beat::Dead;
        }
        self.awaiting_pong = true;
        Beat::Ping
    }

    pub fn pong(&mut self) {
        self.awaiting_pong = false;
    }
}

async fn send_all<S>(sender: &mut S, messages: &[ServerMessage]) -> bool
where
    S: Sink<Message> + Unpin,
{
    for msg in messages {
        if !send_message(sender, msg).await {
            return false;
        }
    }
    true
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection: ConnectionId = new_connection_id();
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("Connected: {}", connection);

    // Unregistered clients see broadcasts too
    let mut broadcast_rx = state.broadcast.subscribe();

    let period = state.config.heartbeat_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut heartbeat = Heartbeat::new();

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                match broadcast_msg {
                    Ok(envelope) => {
                        if envelope.is_for(&connection)
                            && !send_message(&mut sender, &envelope.message).await
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection {} lagged, skipped {} messages", connection, skipped);
                        let (messages, rx) = state.resync().await;
                        broadcast_rx = rx;
                        if !send_all(&mut sender, &messages).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = ticker.tick() => {
                if heartbeat.tick() == Beat::Dead {
                    tracing::info!("Client is dead: {}", connection);
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message from {}: {}", connection, text);
                        handlers::handle_message(text.as_str(), &connection, &state).await;
                    }
                    Some(Ok(Message::Pong(_))) => heartbeat.pong(),
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
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

    state.disconnect(&connection).await;
    tracing::info!("WebSocket connection closed: {}", connection);
}
