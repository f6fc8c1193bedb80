pub mod registry;
pub mod round;

pub use registry::SessionRegistry;
pub use round::{Effects, Session};

use crate::broadcast::Envelope;
use crate::config::ServerConfig;
use crate::error::IntentError;
use crate::protocol::{ClientMessage, DecodeError, ServerMessage};
use crate::types::*;
use tokio::sync::{broadcast, Mutex};

/// Shared application state
pub struct AppState {
    /// The one session. Every intent runs to completion under this lock.
    session: Mutex<Session>,
    /// Fan-out channel every connection subscribes to
    pub broadcast: broadcast::Sender<Envelope>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let (tx, _rx) = broadcast::channel(config.broadcast_capacity);
        Self {
            session: Mutex::new(Session::new()),
            broadcast: tx,
            config,
        }
    }

    /// Apply an intent and publish everything it produced: the reply (or
    /// rejection) for the sender and the broadcasts for everyone else.
    ///
    /// All of it is enqueued before the lock is released, so each client
    /// observes messages in processing order, its own replies included.
    pub async fn handle_intent(&self, connection: &ConnectionId, msg: ClientMessage) {
        let action = msg.action();
        let mut session = self.session.lock().await;
        match session.apply(connection, msg) {
            Ok(effects) => {
                if let Some(reply) = effects.reply {
                    self.publish(Envelope::to_one(reply, connection));
                }
                for envelope in effects.broadcasts {
                    self.publish(envelope);
                }
            }
            Err(e) => {
                tracing::warn!("Rejected {} from {}: {}", action, connection, e.code());
                self.publish(Envelope::to_one(e.into(), connection));
            }
        }
    }

    /// Answer a frame that did not decode into an intent
    pub async fn reject(&self, connection: &ConnectionId, error: &DecodeError) {
        let session = self.session.lock().await;
        let rejection = match error {
            DecodeError::MissingAction => IntentError::Malformed,
            DecodeError::Unsupported { .. } => session.reject_unsupported(connection),
        };
        self.publish(Envelope::to_one(rejection.into(), connection));
    }

    /// Drop whatever player the connection held and tell everyone else
    pub async fn disconnect(&self, connection: &ConnectionId) {
        let mut session = self.session.lock().await;
        if let Some(envelope) = session.disconnect(connection) {
            self.publish(envelope);
        }
    }

    /// Current round state for a connection that fell behind, plus a fresh
    /// receiver positioned right after it. Taken under the lock, so nothing
    /// published in between is lost or seen twice.
    pub async fn resync(&self) -> (Vec<ServerMessage>, broadcast::Receiver<Envelope>) {
        let session = self.session.lock().await;
        (session.resync_messages(), self.broadcast.subscribe())
    }

    /// Copy of the roster, in join order
    pub async fn players(&self) -> Vec<Player> {
        self.session.lock().await.registry().snapshot()
    }

    pub async fn player_for(&self, connection: &ConnectionId) -> Option<PlayerName> {
        self.session.lock().await.player_for(connection).cloned()
    }

    /// Player and connection counts read at the same moment
    pub async fn stats(&self) -> SessionStats {
        let session = self.session.lock().await;
        SessionStats {
            players: session.registry().len(),
            connections: session.bound_connections(),
        }
    }

    fn publish(&self, envelope: Envelope) {
        // No subscribers is fine
        let _ = self.broadcast.send(envelope);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub players: usize,
    /// Connections bound to a player
    pub connections: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
