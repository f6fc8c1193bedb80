//! WebSocket message dispatch
//!
//! Decodes a raw text frame and routes it to the session. Every answer,
//! rejections included, reaches the sender through the shared channel.

use crate::protocol::{decode_client_message, DecodeError};
use crate::state::AppState;
use crate::types::ConnectionId;
use std::sync::Arc;

/// Handle one inbound text frame
pub async fn handle_message(text: &str, connection: &ConnectionId, state: &Arc<AppState>) {
    match decode_client_message(text) {
        Ok(msg) => state.handle_intent(connection, msg).await,
        Err(error) => {
            match &error {
                DecodeError::MissingAction => {
                    tracing::warn!("Malformed frame from {}", connection);
                }
                DecodeError::Unsupported { action, reason } => {
                    tracing::warn!(
                        "Unsupported action {:?} from {}: {}",
                        action,
                        connection,
                        reason
                    );
                }
            }
            state.reject(connection, &error).await;
        }
    }
}
