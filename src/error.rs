//! Client-recoverable intent rejections
//!
//! Every variant is reported back to the offending connection only; none of
//! them affect the session or other clients.

use crate::protocol::ServerMessage;

/// Result type for intent handling
pub type IntentResult<T> = Result<T, IntentError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("name is too short")]
    NameTooShort,

    #[error("name is already taken")]
    NameTaken,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("Player not found")]
    PlayerNotFound,

    #[error("not registered")]
    NotRegistered,

    #[error("malformed request, missing action")]
    Malformed,
}

impl IntentError {
    /// Stable identifier used in logs
    pub fn code(&self) -> &'static str {
        match self {
            IntentError::NameTooShort => "name-too-short",
            IntentError::NameTaken => "name-taken",
            IntentError::AlreadyRegistered => "already-registered",
            IntentError::PlayerNotFound => "player-not-found",
            IntentError::NotRegistered => "not-registered",
            IntentError::Malformed => "malformed-request",
        }
    }

    /// The `action` echoed back alongside the error, if the rejection belongs to one
    pub fn action(&self) -> Option<&'static str> {
        match self {
            IntentError::NameTooShort | IntentError::NameTaken | IntentError::AlreadyRegistered => {
                Some("register")
            }
            IntentError::PlayerNotFound => Some("snooze"),
            IntentError::NotRegistered | IntentError::Malformed => None,
        }
    }
}

impl From<IntentError> for ServerMessage {
    fn from(err: IntentError) -> Self {
        ServerMessage::Error {
            action: err.action(),
            error: err.to_string(),
        }
    }
}
