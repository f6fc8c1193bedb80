use crate::types::*;
use serde::{Deserialize, Serialize};

/// Inbound intents, discriminated by their `action` field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientMessage {
    Register {
        name: PlayerName,
        /// Join as a non-voting observer
        #[serde(default)]
        observer: bool,
    },
    Reset,
    RecordChoice {
        /// `null` or absent deselects the current card
        #[serde(default)]
        choice: Option<CardValue>,
    },
    Snooze {
        player: PlayerName,
    },
}

impl ClientMessage {
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Reset => "reset",
            ClientMessage::RecordChoice { .. } => "record-choice",
            ClientMessage::Snooze { .. } => "snooze",
        }
    }
}

/// Why a raw frame could not be turned into a [`ClientMessage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not JSON, not an object, or no string `action`
    MissingAction,
    /// Has an `action` but is not a valid intent
    Unsupported { action: String, reason: String },
}

/// Decode a raw text frame. Never panics on hostile input.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| DecodeError::MissingAction)?;

    let action = value
        .get("action")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or(DecodeError::MissingAction)?;

    serde_json::from_value(value).map_err(|e| DecodeError::Unsupported {
        action,
        reason: e.to_string(),
    })
}

/// Outbound messages. The wire format is untagged: clients tell messages
/// apart by the fields present (`players`, `choices`, `selected`, ...).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Full roster after a join or leave; every choice has been cleared
    Roster {
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<&'static str>,
        players: Vec<Player>,
        reset: bool,
    },
    /// Explicit round reset requested by a player
    RoundReset { reset: bool, originator: PlayerName },
    /// A player picked or withdrew a card, value kept private
    Selected { name: PlayerName, selected: bool },
    /// Every active player has chosen; choices are now public
    Reveal {
        choices: Vec<Player>,
        unanimous: bool,
    },
    SnoozeToggled {
        action: &'static str,
        player: PlayerName,
        snoozed: bool,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<&'static str>,
        error: String,
    },
}

impl ServerMessage {
    /// Roster sent to the connection that just registered
    pub fn registered(players: Vec<Player>) -> Self {
        ServerMessage::Roster {
            action: Some("register"),
            players,
            reset: true,
        }
    }

    /// Roster broadcast to everyone else after a join or leave
    pub fn roster(players: Vec<Player>) -> Self {
        ServerMessage::Roster {
            action: None,
            players,
            reset: true,
        }
    }

    pub fn round_reset(originator: PlayerName) -> Self {
        ServerMessage::RoundReset {
            reset: true,
            originator,
        }
    }

    pub fn snooze_toggled(player: PlayerName, snoozed: bool) -> Self {
        ServerMessage::SnoozeToggled {
            action: "snooze",
            player,
            snoozed,
        }
    }
}
