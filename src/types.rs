use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type ConnectionId = String;
pub type PlayerName = String;
pub type CardValue = String;

/// Create a fresh connection identifier
pub fn new_connection_id() -> ConnectionId {
    ulid::Ulid::new().to_string()
}

/// A registered participant, alive for the lifetime of one connection.
///
/// Serializes to the roster shape clients expect:
/// `{"name": "...", "choice": null, "snoozed": false, "observer": false}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub name: PlayerName,
    /// `None` means no card chosen this round
    pub choice: Option<CardValue>,
    pub snoozed: bool,
    #[serde(default)]
    pub observer: bool,
}

impl Player {
    pub fn new(name: impl Into<PlayerName>) -> Self {
        Self {
            name: name.into(),
            choice: None,
            snoozed: false,
            observer: false,
        }
    }

    pub fn observer(name: impl Into<PlayerName>) -> Self {
        Self {
            observer: true,
            ..Self::new(name)
        }
    }

    /// Active players gate the reveal; snoozed players and observers never do
    pub fn is_active(&self) -> bool {
        !self.snoozed && !self.observer
    }

    pub fn has_chosen(&self) -> bool {
        self.choice.is_some()
    }
}
