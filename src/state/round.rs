//! Round coordinator
//!
//! Interprets one client intent from one connection against the registry and
//! yields the messages that result: an optional reply to the sender plus any
//! broadcasts. Pure and synchronous; [`super::AppState`] provides the locking.

use super::registry::{is_unanimous, SessionRegistry};
use crate::broadcast::Envelope;
use crate::error::{IntentError, IntentResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::*;
use std::collections::HashMap;

/// Shortest accepted player name, in characters
pub const MIN_NAME_LEN: usize = 3;

/// Outcome of a successfully applied intent
#[derive(Debug, Default, Clone)]
pub struct Effects {
    /// Unicast to the connection that sent the intent
    pub reply: Option<ServerMessage>,
    pub broadcasts: Vec<Envelope>,
}

impl Effects {
    fn none() -> Self {
        Self::default()
    }

    fn broadcast(envelope: Envelope) -> Self {
        Self {
            reply: None,
            broadcasts: vec![envelope],
        }
    }
}

/// The single shared session: roster plus which connection speaks for which player
#[derive(Debug, Default)]
pub struct Session {
    registry: SessionRegistry,
    bindings: HashMap<ConnectionId, PlayerName>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Name of the player bound to this connection, if registered
    pub fn player_for(&self, connection: &ConnectionId) -> Option<&PlayerName> {
        self.bindings.get(connection)
    }

    pub fn bound_connections(&self) -> usize {
        self.bindings.len()
    }

    /// Apply one decoded intent from `connection`
    pub fn apply(
        &mut self,
        connection: &ConnectionId,
        msg: ClientMessage,
    ) -> IntentResult<Effects> {
        match msg {
            ClientMessage::Register { name, observer } => self.register(connection, name, observer),
            ClientMessage::Reset => {
                let me = self.bound_player(connection)?;
                Ok(self.reset_round(me))
            }
            ClientMessage::RecordChoice { choice } => {
                let me = self.bound_player(connection)?;
                self.record_choice(&me, choice)
            }
            ClientMessage::Snooze { player } => {
                self.bound_player(connection)?;
                self.snooze(&player)
            }
        }
    }

    fn bound_player(&self, connection: &ConnectionId) -> IntentResult<PlayerName> {
        self.bindings
            .get(connection)
            .cloned()
            .ok_or(IntentError::NotRegistered)
    }

    /// Rejection for a frame that named an action but was not a valid intent.
    /// Unbound connections are told to register first.
    pub fn reject_unsupported(&self, connection: &ConnectionId) -> IntentError {
        if self.bindings.contains_key(connection) {
            IntentError::Malformed
        } else {
            IntentError::NotRegistered
        }
    }

    /// React to a connection going away. Returns the roster broadcast for the
    /// remaining clients if the connection had a player.
    pub fn disconnect(&mut self, connection: &ConnectionId) -> Option<Envelope> {
        let name = self.bindings.remove(connection)?;
        self.registry.remove(&name);
        Some(Envelope::to_others(
            ServerMessage::roster(self.registry.snapshot()),
            connection,
        ))
    }

    /// Messages that rebuild the current round for a client that missed
    /// broadcasts. Before the reveal choices stay hidden: the roster goes out
    /// with every card cleared, followed by a `selected` per player who has
    /// picked one.
    pub fn resync_messages(&self) -> Vec<ServerMessage> {
        if self.registry.all_have_chosen() {
            return vec![self.reveal().message];
        }

        let players = self.registry.snapshot();
        let selected: Vec<ServerMessage> = players
            .iter()
            .filter(|p| p.has_chosen())
            .map(|p| ServerMessage::Selected {
                name: p.name.clone(),
                selected: true,
            })
            .collect();
        let hidden = players
            .into_iter()
            .map(|p| Player { choice: None, ..p })
            .collect();

        let mut messages = vec![ServerMessage::roster(hidden)];
        messages.extend(selected);
        messages
    }

    fn register(
        &mut self,
        connection: &ConnectionId,
        name: PlayerName,
        observer: bool,
    ) -> IntentResult<Effects> {
        if self.bindings.contains_key(connection) {
            return Err(IntentError::AlreadyRegistered);
        }
        if name.chars().count() < MIN_NAME_LEN {
            return Err(IntentError::NameTooShort);
        }

        let player = if observer {
            Player::observer(name.clone())
        } else {
            Player::new(name.clone())
        };
        if !self.registry.register(player) {
            return Err(IntentError::NameTaken);
        }

        tracing::info!("{} registered (observer: {})", name, observer);
        self.bindings.insert(connection.clone(), name);

        let players = self.registry.snapshot();
        Ok(Effects {
            reply: Some(ServerMessage::registered(players.clone())),
            broadcasts: vec![Envelope::to_others(
                ServerMessage::roster(players),
                connection,
            )],
        })
    }

    fn reset_round(&mut self, originator: PlayerName) -> Effects {
        tracing::info!("Round reset by {}", originator);
        self.registry.reset();
        Effects::broadcast(Envelope::to_all(ServerMessage::round_reset(originator)))
    }

    fn record_choice(&mut self, me: &str, choice: Option<CardValue>) -> IntentResult<Effects> {
        // Choices are frozen once revealed, until the next reset
        if self.registry.all_have_chosen() {
            tracing::debug!("Ignoring choice from {} after reveal", me);
            return Ok(Effects::none());
        }

        let selected = choice.is_some();
        if !self.registry.record_choice(me, choice) {
            return Err(IntentError::NotRegistered);
        }
        tracing::debug!("{} selected: {}", me, selected);

        if self.registry.all_have_chosen() {
            return Ok(Effects::broadcast(self.reveal()));
        }

        Ok(Effects::broadcast(Envelope::to_all(ServerMessage::Selected {
            name: me.to_string(),
            selected,
        })))
    }

    fn snooze(&mut self, target: &str) -> IntentResult<Effects> {
        let snoozed = self
            .registry
            .toggle_snooze(target)
            .ok_or(IntentError::PlayerNotFound)?;
        tracing::info!("{} snoozed: {}", target, snoozed);

        let mut effects = Effects::broadcast(Envelope::to_all(ServerMessage::snooze_toggled(
            target.to_string(),
            snoozed,
        )));

        if self.registry.len() > 1 && self.registry.all_have_chosen() {
            effects.broadcasts.push(self.reveal());
        }
        Ok(effects)
    }

    fn reveal(&self) -> Envelope {
        let choices = self.registry.snapshot();
        let unanimous = is_unanimous(&choices);
        tracing::info!(
            "Revealing {} choices (unanimous: {})",
            choices.len(),
            unanimous
        );
        Envelope::to_all(ServerMessage::Reveal { choices, unanimous })
    }
}
