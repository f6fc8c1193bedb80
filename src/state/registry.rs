//! Session registry
//!
//! The authoritative, ordered roster of registered players. Names are unique,
//! insertion order is the order clients see, and any join or leave clears the
//! current round.

use crate::types::*;

/// Fewest active players for which a reveal can happen. A lone voter never
/// auto-reveals, and neither does a session where everyone else is snoozed.
pub const MIN_ACTIVE_FOR_REVEAL: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    players: Vec<Player>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player unless the name is already present.
    /// Returns false (and changes nothing) on a duplicate name.
    pub fn register(&mut self, player: Player) -> bool {
        if self.contains(&player.name) {
            return false;
        }
        self.players.push(player);
        self.reset();
        true
    }

    /// Remove the player with this name, clearing the round.
    /// Unknown names are a no-op and return `None`.
    pub fn remove(&mut self, name: &str) -> Option<Player> {
        let idx = self.players.iter().position(|p| p.name == name)?;
        let player = self.players.remove(idx);
        tracing::info!("{} unregistered", player.name);
        self.reset();
        Some(player)
    }

    /// Clear every choice; snooze and observer flags are untouched
    pub fn reset(&mut self) {
        for player in &mut self.players {
            player.choice = None;
        }
    }

    /// First player in insertion order matching the predicate
    pub fn find<P>(&self, predicate: P) -> Option<&Player>
    where
        P: Fn(&Player) -> bool,
    {
        self.players.iter().find(|p| predicate(p))
    }

    pub fn get(&self, name: &str) -> Option<&Player> {
        self.find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Players that are neither snoozed nor observing
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_active())
    }

    /// Reveal-readiness: at least [`MIN_ACTIVE_FOR_REVEAL`] active players,
    /// all of whom have a card down
    pub fn all_have_chosen(&self) -> bool {
        let mut count = 0;
        for player in self.active() {
            if !player.has_chosen() {
                return false;
            }
            count += 1;
        }
        count >= MIN_ACTIVE_FOR_REVEAL
    }

    /// Owned copy of the roster, in insertion order
    pub fn snapshot(&self) -> Vec<Player> {
        self.players.clone()
    }

    /// Set (or clear) a player's card. Choosing always wakes a snoozed player.
    /// Returns false if the player is unknown.
    pub fn record_choice(&mut self, name: &str, choice: Option<CardValue>) -> bool {
        match self.players.iter_mut().find(|p| p.name == name) {
            Some(player) => {
                player.snoozed = false;
                player.choice = choice;
                true
            }
            None => false,
        }
    }

    /// Flip a player's snooze flag, returning the new value
    pub fn toggle_snooze(&mut self, name: &str) -> Option<bool> {
        let player = self.players.iter_mut().find(|p| p.name == name)?;
        player.snoozed = !player.snoozed;
        Some(player.snoozed)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Whether a revealed set agrees: at least two active players, all holding
/// the same card.
pub fn is_unanimous(players: &[Player]) -> bool {
    let mut active = players.iter().filter(|p| p.is_active());

    let first = match active.next().and_then(|p| p.choice.as_ref()) {
        Some(choice) => choice,
        None => return false,
    };

    let mut count = 1;
    for player in active {
        if player.choice.as_ref() != Some(first) {
            return false;
        }
        count += 1;
    }
    count >= 2
}
