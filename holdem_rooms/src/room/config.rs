//! Room configuration models.

use serde::{Deserialize, Serialize};

use crate::game::constants::{DEFAULT_MAX_PLAYERS, MAX_SEATS};
use crate::game::entities::{Blinds, RoomId};

/// Room configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Stable room identifier, used in routes and task envelopes
    pub id: RoomId,

    /// Display name
    pub name: String,

    /// Maximum number of seats (default: 20)
    pub max_players: usize,

    /// Small and big blind amounts
    pub blinds: Blinds,

    /// Automated rooms shuffle, deal, and settle the pot themselves.
    /// Manual rooms track bets for a physical deck and let the players
    /// distribute the pot.
    pub automated: bool,
}

impl RoomConfig {
    pub fn new(id: impl Into<RoomId>, name: impl Into<String>, automated: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_players: DEFAULT_MAX_PLAYERS,
            blinds: Blinds::default(),
            automated,
        }
    }

    /// An automated room: the server owns the deck.
    pub fn automated(id: impl Into<RoomId>, name: impl Into<String>) -> Self {
        Self::new(id, name, true)
    }

    /// A manual room: cards live on a physical table, the server only
    /// tracks chips.
    pub fn manual(id: impl Into<RoomId>, name: impl Into<String>) -> Self {
        Self::new(id, name, false)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().is_empty() {
            return Err("Room id must not be empty".to_string());
        }

        if self.blinds.small == 0 {
            return Err("Small blind must be at least 1".to_string());
        }

        if self.blinds.big <= self.blinds.small {
            return Err("Big blind must be greater than small blind".to_string());
        }

        if self.max_players < 2 || self.max_players > MAX_SEATS {
            return Err(format!("Max players must be between 2 and {MAX_SEATS}"));
        }

        Ok(())
    }
}
