//! Fixed amounts and timing windows shared across the crate.

use std::time::Duration;

use super::entities::Chips;

/// Chips granted by every cash-in.
pub const CASH_IN_AMOUNT: Chips = 1_000;

/// Default small blind for new rooms.
pub const DEFAULT_SMALL_BLIND: Chips = 5;

/// Default big blind for new rooms.
pub const DEFAULT_BIG_BLIND: Chips = 10;

/// Default seat count for provisioned rooms.
pub const DEFAULT_MAX_PLAYERS: usize = 20;

/// Hard cap on seats per room. Two hole cards for 23 players plus five
/// community cards is 51, the most a 52-card deck can cover.
pub const MAX_SEATS: usize = 23;

/// Longest nickname a player can display.
pub const MAX_NICKNAME_LENGTH: usize = 24;

/// How long the player to act has before the room acts for them.
pub const ACTION_WINDOW: Duration = Duration::from_secs(30);

/// How long a coordinator dispatch waits for the room unit to reply.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Removal grace for a disconnected player with no chips.
pub const SHORT_DISCONNECT_GRACE: Duration = Duration::from_secs(10);

/// Removal grace for a disconnected player still holding chips.
pub const LONG_DISCONNECT_GRACE: Duration = Duration::from_secs(15 * 60);

/// How often a room checks for reapable offline players.
pub const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// How often the coordinator sweeps for idle room units.
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How long a room must sit empty and idle before the sweep retires it.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(60);
