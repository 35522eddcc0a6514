//! # Holdem Rooms
//!
//! A multi-room Texas Hold'em implementation built around isolated room units.
//!
//! This library provides a complete poker room engine with hand evaluation,
//! side-pot settlement, and per-room concurrency. Each room runs in its own
//! Tokio task and owns its state exclusively; callers interact through typed
//! tasks and receive typed replies, so no lock is ever taken on live game
//! state.
//!
//! ## Architecture
//!
//! The crate is split into two layers:
//!
//! - [`game`]: Pure, synchronous poker logic. Hand evaluation, pot
//!   settlement, and the room engine's betting state machine live here and
//!   have no dependency on the async runtime.
//! - [`room`]: The concurrency layer. A [`room::RoomActor`] wraps one engine
//!   in a task with a message inbox and an action clock; the
//!   [`room::RoomCoordinator`] spawns, supervises, and sweeps those tasks.
//!
//! ## Hand lifecycle
//!
//! A room is **IDLE** between hands. Starting a hand posts blinds, deals hole
//! cards, and walks the betting rounds **PRE_FLOP**, **FLOP**, **TURN**, and
//! **RIVER**. Automated rooms then settle the pot from hand strength;
//! manual-mode rooms instead enter a **DISTRIBUTION** stage where players
//! claim the pot themselves.
//!
//! ## Example
//!
//! ```
//! use holdem_rooms::game::RoomEngine;
//! use holdem_rooms::game::entities::Nickname;
//! use holdem_rooms::room::RoomConfig;
//!
//! // A lone engine, no runtime required.
//! let mut engine = RoomEngine::new(RoomConfig::automated("room-1", "Room 1"));
//! engine.join("alice".into(), Nickname::new("Alice"), None).unwrap();
//! assert!(engine.player(&"alice".into()).is_some());
//! ```

/// Pure poker logic: cards, evaluation, settlement, and the room engine.
pub mod game;
pub use game::{
    GameError, RoomEngine,
    constants::{self, CASH_IN_AMOUNT, DEFAULT_BIG_BLIND, DEFAULT_SMALL_BLIND, MAX_SEATS},
    entities::{self, Card, Chips, ConnId, PlayerId, RoomId, Stage},
};

/// Async room units: actors, tasks, events, and the coordinator.
pub mod room;
pub use room::{
    RoomActor, RoomConfig, RoomCoordinator,
    messages::{RoomEvent, RoomTask, TaskEnvelope},
};
