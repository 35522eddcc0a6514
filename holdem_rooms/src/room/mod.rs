//! Room units: one Tokio task per room with exclusive state ownership.
//!
//! This module implements:
//! - RoomActor: async task wrapping one [`crate::game::RoomEngine`]
//! - RoomCoordinator: spawns, dispatches to, and sweeps room units
//! - ActionClock: the single rearmable deadline for the player to act
//! - Message-based communication with tokio channels
//!
//! ## Architecture
//!
//! Each room runs in a separate Tokio task with an mpsc task inbox. All
//! game state lives inside the task; the coordinator keeps only thin
//! metadata fed by notifications, plus a roster snapshot refreshed when a
//! unit stops. Dispatching a task means sending an envelope with a oneshot
//! reply slot and awaiting it under a timeout, so a wedged room can never
//! hang its callers.
//!
//! ## Example
//!
//! ```ignore
//! use holdem_rooms::room::{RoomConfig, RoomCoordinator, RoomTask};
//!
//! #[tokio::main]
//! async fn main() {
//!     let configs = vec![RoomConfig::automated("room1", "Room 1")];
//!     let (coordinator, mut outbound) = RoomCoordinator::new(configs);
//!
//!     // Relay outbound events to connected clients.
//!     tokio::spawn(async move {
//!         while let Some(message) = outbound.recv().await {
//!             // route message.event by message.scope
//!         }
//!     });
//!
//!     let room = "room1".into();
//!     let task = RoomTask::JoinRoom {
//!         player_id: "alice".into(),
//!         nickname: "Alice".into(),
//!     };
//!     coordinator.dispatch(&room, task, None).await.unwrap();
//! }
//! ```

pub mod actor;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod messages;

pub use actor::{RoomActor, RoomHandle};
pub use clock::ActionClock;
pub use config::RoomConfig;
pub use coordinator::{DispatchError, RoomCoordinator};
pub use messages::{
    EventScope, OutboundMessage, RoomEvent, RoomMeta, RoomTask, TaskEnvelope, TaskPayload,
};
