//! Poker game logic - cards, evaluation, settlement, and the room engine.
//!
//! Everything in this module is synchronous and deterministic given a deck
//! order. The async layer in [`crate::room`] drives it but never reaches
//! into its state directly.

pub mod constants;
pub mod engine;
pub mod entities;
pub mod evaluator;
pub mod settlement;

pub use engine::{EngineEvent, GameError, RoomEngine};
pub use evaluator::{HandRank, HandScore, evaluate};
pub use settlement::{SidePot, side_pots};
