//! Authoritative simulation core for a multiplayer mecha arena.
//!
//! [`game::MatchCoordinator`] runs lobby, match lifecycle, combat, agents and
//! scoring one deterministic tick at a time; [`game::GameMatch`] drives it
//! from a tokio task for the network layer.

pub mod config;
pub mod game;
pub mod protocol;
pub mod util;
