//! Game simulation modules

pub mod ai;
pub mod combat;
pub mod combatant;
pub mod r#match;
pub mod movement;
pub mod schedule;
pub mod scoring;
pub mod session;
pub mod snapshot;
pub mod spawn;
pub mod weapon;
pub mod world;

pub use r#match::{Combatant, Controller, MatchCoordinator, MatchError};
pub use session::{GameMatch, MatchCommand, MatchHandle, MatchRegistry, SessionError, SessionMsg};
pub use world::{ArenaMap, MapCatalog, WorldQuery};
