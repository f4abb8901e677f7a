//! What an agent can know about the world: a per-tick snapshot of every
//! combatant, and the visibility query run against it.

use glam::Vec2;
use std::collections::BTreeMap;

use crate::game::world::WorldQuery;
use crate::protocol::{CombatantId, MechaClass, Team};

/// Read-only copy of one combatant, taken at the start of a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatantView {
    pub id: CombatantId,
    pub position: Vec2,
    pub facing: Vec2,
    pub team: Option<Team>,
    pub class: MechaClass,
    pub alive: bool,
    pub health_fraction: f32,
    pub energy: f32,
    pub current_ammo: u32,
    pub magazine_size: u32,
    pub reserve_ammo: u32,
    pub reloading: bool,
}

impl CombatantView {
    /// True when `other` fights on the same side as this combatant
    pub fn is_ally(&self, other: &CombatantView) -> bool {
        self.team.is_some() && self.team == other.team
    }
}

/// Consistent snapshot of all combatants for one tick
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    combatants: BTreeMap<CombatantId, CombatantView>,
}

impl WorldView {
    pub fn new(combatants: impl IntoIterator<Item = CombatantView>) -> Self {
        Self {
            combatants: combatants.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, id: CombatantId) -> Option<&CombatantView> {
        self.combatants.get(&id)
    }

    pub fn is_alive(&self, id: CombatantId) -> bool {
        self.combatants.get(&id).is_some_and(|c| c.alive)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatantView> {
        self.combatants.values()
    }
}

/// A combatant the observer can currently see
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perceived {
    pub id: CombatantId,
    pub position: Vec2,
    pub distance: f32,
}

/// Hostile, alive combatants within `sight_range` with clear line of sight,
/// closest first (ties by id).
pub fn perceive(
    observer: &CombatantView,
    sight_range: f32,
    view: &WorldView,
    world: &dyn WorldQuery,
) -> Vec<Perceived> {
    let mut seen: Vec<Perceived> = view
        .iter()
        .filter(|other| other.id != observer.id && other.alive && !observer.is_ally(other))
        .filter_map(|other| {
            let distance = observer.position.distance(other.position);
            (distance <= sight_range && world.line_of_sight(observer.position, other.position))
                .then_some(Perceived {
                    id: other.id,
                    position: other.position,
                    distance,
                })
        })
        .collect();

    seen.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
    seen
}
