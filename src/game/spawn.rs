//! Spawn point selection

use glam::Vec2;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Picks spawn points away from active combatants
pub struct SpawnSelector;

impl SpawnSelector {
    /// Choose uniformly among candidates with no active combatant inside
    /// `safety_radius`; when none is safe, choose uniformly among all of them.
    /// Only an empty candidate list yields `None`.
    pub fn select(
        candidates: &[Vec2],
        occupied: &[Vec2],
        safety_radius: f32,
        rng: &mut ChaCha8Rng,
    ) -> Option<Vec2> {
        let safety_sq = safety_radius * safety_radius;
        let safe: Vec<Vec2> = candidates
            .iter()
            .copied()
            .filter(|c| occupied.iter().all(|p| p.distance_squared(*c) > safety_sq))
            .collect();

        if safe.is_empty() {
            candidates.choose(rng).copied()
        } else {
            safe.choose(rng).copied()
        }
    }
}
