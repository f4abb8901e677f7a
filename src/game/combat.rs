//! Combat system - spread, hit detection, damage

use glam::Vec2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::weapon::WeaponDefinition;
use super::world::{ray_circle, WorldQuery};
use crate::protocol::CombatantId;

/// Combat constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatTuning {
    /// Share of incoming damage armor can soak
    pub armor_absorb_ratio: f32,
    /// Starting reserve = magazine × this
    pub reserve_multiplier: f32,
    pub headshot_multiplier: f32,
    /// A hit whose closest approach is within this fraction of the hitbox
    /// radius counts as a headshot
    pub headshot_fraction: f32,
    /// Spread multiplier while aiming
    pub aim_spread_factor: f32,
    pub movement_spread_factor: f32,
    pub recoil_spread_factor: f32,
    /// Exponential recoil recovery rate (per second)
    pub recoil_recovery_rate: f32,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            armor_absorb_ratio: 0.7,
            reserve_multiplier: 3.0,
            headshot_multiplier: 2.0,
            headshot_fraction: 0.25,
            aim_spread_factor: 0.3,
            movement_spread_factor: 0.1,
            recoil_spread_factor: 0.01,
            recoil_recovery_rate: 4.0,
        }
    }
}

/// Something a shot can hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTarget {
    pub id: CombatantId,
    pub position: Vec2,
    pub radius: f32,
}

/// Hit result from shot resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotHit {
    pub target_id: CombatantId,
    pub distance: f32,
    pub headshot: bool,
}

/// Stateless combat rules
pub struct CombatSystem;

impl CombatSystem {
    /// Split a hit between armor and health: armor takes up to `ratio` of the
    /// damage, capped by what is left of it. Returns (absorbed, health_loss).
    pub fn split_damage(amount: f32, armor: f32, ratio: f32) -> (f32, f32) {
        let absorbed = (amount * ratio.clamp(0.0, 1.0)).min(armor.max(0.0));
        (absorbed, amount - absorbed)
    }

    /// Shot spread from weapon accuracy, movement (0-1+) and accumulated
    /// recoil, tightened while aiming.
    pub fn spread(
        def: &WeaponDefinition,
        movement: f32,
        recoil: f32,
        aiming: bool,
        tuning: &CombatTuning,
    ) -> f32 {
        let base = (1.0 - def.accuracy.clamp(0.0, 1.0))
            + movement.max(0.0) * tuning.movement_spread_factor
            + recoil.max(0.0) * tuning.recoil_spread_factor;
        if aiming {
            base * tuning.aim_spread_factor
        } else {
            base
        }
    }

    /// Deviate the aim direction sideways by up to `spread`
    pub fn deviate(direction: Vec2, spread: f32, rng: &mut ChaCha8Rng) -> Vec2 {
        let offset: f32 = rng.gen_range(-1.0..=1.0) * spread;
        let deviated = direction + direction.perp() * offset;
        deviated.try_normalize().unwrap_or(direction)
    }

    /// Single hit-test along `direction` out to `range`. The nearest of
    /// obstacle and target hitboxes wins.
    pub fn trace(
        origin: Vec2,
        direction: Vec2,
        range: f32,
        targets: &[HitTarget],
        world: &dyn WorldQuery,
        headshot_fraction: f32,
    ) -> Option<ShotHit> {
        let direction = direction.try_normalize()?;
        let blocked_at = world.obstacle_distance(origin, direction, range).unwrap_or(f32::INFINITY);

        targets
            .iter()
            .filter_map(|target| {
                let (distance, approach) =
                    ray_circle(origin, direction, target.position, target.radius)?;
                (distance <= range && distance < blocked_at).then_some(ShotHit {
                    target_id: target.id,
                    distance,
                    headshot: approach <= target.radius * headshot_fraction,
                })
            })
            .min_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(a.target_id.cmp(&b.target_id))
            })
    }

    /// Damage of a hit: ×2 on headshots, × the shooter's overcharge multiplier
    pub fn shot_damage(base: f32, headshot: bool, multiplier: f32, tuning: &CombatTuning) -> f32 {
        let head = if headshot {
            tuning.headshot_multiplier
        } else {
            1.0
        };
        base * head * multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::weapon::WeaponCatalog;
    use crate::game::world::ArenaMap;
    use rand::SeedableRng;

    fn target(id: u32, x: f32, y: f32) -> HitTarget {
        HitTarget {
            id: CombatantId(id),
            position: Vec2::new(x, y),
            radius: 1.0,
        }
    }

    #[test]
    fn split_caps_at_remaining_armor() {
        assert_eq!(CombatSystem::split_damage(100.0, 50.0, 0.7), (50.0, 50.0));
        assert_eq!(CombatSystem::split_damage(10.0, 50.0, 0.7), (7.0, 3.0));
        assert_eq!(CombatSystem::split_damage(10.0, 0.0, 0.7), (0.0, 10.0));
    }

    #[test]
    fn spread_formula() {
        let tuning = CombatTuning::default();
        let rifle = WeaponCatalog::default().assault_rifle;
        let hip = CombatSystem::spread(&rifle, 1.0, 10.0, false, &tuning);
        assert!((hip - (0.15 + 0.1 + 0.1)).abs() < 1e-5);
        let aimed = CombatSystem::spread(&rifle, 1.0, 10.0, true, &tuning);
        assert!((aimed - hip * 0.3).abs() < 1e-5);
    }

    #[test]
    fn zero_spread_keeps_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let dir = CombatSystem::deviate(Vec2::Y, 0.0, &mut rng);
        assert!((dir - Vec2::Y).length() < 1e-6);
    }

    #[test]
    fn trace_hits_nearest_target_in_range() {
        let map = ArenaMap::proving_ground();
        let targets = [target(1, -10.0, 5.0), target(2, -10.0, 3.0)];
        let origin = Vec2::new(-10.0, -10.0);

        let hit = CombatSystem::trace(origin, Vec2::Y, 50.0, &targets, &map, 0.25).unwrap();
        assert_eq!(hit.target_id, CombatantId(2));
        assert!(hit.headshot);

        assert!(CombatSystem::trace(origin, Vec2::Y, 5.0, &targets, &map, 0.25).is_none());
    }

    #[test]
    fn grazing_hit_is_not_a_headshot() {
        let map = ArenaMap::proving_ground();
        let targets = [target(1, -9.5, 0.0)];
        let hit = CombatSystem::trace(Vec2::new(-10.0, -10.0), Vec2::Y, 50.0, &targets, &map, 0.25)
            .unwrap();
        assert!(!hit.headshot);
    }

    #[test]
    fn obstacles_stop_shots() {
        let map = ArenaMap::proving_ground();
        // obstacle at (0, 8) radius 2
        let targets = [target(1, 0.0, 14.0)];
        assert!(CombatSystem::trace(Vec2::ZERO, Vec2::Y, 50.0, &targets, &map, 0.25).is_none());
    }

    #[test]
    fn damage_multipliers_stack() {
        let tuning = CombatTuning::default();
        assert_eq!(CombatSystem::shot_damage(20.0, false, 1.0, &tuning), 20.0);
        assert_eq!(CombatSystem::shot_damage(20.0, true, 1.5, &tuning), 60.0);
    }
}
