//! Combatant resources: health, armor, energy, life state and abilities

use serde::{Deserialize, Serialize};

use super::combat::CombatSystem;
use crate::protocol::MechaClass;

/// Base stats per mecha class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub max_health: f32,
    pub max_armor: f32,
    pub max_energy: f32,
    /// Energy regained per second while not sprinting
    pub energy_regen: f32,
    /// Energy spent per second while sprinting
    pub sprint_drain: f32,
    /// Movement speed (units per second)
    pub move_speed: f32,
    pub sprint_multiplier: f32,
    pub hitbox_radius: f32,
}

/// Class stat table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassTable {
    pub light: ClassStats,
    pub medium: ClassStats,
    pub heavy: ClassStats,
}

impl ClassTable {
    pub fn stats(&self, class: MechaClass) -> &ClassStats {
        match class {
            MechaClass::Light => &self.light,
            MechaClass::Medium => &self.medium,
            MechaClass::Heavy => &self.heavy,
        }
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self {
            light: ClassStats {
                max_health: 80.0,
                max_armor: 30.0,
                max_energy: 100.0,
                energy_regen: 15.0,
                sprint_drain: 20.0,
                move_speed: 9.0,
                sprint_multiplier: 1.5,
                hitbox_radius: 0.8,
            },
            medium: ClassStats {
                max_health: 100.0,
                max_armor: 50.0,
                max_energy: 100.0,
                energy_regen: 12.0,
                sprint_drain: 20.0,
                move_speed: 7.0,
                sprint_multiplier: 1.4,
                hitbox_radius: 1.0,
            },
            heavy: ClassStats {
                max_health: 150.0,
                max_armor: 80.0,
                max_energy: 120.0,
                energy_regen: 10.0,
                sprint_drain: 25.0,
                move_speed: 5.0,
                sprint_multiplier: 1.3,
                hitbox_radius: 1.3,
            },
        }
    }
}

/// Class abilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    /// Light: forward velocity impulse
    Dash,
    /// Medium: temporary armor bonus
    Shield,
    /// Heavy: temporary weapon damage multiplier
    Overcharge,
}

impl MechaClass {
    pub fn ability(&self) -> AbilityKind {
        match self {
            MechaClass::Light => AbilityKind::Dash,
            MechaClass::Medium => AbilityKind::Shield,
            MechaClass::Heavy => AbilityKind::Overcharge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashParams {
    pub energy_cost: f32,
    /// Velocity added along the facing direction
    pub impulse: f32,
    pub cooldown: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldParams {
    pub energy_cost: f32,
    pub armor_bonus: f32,
    pub duration: f32,
    pub cooldown: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverchargeParams {
    pub energy_cost: f32,
    pub damage_multiplier: f32,
    pub duration: f32,
    pub cooldown: f32,
}

/// Ability parameter table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityTable {
    pub dash: DashParams,
    pub shield: ShieldParams,
    pub overcharge: OverchargeParams,
}

impl AbilityTable {
    pub fn energy_cost(&self, ability: AbilityKind) -> f32 {
        match ability {
            AbilityKind::Dash => self.dash.energy_cost,
            AbilityKind::Shield => self.shield.energy_cost,
            AbilityKind::Overcharge => self.overcharge.energy_cost,
        }
    }

    pub fn cooldown(&self, ability: AbilityKind) -> f32 {
        match ability {
            AbilityKind::Dash => self.dash.cooldown,
            AbilityKind::Shield => self.shield.cooldown,
            AbilityKind::Overcharge => self.overcharge.cooldown,
        }
    }
}

impl Default for AbilityTable {
    fn default() -> Self {
        Self {
            dash: DashParams {
                energy_cost: 30.0,
                impulse: 25.0,
                cooldown: 1.5,
            },
            shield: ShieldParams {
                energy_cost: 40.0,
                armor_bonus: 50.0,
                duration: 5.0,
                cooldown: 8.0,
            },
            overcharge: OverchargeParams {
                energy_cost: 50.0,
                damage_multiplier: 1.5,
                duration: 6.0,
                cooldown: 10.0,
            },
        }
    }
}

/// Effect of a successful activation, applied by the match coordinator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AbilityEffect {
    Dash { impulse: f32 },
    Shield { duration: f32 },
    Overcharge { duration: f32 },
}

impl AbilityEffect {
    pub fn kind(&self) -> AbilityKind {
        match self {
            Self::Dash { .. } => AbilityKind::Dash,
            Self::Shield { .. } => AbilityKind::Shield,
            Self::Overcharge { .. } => AbilityKind::Overcharge,
        }
    }
}

/// Result of an applied hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub armor_absorbed: f32,
    pub health_loss: f32,
    /// The hit took health to zero; the combatant is now dead
    pub killed: bool,
}

/// Resource state of one combatant
#[derive(Debug, Clone, PartialEq)]
pub struct CombatantState {
    pub class: MechaClass,
    pub health: f32,
    pub max_health: f32,
    pub armor: f32,
    pub max_armor: f32,
    pub energy: f32,
    pub max_energy: f32,
    alive: bool,
    shield_bonus: f32,
    /// Part of the shield bonus not yet absorbed by damage
    shield_armor: f32,
    overcharge_multiplier: Option<f32>,
    ability_cooldown: f32,
    /// Incremented on every respawn
    life: u32,
}

impl CombatantState {
    pub fn new(class: MechaClass, stats: &ClassStats) -> Self {
        Self {
            class,
            health: stats.max_health,
            max_health: stats.max_health,
            armor: stats.max_armor,
            max_armor: stats.max_armor,
            energy: stats.max_energy,
            max_energy: stats.max_energy,
            alive: true,
            shield_bonus: 0.0,
            shield_armor: 0.0,
            overcharge_multiplier: None,
            ability_cooldown: 0.0,
            life: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn life(&self) -> u32 {
        self.life
    }

    pub fn health_fraction(&self) -> f32 {
        fraction(self.health, self.max_health)
    }

    pub fn armor_fraction(&self) -> f32 {
        fraction(self.armor, self.max_armor)
    }

    pub fn energy_fraction(&self) -> f32 {
        fraction(self.energy, self.max_energy)
    }

    pub fn is_shielded(&self) -> bool {
        self.shield_bonus > 0.0
    }

    pub fn ability_cooldown(&self) -> f32 {
        self.ability_cooldown
    }

    /// Weapon damage multiplier from an active overcharge
    pub fn damage_multiplier(&self) -> f32 {
        self.overcharge_multiplier.unwrap_or(1.0)
    }

    /// Apply incoming damage. Armor absorbs up to `absorb_ratio` of the hit,
    /// capped by remaining armor; the rest comes off health. Returns `None`
    /// (and changes nothing) when already dead.
    pub fn take_damage(&mut self, amount: f32, absorb_ratio: f32) -> Option<DamageOutcome> {
        if !self.alive {
            return None;
        }
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };

        let (armor_absorbed, health_loss) = CombatSystem::split_damage(amount, self.armor, absorb_ratio);
        self.armor = (self.armor - armor_absorbed).clamp(0.0, self.max_armor);
        // shield armor soaks damage before the mecha's own plating
        self.shield_armor = (self.shield_armor - armor_absorbed).max(0.0);
        self.health = (self.health - health_loss).clamp(0.0, self.max_health);

        let killed = self.health <= 0.0;
        if killed {
            self.alive = false;
        }

        Some(DamageOutcome {
            armor_absorbed,
            health_loss,
            killed,
        })
    }

    /// Mark dead without damage (external kill). Returns false when already
    /// dead.
    pub fn kill(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.health = 0.0;
        self.alive = false;
        true
    }

    pub fn heal(&mut self, amount: f32) {
        if self.alive && amount.is_finite() && amount > 0.0 {
            self.health = (self.health + amount).min(self.max_health);
        }
    }

    /// Per-tick upkeep: energy drain while sprinting, regeneration otherwise,
    /// and the ability cooldown.
    pub fn tick(&mut self, stats: &ClassStats, dt: f32, sprinting: bool) {
        self.ability_cooldown = (self.ability_cooldown - dt).max(0.0);
        if !self.alive {
            return;
        }
        let delta = if sprinting {
            -stats.sprint_drain * dt
        } else {
            stats.energy_regen * dt
        };
        self.energy = (self.energy + delta).clamp(0.0, self.max_energy);
    }

    /// Activate the class ability. Rejected (no state change) when dead, on
    /// cooldown, or short on energy.
    pub fn try_activate(&mut self, abilities: &AbilityTable) -> Option<AbilityEffect> {
        let ability = self.class.ability();
        let cost = abilities.energy_cost(ability);
        if !self.alive || self.ability_cooldown > 0.0 || self.energy < cost {
            return None;
        }

        let effect = match ability {
            AbilityKind::Dash => AbilityEffect::Dash {
                impulse: abilities.dash.impulse,
            },
            AbilityKind::Shield => {
                if self.is_shielded() {
                    return None;
                }
                // raise the ceiling with the armor so the bounds hold
                let bonus = abilities.shield.armor_bonus.max(0.0);
                self.shield_bonus = bonus;
                self.max_armor += bonus;
                self.shield_armor = bonus;
                self.armor = (self.armor + bonus).min(self.max_armor);
                AbilityEffect::Shield {
                    duration: abilities.shield.duration,
                }
            }
            AbilityKind::Overcharge => {
                if self.overcharge_multiplier.is_some() {
                    return None;
                }
                self.overcharge_multiplier = Some(abilities.overcharge.damage_multiplier);
                AbilityEffect::Overcharge {
                    duration: abilities.overcharge.duration,
                }
            }
        };

        self.energy -= cost;
        self.ability_cooldown = abilities.cooldown(ability);
        Some(effect)
    }

    /// Revert a shield: drop whatever bonus armor is left and restore the
    /// class ceiling. Returns false when none was active.
    pub fn expire_shield(&mut self) -> bool {
        if !self.is_shielded() {
            return false;
        }
        self.max_armor -= self.shield_bonus;
        self.armor = (self.armor - self.shield_armor).clamp(0.0, self.max_armor);
        self.shield_bonus = 0.0;
        self.shield_armor = 0.0;
        true
    }

    pub fn expire_overcharge(&mut self) -> bool {
        self.overcharge_multiplier.take().is_some()
    }

    /// Back to class maxima for a new life
    pub fn respawn(&mut self, stats: &ClassStats) {
        let life = self.life + 1;
        *self = Self::new(self.class, stats);
        self.life = life;
    }
}

fn fraction(value: f32, max: f32) -> f32 {
    if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn medium() -> CombatantState {
        CombatantState::new(MechaClass::Medium, ClassTable::default().stats(MechaClass::Medium))
    }

    #[test]
    fn armor_absorbs_seventy_percent_capped_by_remaining_armor() {
        let mut state = medium();
        assert_eq!((state.health, state.armor), (100.0, 50.0));

        let outcome = state.take_damage(100.0, 0.7).unwrap();
        assert_eq!(outcome.armor_absorbed, 50.0);
        assert_eq!(outcome.health_loss, 50.0);
        assert_eq!((state.health, state.armor), (50.0, 0.0));
        assert!(state.is_alive());
    }

    #[test]
    fn armor_takes_full_share_when_plentiful() {
        let mut state = medium();
        let outcome = state.take_damage(20.0, 0.7).unwrap();
        assert!((outcome.armor_absorbed - 14.0).abs() < 1e-5);
        assert!((state.health - 94.0).abs() < 1e-5);
    }

    #[test]
    fn lethal_hit_kills_and_further_damage_is_ignored() {
        let mut state = medium();
        state.armor = 0.0;
        assert!(state.take_damage(150.0, 0.7).unwrap().killed);
        assert!(!state.is_alive());
        assert_eq!(state.health, 0.0);

        let before = state.clone();
        assert!(state.take_damage(50.0, 0.7).is_none());
        assert_eq!(state, before);
        assert!(!state.kill());
    }

    #[test]
    fn energy_regenerates_unless_sprinting() {
        let stats = ClassTable::default().medium;
        let mut state = medium();
        state.energy = 50.0;

        state.tick(&stats, 1.0, true);
        assert_eq!(state.energy, 30.0);
        state.tick(&stats, 1.0, false);
        assert_eq!(state.energy, 42.0);
        state.tick(&stats, 10.0, false);
        assert_eq!(state.energy, state.max_energy);
    }

    #[test]
    fn abilities_are_gated_by_energy() {
        let abilities = AbilityTable::default();
        let mut state = medium();
        state.energy = 39.0;
        assert!(state.try_activate(&abilities).is_none());
        assert_eq!(state.energy, 39.0);

        state.energy = 40.0;
        assert!(matches!(
            state.try_activate(&abilities),
            Some(AbilityEffect::Shield { .. })
        ));
        assert_eq!(state.energy, 0.0);
    }

    #[test]
    fn shield_raises_armor_then_reverts() {
        let abilities = AbilityTable::default();
        let mut state = medium();
        state.try_activate(&abilities).unwrap();
        assert_eq!((state.armor, state.max_armor), (100.0, 100.0));

        state.take_damage(20.0, 0.7);
        assert!(state.expire_shield());
        assert_eq!(state.max_armor, 50.0);
        assert_eq!(state.armor, 50.0);
        assert!(!state.expire_shield());
    }

    #[test]
    fn shield_on_stripped_armor_leaves_nothing_behind() {
        let abilities = AbilityTable::default();
        let mut state = medium();
        state.armor = 0.0;

        state.try_activate(&abilities).unwrap();
        assert_eq!((state.armor, state.max_armor), (50.0, 100.0));
        assert!(state.expire_shield());
        assert_eq!((state.armor, state.max_armor), (0.0, 50.0));

        // a hit during the shield only spends bonus armor
        let mut state = medium();
        state.armor = 10.0;
        state.try_activate(&abilities).unwrap();
        let outcome = state.take_damage(20.0, 0.7).unwrap();
        assert!((outcome.armor_absorbed - 14.0).abs() < 1e-5);
        state.expire_shield();
        assert!((state.armor - 10.0).abs() < 1e-5);
        assert_eq!(state.max_armor, 50.0);
    }

    #[test]
    fn overcharge_multiplies_damage_until_expired() {
        let abilities = AbilityTable::default();
        let stats = ClassTable::default().heavy;
        let mut state = CombatantState::new(MechaClass::Heavy, &stats);
        assert_eq!(state.damage_multiplier(), 1.0);

        state.try_activate(&abilities).unwrap();
        assert_eq!(state.damage_multiplier(), 1.5);
        assert!(state.expire_overcharge());
        assert_eq!(state.damage_multiplier(), 1.0);
    }

    #[test]
    fn cooldown_blocks_reactivation() {
        let abilities = AbilityTable::default();
        let stats = ClassTable::default().light;
        let mut state = CombatantState::new(MechaClass::Light, &stats);

        assert!(state.try_activate(&abilities).is_some());
        assert!(state.try_activate(&abilities).is_none());
        state.tick(&stats, abilities.dash.cooldown, false);
        assert!(state.try_activate(&abilities).is_some());
    }

    #[test]
    fn respawn_restores_maxima_and_bumps_life() {
        let stats = ClassTable::default().medium;
        let abilities = AbilityTable::default();
        let mut state = medium();
        state.try_activate(&abilities);
        state.kill();

        state.respawn(&stats);
        assert!(state.is_alive());
        assert_eq!(state.life(), 1);
        assert_eq!((state.health, state.armor, state.energy), (100.0, 50.0, 100.0));
        assert_eq!(state.max_armor, 50.0);
        assert!(!state.is_shielded());
    }

    proptest! {
        #[test]
        fn resources_stay_in_bounds(
            hits in proptest::collection::vec((-50.0f32..400.0, any::<bool>(), 0.0f32..2.0), 0..40)
        ) {
            let stats = ClassTable::default().medium;
            let abilities = AbilityTable::default();
            let mut state = medium();

            for (amount, activate, dt) in hits {
                if activate {
                    state.try_activate(&abilities);
                }
                state.take_damage(amount, 0.7);
                state.tick(&stats, dt, amount > 200.0);
                if amount < 0.0 {
                    state.expire_shield();
                }

                prop_assert!(state.health >= 0.0 && state.health <= state.max_health);
                prop_assert!(state.armor >= 0.0 && state.armor <= state.max_armor);
                prop_assert!(state.energy >= 0.0 && state.energy <= state.max_energy);
                prop_assert!(state.is_alive() == (state.health > 0.0));
            }
        }
    }
}
