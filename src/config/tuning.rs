//! Every gameplay number in one serde tree

use serde::{Deserialize, Serialize};

use crate::game::ai::{AiTuning, DifficultyTable};
use crate::game::combat::CombatTuning;
use crate::game::combatant::{AbilityTable, ClassTable};
use crate::game::r#match::{MatchTiming, ModeTable, RewardTable};
use crate::game::weapon::{LoadoutTable, WeaponCatalog, WeaponKind};
use crate::protocol::{MatchMode, MechaClass};

use super::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub modes: ModeTable,
    pub classes: ClassTable,
    pub abilities: AbilityTable,
    pub weapons: WeaponCatalog,
    pub loadouts: LoadoutTable,
    pub combat: CombatTuning,
    pub difficulties: DifficultyTable,
    pub ai: AiTuning,
    pub rewards: RewardTable,
    pub timing: MatchTiming,
    /// Spawn points closer than this to a living combatant are avoided
    pub spawn_safety_radius: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            modes: ModeTable::default(),
            classes: ClassTable::default(),
            abilities: AbilityTable::default(),
            weapons: WeaponCatalog::default(),
            loadouts: LoadoutTable::default(),
            combat: CombatTuning::default(),
            difficulties: DifficultyTable::default(),
            ai: AiTuning::default(),
            rewards: RewardTable::default(),
            timing: MatchTiming::default(),
            spawn_safety_radius: 10.0,
        }
    }
}

impl Tuning {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Reject numbers the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidTuning(msg));

        for mode in [
            MatchMode::FreeForAll,
            MatchMode::TeamDeathmatch,
            MatchMode::Survival,
            MatchMode::Training,
        ] {
            if self
                .modes
                .rules(mode)
                .time_limit_secs
                .is_some_and(|t| !(t > 0.0))
            {
                return invalid(format!("{mode} time limit must be positive"));
            }
        }

        for class in MechaClass::ALL {
            let stats = self.classes.stats(class);
            if !(stats.max_health > 0.0) || !(stats.hitbox_radius > 0.0) {
                return invalid(format!("{class:?} needs positive health and hitbox"));
            }
            if self.loadouts.loadout(class).is_empty() {
                return invalid(format!("{class:?} has an empty loadout"));
            }
        }

        for kind in WeaponKind::ALL {
            let def = self.weapons.definition(kind);
            if def.magazine_size == 0 || !(def.fire_rate > 0.0) {
                return invalid(format!("{} needs a magazine and a fire rate", def.name));
            }
        }

        let t = &self.timing;
        if [t.respawn_delay, t.lobby_return_delay, t.spawn_stagger]
            .iter()
            .any(|d| !(*d >= 0.0))
        {
            return invalid("delays must be non-negative".to_string());
        }
        Ok(())
    }
}
