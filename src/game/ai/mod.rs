//! Agent-controlled combatants.
//!
//! The [`AiDirector`] owns one [`AiAgent`] per agent-controlled combatant and
//! turns a tick-start [`WorldView`] into intents, in combatant id order.

pub mod behavior;
pub mod difficulty;
pub mod perception;

pub use behavior::{AiAgent, BehaviorState, StateTransition};
pub use difficulty::{DifficultyProfile, DifficultyTable, DifficultyTier};
pub use perception::{perceive, CombatantView, Perceived, WorldView};

use std::collections::BTreeMap;

use glam::Vec2;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::game::world::WorldQuery;
use crate::protocol::{CombatantId, Intent, Team};

/// Behavior constants shared by every agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiTuning {
    /// Tier given to lobby-filling agents
    pub default_difficulty: DifficultyTier,
    /// Decisions a lost target is remembered for
    pub memory_decisions: u32,
    /// Decisions after which Hide gives up
    pub hide_max_decisions: u32,
    pub patrol_radius: f32,
    /// Aggro-broadcast reach around the victim
    pub alert_radius: f32,
    /// Chance that a wounded patroller hides
    pub hide_chance: f32,
    /// Per-tick chance of pulling the trigger while attacking
    pub fire_chance: f32,
    /// Per-decision chance of strafing while attacking
    pub strafe_chance: f32,
    pub arrive_distance: f32,
    /// Health per second regained while resting in cover
    pub hide_regen: f32,
    pub hide_health: f32,
    pub flee_health: f32,
    pub attack_flee_health: f32,
    pub flee_recover_health: f32,
    pub hide_recover_health: f32,
    /// Attack holds until the target is beyond attack range × this
    pub attack_leash: f32,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            default_difficulty: DifficultyTier::Normal,
            memory_decisions: 5,
            hide_max_decisions: 10,
            patrol_radius: 20.0,
            alert_radius: 25.0,
            hide_chance: 0.5,
            fire_chance: 0.35,
            strafe_chance: 0.3,
            arrive_distance: 1.5,
            hide_regen: 3.0,
            hide_health: 0.3,
            flee_health: 0.2,
            attack_flee_health: 0.3,
            flee_recover_health: 0.5,
            hide_recover_health: 0.7,
            attack_leash: 1.2,
        }
    }
}

/// Who hit whom, for retaliation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageAlert {
    pub victim: CombatantId,
    pub victim_position: Vec2,
    pub attacker: CombatantId,
    pub attacker_position: Vec2,
    pub attacker_team: Option<Team>,
}

#[derive(Debug, Clone, Default)]
pub struct AiDirector {
    agents: BTreeMap<CombatantId, AiAgent>,
}

impl AiDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, agent: AiAgent) {
        self.agents.insert(agent.id(), agent);
    }

    pub fn get(&self, id: CombatantId) -> Option<&AiAgent> {
        self.agents.get(&id)
    }

    pub fn contains(&self, id: CombatantId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn clear(&mut self) {
        self.agents.clear();
    }

    pub fn is_resting(&self, id: CombatantId) -> bool {
        self.agents.get(&id).is_some_and(AiAgent::is_resting)
    }

    /// Produce this tick's intents for every living agent
    pub fn think(
        &mut self,
        view: &WorldView,
        world: &dyn WorldQuery,
        difficulties: &DifficultyTable,
        tuning: &AiTuning,
        rng: &mut ChaCha8Rng,
        dt: f32,
    ) -> (BTreeMap<CombatantId, Intent>, Vec<StateTransition>) {
        let mut intents = BTreeMap::new();
        let mut transitions = Vec::new();

        for (id, agent) in self.agents.iter_mut() {
            let profile = difficulties.profile(agent.difficulty());
            let (intent, transition) = agent.update(view, world, profile, tuning, rng, dt);
            transitions.extend(transition);
            if agent.state() != BehaviorState::Dead {
                intents.insert(*id, intent);
            }
        }

        (intents, transitions)
    }

    /// The victim retaliates; other agents near the victim that are not on
    /// the attacker's side join in.
    pub fn on_damage_taken(
        &mut self,
        alert: &DamageAlert,
        view: &WorldView,
        tuning: &AiTuning,
    ) -> Vec<StateTransition> {
        if alert.attacker == alert.victim {
            return Vec::new();
        }

        let mut transitions = Vec::new();
        for (id, agent) in self.agents.iter_mut() {
            let responds = if *id == alert.victim {
                true
            } else if *id == alert.attacker {
                false
            } else {
                view.get(*id).is_some_and(|me| {
                    me.alive
                        && (alert.attacker_team.is_none() || me.team != alert.attacker_team)
                        && me.position.distance(alert.victim_position) <= tuning.alert_radius
                })
            };
            if responds {
                transitions.extend(agent.alert(alert.attacker, alert.attacker_position));
            }
        }
        transitions
    }

    /// The agent of `id` (if any) goes Dead and nobody keeps targeting it
    pub fn on_death(&mut self, id: CombatantId) -> Option<StateTransition> {
        for agent in self.agents.values_mut() {
            agent.forget_target(id);
        }
        self.agents.get_mut(&id).and_then(AiAgent::kill)
    }

    /// Fresh life in Patrol
    pub fn on_respawn(&mut self, id: CombatantId) -> Option<StateTransition> {
        let agent = self.agents.get_mut(&id)?;
        let from = agent.state();
        *agent = AiAgent::new(id, agent.difficulty());
        (from != BehaviorState::Patrol).then_some(StateTransition {
            id,
            from,
            to: BehaviorState::Patrol,
        })
    }
}
