//! Six-state agent behavior machine.
//!
//! Decisions (perception, target memory, state transitions) run on the
//! difficulty's decision interval; steering and the fire roll run every tick
//! and produce the same [`Intent`] a human input layer would.

use std::fmt;

use glam::Vec2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::difficulty::{DifficultyProfile, DifficultyTier};
use super::perception::{perceive, CombatantView, Perceived, WorldView};
use super::AiTuning;
use crate::game::combatant::AbilityKind;
use crate::game::world::WorldQuery;
use crate::protocol::{CombatantId, Intent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorState {
    Patrol,
    Chase,
    Attack,
    Flee,
    Hide,
    Dead,
}

impl BehaviorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patrol => "patrol",
            Self::Chase => "chase",
            Self::Attack => "attack",
            Self::Flee => "flee",
            Self::Hide => "hide",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub id: CombatantId,
    pub from: BehaviorState,
    pub to: BehaviorState,
}

/// Decision state of one agent-controlled combatant
#[derive(Debug, Clone)]
pub struct AiAgent {
    id: CombatantId,
    difficulty: DifficultyTier,
    state: BehaviorState,
    target: Option<CombatantId>,
    last_known: Option<Vec2>,
    target_visible: bool,
    /// Decisions since the target was last seen
    lost_decisions: u32,
    /// Decisions made since entering the current state
    state_decisions: u32,
    decision_timer: f32,
    perceived: Vec<Perceived>,
    waypoint: Option<Vec2>,
    resting: bool,
    /// -1, 0 or 1
    strafe: f32,
}

impl AiAgent {
    pub fn new(id: CombatantId, difficulty: DifficultyTier) -> Self {
        Self {
            id,
            difficulty,
            state: BehaviorState::Patrol,
            target: None,
            last_known: None,
            target_visible: false,
            lost_decisions: 0,
            state_decisions: 0,
            decision_timer: 0.0,
            perceived: Vec::new(),
            waypoint: None,
            resting: false,
            strafe: 0.0,
        }
    }

    pub fn id(&self) -> CombatantId {
        self.id
    }

    pub fn difficulty(&self) -> DifficultyTier {
        self.difficulty
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    pub fn target(&self) -> Option<CombatantId> {
        self.target
    }

    pub fn last_known_position(&self) -> Option<Vec2> {
        self.last_known
    }

    pub fn lost_decisions(&self) -> u32 {
        self.lost_decisions
    }

    /// Halted in cover while hiding
    pub fn is_resting(&self) -> bool {
        self.resting && self.state == BehaviorState::Hide
    }

    /// One tick: decide when the interval has elapsed, then steer.
    pub fn update(
        &mut self,
        view: &WorldView,
        world: &dyn WorldQuery,
        profile: &DifficultyProfile,
        tuning: &AiTuning,
        rng: &mut ChaCha8Rng,
        dt: f32,
    ) -> (Intent, Option<StateTransition>) {
        if self.state == BehaviorState::Dead {
            return (Intent::default(), None);
        }
        let Some(me) = view.get(self.id).copied() else {
            return (Intent::default(), None);
        };
        if !me.alive {
            return (Intent::default(), self.kill());
        }

        self.decision_timer -= dt;
        let transition = if self.decision_timer <= 0.0 {
            self.decision_timer = profile.decision_interval;
            self.decide(&me, view, world, profile, tuning, rng)
        } else {
            None
        };

        (self.act(&me, view, world, profile, tuning, rng), transition)
    }

    /// Perceive, update target memory and evaluate the transition table.
    pub fn decide(
        &mut self,
        me: &CombatantView,
        view: &WorldView,
        world: &dyn WorldQuery,
        profile: &DifficultyProfile,
        tuning: &AiTuning,
        rng: &mut ChaCha8Rng,
    ) -> Option<StateTransition> {
        if self.state == BehaviorState::Dead {
            return None;
        }

        self.perceived = perceive(me, profile.sight_range, view, world);
        if self.target.is_some_and(|t| !view.is_alive(t)) {
            self.forget();
        }
        match self.perceived.first() {
            Some(closest) => {
                self.target = Some(closest.id);
                self.last_known = Some(closest.position);
                self.target_visible = true;
                self.lost_decisions = 0;
            }
            None => {
                self.target_visible = false;
                if self.target.is_some() {
                    self.lost_decisions += 1;
                    if self.lost_decisions >= tuning.memory_decisions {
                        self.forget();
                    }
                }
            }
        }
        self.state_decisions += 1;

        let health = me.health_fraction;
        let target_distance = if self.target_visible {
            self.perceived.first().map(|p| p.distance)
        } else {
            None
        };

        let next = match self.state {
            BehaviorState::Patrol => {
                if self.target.is_some() {
                    Some(BehaviorState::Chase)
                } else if health < tuning.hide_health && rng.gen::<f32>() < tuning.hide_chance {
                    Some(BehaviorState::Hide)
                } else {
                    None
                }
            }
            BehaviorState::Chase => {
                if self.target.is_none() {
                    Some(BehaviorState::Patrol)
                } else if target_distance.is_some_and(|d| d <= profile.attack_range) {
                    Some(BehaviorState::Attack)
                } else if health < tuning.flee_health {
                    Some(BehaviorState::Flee)
                } else {
                    None
                }
            }
            BehaviorState::Attack => match target_distance {
                None => Some(BehaviorState::Chase),
                Some(d) if d > profile.attack_range * tuning.attack_leash => {
                    Some(BehaviorState::Chase)
                }
                Some(_) if health < tuning.attack_flee_health && self.perceived.len() > 1 => {
                    Some(BehaviorState::Flee)
                }
                Some(_) => None,
            },
            BehaviorState::Flee => {
                (health > tuning.flee_recover_health || self.perceived.is_empty())
                    .then_some(BehaviorState::Patrol)
            }
            // counted after the increment: a full `hide_max_decisions`
            // decisions are spent in cover before giving up on the next one
            BehaviorState::Hide => (health > tuning.hide_recover_health
                || self.state_decisions > tuning.hide_max_decisions)
                .then_some(BehaviorState::Patrol),
            BehaviorState::Dead => None,
        };

        let transition = next.and_then(|to| self.transition(to));
        if self.state == BehaviorState::Attack {
            self.strafe = if rng.gen::<f32>() < tuning.strafe_chance {
                if rng.gen_bool(0.5) {
                    1.0
                } else {
                    -1.0
                }
            } else {
                0.0
            };
        }
        transition
    }

    /// Steering for the current state
    pub fn act(
        &mut self,
        me: &CombatantView,
        view: &WorldView,
        world: &dyn WorldQuery,
        profile: &DifficultyProfile,
        tuning: &AiTuning,
        rng: &mut ChaCha8Rng,
    ) -> Intent {
        let mut intent = Intent::default();
        let speed = profile.move_speed.clamp(0.0, 1.0);
        let ability = me.class.ability();

        match self.state {
            BehaviorState::Dead => return intent,
            BehaviorState::Patrol => {
                let arrived = self
                    .waypoint
                    .map_or(true, |w| w.distance(me.position) <= tuning.arrive_distance);
                if arrived {
                    self.waypoint =
                        Some(world.random_reachable_point(me.position, tuning.patrol_radius, rng));
                }
                if let Some(waypoint) = self.waypoint {
                    steer(&mut intent, me.position, waypoint, speed, tuning.arrive_distance);
                }
            }
            BehaviorState::Chase => {
                if let Some(goal) = self.target_position(view).or(self.last_known) {
                    steer(&mut intent, me.position, goal, speed, tuning.arrive_distance);
                }
            }
            BehaviorState::Attack => {
                if let Some(target) = self.target_position(view) {
                    let to_target = (target - me.position).normalize_or_zero();
                    intent.look_vector = to_target;
                    intent.move_vector = to_target.perp() * self.strafe * speed;
                    intent.aim_held = true;
                    if rng.gen::<f32>() < tuning.fire_chance {
                        intent.fire_held = true;
                        intent.fire_edge = true;
                    }
                    intent.ability_edge = ability == AbilityKind::Overcharge;
                }
            }
            BehaviorState::Flee => {
                let threat = self.perceived.iter().fold(Vec2::ZERO, |acc, p| {
                    acc + (me.position - p.position).normalize_or_zero()
                });
                let away = threat.try_normalize().unwrap_or(-me.facing);
                intent.move_vector = away * speed;
                intent.look_vector = away;
                intent.sprint_held = true;
                intent.ability_edge = ability != AbilityKind::Overcharge;
            }
            BehaviorState::Hide => {
                let cover = *self
                    .waypoint
                    .get_or_insert_with(|| world.nearest_cover(me.position).unwrap_or(me.position));
                self.resting = cover.distance(me.position) <= tuning.arrive_distance;
                if !self.resting {
                    steer(&mut intent, me.position, cover, speed, tuning.arrive_distance);
                }
            }
        }

        if self.state != BehaviorState::Attack
            && me.current_ammo == 0
            && me.reserve_ammo > 0
            && !me.reloading
        {
            intent.reload_edge = true;
        }
        intent
    }

    /// Retaliate against `attacker`. Ignored while dead.
    pub fn alert(&mut self, attacker: CombatantId, attacker_position: Vec2) -> Option<StateTransition> {
        if self.state == BehaviorState::Dead || attacker == self.id {
            return None;
        }
        self.target = Some(attacker);
        self.last_known = Some(attacker_position);
        self.target_visible = false;
        self.lost_decisions = 0;
        self.transition(BehaviorState::Chase)
    }

    pub fn kill(&mut self) -> Option<StateTransition> {
        self.forget();
        self.perceived.clear();
        self.transition(BehaviorState::Dead)
    }

    /// Drop `id` as a target (it died)
    pub fn forget_target(&mut self, id: CombatantId) {
        if self.target == Some(id) {
            self.forget();
        }
        self.perceived.retain(|p| p.id != id);
    }

    fn forget(&mut self) {
        self.target = None;
        self.last_known = None;
        self.target_visible = false;
        self.lost_decisions = 0;
    }

    fn target_position(&self, view: &WorldView) -> Option<Vec2> {
        if !self.target_visible {
            return None;
        }
        self.target
            .and_then(|t| view.get(t))
            .filter(|c| c.alive)
            .map(|c| c.position)
    }

    fn transition(&mut self, to: BehaviorState) -> Option<StateTransition> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        self.state_decisions = 0;
        self.waypoint = None;
        self.resting = false;
        self.strafe = 0.0;
        Some(StateTransition {
            id: self.id,
            from,
            to,
        })
    }
}

fn steer(intent: &mut Intent, from: Vec2, to: Vec2, speed: f32, arrive_distance: f32) {
    let offset = to - from;
    let direction = offset.normalize_or_zero();
    if direction != Vec2::ZERO {
        intent.look_vector = direction;
    }
    if offset.length() > arrive_distance {
        intent.move_vector = direction * speed;
    }
}
