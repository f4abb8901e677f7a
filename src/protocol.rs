//! Records exchanged with the core's external collaborators.
//!
//! Input layers (human input, network, agents) hand the core one [`Intent`]
//! per combatant per tick. The core hands back [`CoreEvent`]s and periodic
//! [`MatchSnapshot`]s. Everything here is `serde`-serializable; the wire
//! encoding is left to whoever transports it.

use std::fmt;
use std::str::FromStr;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::game::ai::BehaviorState;
use crate::game::combatant::AbilityKind;
use crate::game::weapon::WeaponKind;

/// Stable combatant identifier (spawn index) for the lifetime of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatantId(pub u32);

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Game modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every combatant for themselves, first to the kill limit
    FreeForAll,
    /// Red against Blue, team kill score
    TeamDeathmatch,
    /// No respawns, last one standing
    Survival,
    /// Practice, ends only by host command
    Training,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeForAll => "free_for_all",
            Self::TeamDeathmatch => "team_deathmatch",
            Self::Survival => "survival",
            Self::Training => "training",
        }
    }

    pub fn has_teams(&self) -> bool {
        matches!(self, Self::TeamDeathmatch)
    }

    pub fn respawns(&self) -> bool {
        !matches!(self, Self::Survival)
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free_for_all" | "ffa" => Ok(Self::FreeForAll),
            "team_deathmatch" | "tdm" => Ok(Self::TeamDeathmatch),
            "survival" => Ok(Self::Survival),
            "training" => Ok(Self::Training),
            other => Err(other.to_string()),
        }
    }
}

/// Teams (team deathmatch only; other modes use `None`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// Team assignment by spawn index: even → Red, odd → Blue
    pub fn for_spawn_index(index: usize) -> Self {
        if index % 2 == 0 {
            Self::Red
        } else {
            Self::Blue
        }
    }
}

/// Mecha loadout archetypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechaClass {
    /// Fast, fragile, dashes
    Light,
    /// Balanced, raises a shield
    Medium,
    /// Slow, tanky, overcharges its weapons
    Heavy,
}

impl MechaClass {
    pub const ALL: [MechaClass; 3] = [Self::Light, Self::Medium, Self::Heavy];
}

impl Default for MechaClass {
    fn default() -> Self {
        Self::Medium
    }
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Lobby,
    InProgress,
    Ended,
}

/// Intent record submitted once per combatant per tick, by a human input
/// layer or by an agent. Vectors are sanitized before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intent {
    /// Desired movement direction, magnitude ≤ 1
    pub move_vector: Vec2,
    /// Desired facing direction
    pub look_vector: Vec2,
    /// Trigger held this tick
    pub fire_held: bool,
    /// Trigger pressed this tick
    pub fire_edge: bool,
    /// Aim-down-sights held
    pub aim_held: bool,
    pub reload_edge: bool,
    pub ability_edge: bool,
    pub weapon_switch_edge: bool,
    pub sprint_held: bool,
}

impl Intent {
    /// Clamp vectors to unit length and replace non-finite components.
    pub fn sanitized(mut self) -> Self {
        self.move_vector = sanitize_vector(self.move_vector).clamp_length_max(1.0);
        self.look_vector = sanitize_vector(self.look_vector).normalize_or_zero();
        self
    }

    /// The same intent with all one-shot edges cleared; held inputs persist
    /// between ticks until the input layer says otherwise.
    pub fn without_edges(mut self) -> Self {
        self.fire_edge = false;
        self.reload_edge = false;
        self.ability_edge = false;
        self.weapon_switch_edge = false;
        self
    }

    /// Fold a later intent for the same tick into this one: held inputs and
    /// vectors take the latest value, edges accumulate.
    pub fn merge(self, later: Intent) -> Intent {
        Intent {
            fire_edge: self.fire_edge || later.fire_edge,
            reload_edge: self.reload_edge || later.reload_edge,
            ability_edge: self.ability_edge || later.ability_edge,
            weapon_switch_edge: self.weapon_switch_edge || later.weapon_switch_edge,
            ..later
        }
    }
}

fn sanitize_vector(v: Vec2) -> Vec2 {
    if v.is_finite() {
        v
    } else {
        Vec2::ZERO
    }
}

/// Winner of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Winner {
    Combatant(CombatantId),
    Team(Team),
}

/// Persistence hook: one record per combatant at match end. The core computes
/// the rewards; persisting them is the progression system's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultReport {
    pub combatant_id: CombatantId,
    pub name: String,
    pub team: Option<Team>,
    pub kills: u32,
    pub deaths: u32,
    pub score: u32,
    pub won: bool,
    pub match_duration_secs: f32,
    pub experience: u32,
    pub credits: u32,
}

/// Network hook: kill feed line forwarded to the networking collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillFeedEntry {
    pub killer_name: String,
    pub victim_name: String,
    pub weapon_name: String,
}

/// Events emitted by the core, in the order they happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    MatchStarted {
        mode: MatchMode,
        map: String,
    },
    CombatantSpawned {
        id: CombatantId,
        team: Option<Team>,
        class: MechaClass,
        position: Vec2,
    },
    CombatantDied {
        victim_id: CombatantId,
        killer_id: Option<CombatantId>,
    },
    CombatantRespawned {
        id: CombatantId,
        position: Vec2,
    },
    ScoreboardUpdated {
        scoreboard: Scoreboard,
    },
    MatchEnded {
        winner: Option<Winner>,
        duration_secs: f32,
        results: Vec<MatchResultReport>,
    },
    ReturnedToLobby,
    ShotFired {
        shooter_id: CombatantId,
        weapon: WeaponKind,
        origin: Vec2,
        direction: Vec2,
    },
    DamageDealt {
        attacker_id: Option<CombatantId>,
        target_id: CombatantId,
        amount: f32,
        armor_absorbed: f32,
        headshot: bool,
    },
    ReloadStarted {
        id: CombatantId,
        weapon: WeaponKind,
    },
    ReloadCompleted {
        id: CombatantId,
        weapon: WeaponKind,
        current_ammo: u32,
        reserve_ammo: u32,
    },
    WeaponEquipped {
        id: CombatantId,
        weapon: WeaponKind,
    },
    AbilityActivated {
        id: CombatantId,
        ability: AbilityKind,
    },
    AbilityExpired {
        id: CombatantId,
        ability: AbilityKind,
    },
    AgentStateChanged {
        id: CombatantId,
        from: BehaviorState,
        to: BehaviorState,
    },
    KillFeed(KillFeedEntry),
    ChatRelayed {
        sender_id: CombatantId,
        sender_name: String,
        text: String,
    },
}

/// Scoreboard line for one combatant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: CombatantId,
    pub name: String,
    pub team: Option<Team>,
    pub kills: u32,
    pub deaths: u32,
    pub score: u32,
}

/// Aggregated team kills (team deathmatch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    pub team: Team,
    pub kills: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub combatants: Vec<ScoreEntry>,
    pub teams: Vec<TeamScore>,
}

/// Combatant state for presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantSnapshot {
    pub id: CombatantId,
    pub name: String,
    pub team: Option<Team>,
    pub class: MechaClass,
    pub alive: bool,
    pub position: Vec2,
    pub facing: Vec2,
    /// Health fraction (0-1)
    pub health: f32,
    /// Armor fraction (0-1)
    pub armor: f32,
    /// Energy fraction (0-1)
    pub energy: f32,
    pub weapon: Option<WeaponKind>,
    pub current_ammo: u32,
    pub reserve_ammo: u32,
    /// Reload progress (0-1) while reloading
    pub reload_progress: Option<f32>,
    pub agent_state: Option<BehaviorState>,
}

/// Full presentation snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub tick: u64,
    pub status: MatchStatus,
    pub mode: Option<MatchMode>,
    pub map: Option<String>,
    /// Seconds left on the match timer (modes without a time limit: `None`)
    pub remaining_secs: Option<f32>,
    pub combatants: Vec<CombatantSnapshot>,
    pub scoreboard: Scoreboard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_and_zeroes() {
        let intent = Intent {
            move_vector: Vec2::new(3.0, 4.0),
            look_vector: Vec2::new(f32::NAN, 1.0),
            ..Default::default()
        }
        .sanitized();

        assert!((intent.move_vector.length() - 1.0).abs() < 1e-5);
        assert_eq!(intent.look_vector, Vec2::ZERO);
    }

    #[test]
    fn merge_keeps_edges_and_latest_held_state() {
        let first = Intent {
            fire_edge: true,
            fire_held: true,
            ..Default::default()
        };
        let later = Intent {
            move_vector: Vec2::X,
            ..Default::default()
        };

        let merged = first.merge(later);
        assert!(merged.fire_edge);
        assert!(!merged.fire_held);
        assert_eq!(merged.move_vector, Vec2::X);
        assert!(!merged.without_edges().fire_edge);
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("tdm".parse::<MatchMode>(), Ok(MatchMode::TeamDeathmatch));
        assert_eq!("Survival".parse::<MatchMode>(), Ok(MatchMode::Survival));
        assert!("capture_the_flag".parse::<MatchMode>().is_err());
    }

    #[test]
    fn events_are_tagged_snake_case() {
        let json = serde_json::to_value(CoreEvent::CombatantDied {
            victim_id: CombatantId(3),
            killer_id: Some(CombatantId(7)),
        })
        .unwrap();

        assert_eq!(json["event"], "combatant_died");
        assert_eq!(json["victim_id"], 3);
        assert_eq!(json["killer_id"], 7);
    }

    #[test]
    fn team_alternates_by_index() {
        assert_eq!(Team::for_spawn_index(0), Team::Red);
        assert_eq!(Team::for_spawn_index(1), Team::Blue);
        assert_eq!(Team::for_spawn_index(4), Team::Red);
    }
}
