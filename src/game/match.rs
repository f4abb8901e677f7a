//! Match lifecycle and the authoritative step function.
//!
//! [`MatchCoordinator`] owns every combatant, the scoring ledger, the agents
//! and the scheduled-event queue. Input layers only hand it intents and
//! commands; everything else happens inside [`MatchCoordinator::step`], one
//! tick at a time, in combatant id order.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ai::{AiAgent, AiDirector, CombatantView, DamageAlert, DifficultyTier, StateTransition, WorldView};
use super::combat::{CombatSystem, HitTarget};
use super::combatant::{AbilityEffect, AbilityKind, CombatantState};
use super::movement::{Body, MovementSystem};
use super::schedule::{Schedule, ScheduledEvent};
use super::scoring::ScoringLedger;
use super::snapshot::SnapshotBuilder;
use super::spawn::SpawnSelector;
use super::weapon::{Trigger, WeaponCatalog, WeaponKind, WeaponState};
use super::world::{MapCatalog, WorldQuery};
use crate::config::Tuning;
use crate::protocol::{
    CombatantId, CoreEvent, Intent, KillFeedEntry, MatchMode, MatchResultReport, MatchSnapshot,
    MatchStatus, MechaClass, ScoreEntry, Scoreboard, Team, Winner,
};
use crate::util::time::TickClock;

/// Longest chat message relayed, in characters
const MAX_CHAT_CHARS: usize = 200;

/// Rules for one game mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRules {
    /// Combatants spawned at start; agents fill the seats humans leave empty
    pub player_count: usize,
    pub time_limit_secs: Option<f32>,
    pub kill_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeTable {
    pub free_for_all: ModeRules,
    pub team_deathmatch: ModeRules,
    pub survival: ModeRules,
    pub training: ModeRules,
}

impl ModeTable {
    pub fn rules(&self, mode: MatchMode) -> &ModeRules {
        match mode {
            MatchMode::FreeForAll => &self.free_for_all,
            MatchMode::TeamDeathmatch => &self.team_deathmatch,
            MatchMode::Survival => &self.survival,
            MatchMode::Training => &self.training,
        }
    }

    /// Lobby capacity: the largest configured player count
    pub fn max_player_count(&self) -> usize {
        [
            &self.free_for_all,
            &self.team_deathmatch,
            &self.survival,
            &self.training,
        ]
        .iter()
        .map(|r| r.player_count)
        .max()
        .unwrap_or(0)
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            free_for_all: ModeRules {
                player_count: 8,
                time_limit_secs: Some(600.0),
                kill_limit: Some(25),
            },
            team_deathmatch: ModeRules {
                player_count: 10,
                time_limit_secs: Some(600.0),
                kill_limit: Some(50),
            },
            survival: ModeRules {
                player_count: 15,
                time_limit_secs: None,
                kill_limit: None,
            },
            training: ModeRules {
                player_count: 1,
                time_limit_secs: None,
                kill_limit: None,
            },
        }
    }
}

/// End-of-match rewards and kill score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardTable {
    pub kill_score: u32,
    pub base_experience: u32,
    pub experience_per_kill: u32,
    /// Score is divided by this (rounding down) before it counts as experience
    pub score_divisor: u32,
    pub win_bonus_experience: u32,
    pub base_credits: u32,
    pub credits_per_kill: u32,
    pub win_bonus_credits: u32,
}

impl RewardTable {
    pub fn experience(&self, kills: u32, score: u32, won: bool) -> u32 {
        let bonus = if won { self.win_bonus_experience } else { 0 };
        self.base_experience + kills * self.experience_per_kill + score / self.score_divisor.max(1) + bonus
    }

    pub fn credits(&self, kills: u32, won: bool) -> u32 {
        let bonus = if won { self.win_bonus_credits } else { 0 };
        self.base_credits + kills * self.credits_per_kill + bonus
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            kill_score: 100,
            base_experience: 100,
            experience_per_kill: 25,
            score_divisor: 10,
            win_bonus_experience: 200,
            base_credits: 50,
            credits_per_kill: 10,
            win_bonus_credits: 100,
        }
    }
}

/// Lifecycle delays (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchTiming {
    pub respawn_delay: f32,
    /// From match end until the coordinator is back in Lobby
    pub lobby_return_delay: f32,
    /// Between two consecutive initial spawns
    pub spawn_stagger: f32,
}

impl Default for MatchTiming {
    fn default() -> Self {
        Self {
            respawn_delay: 3.0,
            lobby_return_delay: 5.0,
            spawn_stagger: 0.1,
        }
    }
}

/// Lobby and start errors. Simulation steps never fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("a match is already in progress")]
    AlreadyInProgress,

    #[error("not in lobby (status: {0:?})")]
    NotInLobby(MatchStatus),

    #[error("unknown map: {0}")]
    UnknownMap(String),

    #[error("lobby is full ({0} seats)")]
    LobbyFull(usize),

    #[error("map {0} has no spawn points")]
    NoSpawnPoints(String),
}

/// Who produces a combatant's intents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Human,
    Agent(DifficultyTier),
}

/// A human seat reserved before the match starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySeat {
    pub name: String,
    pub class: MechaClass,
}

/// One participant (authoritative)
#[derive(Debug, Clone)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub team: Option<Team>,
    pub class: MechaClass,
    pub controller: Controller,
    pub state: CombatantState,
    pub body: Body,
    pub weapons: WeaponState,
    sprinting: bool,
}

impl Combatant {
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn is_sprinting(&self) -> bool {
        self.sprinting
    }

    fn view(&self, catalog: &WeaponCatalog) -> CombatantView {
        let slot = self.weapons.active_slot();
        CombatantView {
            id: self.id,
            position: self.body.position,
            facing: self.body.facing,
            team: self.team,
            class: self.class,
            alive: self.is_alive(),
            health_fraction: self.state.health_fraction(),
            energy: self.state.energy,
            current_ammo: slot.map_or(0, |s| s.current_ammo),
            magazine_size: self
                .weapons
                .active_kind()
                .map_or(0, |k| catalog.definition(k).magazine_size),
            reserve_ammo: slot.map_or(0, |s| s.reserve_ammo),
            reloading: slot.is_some_and(|s| s.reloading),
        }
    }
}

#[derive(Debug, Clone)]
struct RosterEntry {
    name: String,
    class: MechaClass,
    controller: Controller,
}

/// The running (or just ended) match
struct ActiveMatch {
    mode: MatchMode,
    rules: ModeRules,
    map: String,
    world: Arc<dyn WorldQuery>,
    roster: Vec<RosterEntry>,
    /// Initial spawns still scheduled; win conditions wait for zero
    pending_spawns: usize,
    elapsed: f32,
    remaining: Option<f32>,
}

/// Owns one arena: lobby, running match and everything in it
pub struct MatchCoordinator {
    tuning: Tuning,
    clock: TickClock,
    rng: ChaCha8Rng,
    maps: MapCatalog,
    status: MatchStatus,
    tick: u64,
    lobby: Vec<LobbySeat>,
    active: Option<ActiveMatch>,
    combatants: BTreeMap<CombatantId, Combatant>,
    agents: AiDirector,
    ledger: ScoringLedger,
    schedule: Schedule,
    events: Vec<CoreEvent>,
}

impl MatchCoordinator {
    pub fn new(tuning: Tuning, clock: TickClock, seed: u64) -> Self {
        let ledger = ScoringLedger::new(tuning.rewards.kill_score, false);
        Self {
            tuning,
            clock,
            rng: ChaCha8Rng::seed_from_u64(seed),
            maps: MapCatalog::default(),
            status: MatchStatus::Lobby,
            tick: 0,
            lobby: Vec::new(),
            active: None,
            combatants: BTreeMap::new(),
            agents: AiDirector::new(),
            ledger,
            schedule: Schedule::new(),
            events: Vec::new(),
        }
    }

    /// Make a map available to `start_match` under `name`
    pub fn register_map(&mut self, name: impl Into<String>, world: Arc<dyn WorldQuery>) {
        self.maps.register(name, world);
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn clock(&self) -> TickClock {
        self.clock
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn mode(&self) -> Option<MatchMode> {
        self.active.as_ref().map(|a| a.mode)
    }

    pub fn map_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.map.as_str())
    }

    /// Seconds left on the match timer, for timed modes
    pub fn remaining_secs(&self) -> Option<f32> {
        self.active.as_ref().and_then(|a| a.remaining)
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.active.as_ref().map_or(0.0, |a| a.elapsed)
    }

    pub fn pending_spawns(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.pending_spawns)
    }

    pub fn lobby(&self) -> &[LobbySeat] {
        &self.lobby
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.get(&id)
    }

    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.values()
    }

    pub fn ledger(&self) -> &ScoringLedger {
        &self.ledger
    }

    pub fn agent(&self, id: CombatantId) -> Option<&AiAgent> {
        self.agents.get(id)
    }

    pub fn alive_count(&self) -> usize {
        self.combatants.values().filter(|c| c.is_alive()).count()
    }

    /// Events produced outside `step` since it last ran
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }

    /// Reserve a human seat. Seats take the first spawn indices.
    pub fn join_lobby(
        &mut self,
        name: impl Into<String>,
        class: MechaClass,
    ) -> Result<CombatantId, MatchError> {
        if self.status != MatchStatus::Lobby {
            return Err(MatchError::NotInLobby(self.status));
        }
        let capacity = self.tuning.modes.max_player_count();
        if self.lobby.len() >= capacity {
            return Err(MatchError::LobbyFull(capacity));
        }

        let id = CombatantId(self.lobby.len() as u32);
        let mut name = name.into();
        if name.trim().is_empty() {
            name = format!("Pilot {}", id.0 + 1);
        }
        info!(combatant = %id, name = %name, class = ?class, "Lobby seat reserved");
        self.lobby.push(LobbySeat { name, class });
        Ok(id)
    }

    /// Lobby → InProgress. Spawns are staggered through the schedule.
    pub fn start_match(&mut self, mode: MatchMode, map: &str) -> Result<(), MatchError> {
        match self.status {
            MatchStatus::Lobby => {}
            MatchStatus::InProgress => {
                warn!(mode = %mode, "Start rejected: a match is already in progress");
                return Err(MatchError::AlreadyInProgress);
            }
            MatchStatus::Ended => {
                warn!(mode = %mode, "Start rejected: previous match has not returned to lobby");
                return Err(MatchError::NotInLobby(self.status));
            }
        }

        let world = self
            .maps
            .get(map)
            .ok_or_else(|| MatchError::UnknownMap(map.to_string()))?;
        if world.spawn_points().is_empty() {
            return Err(MatchError::NoSpawnPoints(map.to_string()));
        }

        let rules = self.tuning.modes.rules(mode).clone();
        let player_count = rules.player_count.max(self.lobby.len());
        let difficulty = self.tuning.ai.default_difficulty;
        let roster: Vec<RosterEntry> = (0..player_count)
            .map(|index| match self.lobby.get(index) {
                Some(seat) => RosterEntry {
                    name: seat.name.clone(),
                    class: seat.class,
                    controller: Controller::Human,
                },
                None => RosterEntry {
                    name: format!("Bot {:02}", index + 1),
                    class: MechaClass::ALL[index % MechaClass::ALL.len()],
                    controller: Controller::Agent(difficulty),
                },
            })
            .collect();

        self.combatants.clear();
        self.agents.clear();
        self.schedule.clear();
        self.ledger = ScoringLedger::new(self.tuning.rewards.kill_score, mode.has_teams());

        for index in 0..player_count {
            let delay = self
                .clock
                .ticks_for(self.tuning.timing.spawn_stagger * index as f32);
            self.schedule
                .push(self.tick + 1 + delay, ScheduledEvent::Spawn { index });
        }

        self.active = Some(ActiveMatch {
            mode,
            remaining: rules.time_limit_secs,
            rules,
            map: map.to_string(),
            world,
            roster,
            pending_spawns: player_count,
            elapsed: 0.0,
        });
        self.status = MatchStatus::InProgress;

        info!(
            mode = %mode,
            map = %map,
            players = player_count,
            humans = self.lobby.len(),
            "Match started"
        );
        self.events.push(CoreEvent::MatchStarted {
            mode,
            map: map.to_string(),
        });
        Ok(())
    }

    /// Advance one tick with this tick's human intents. Returns every event
    /// produced since the previous step.
    pub fn step(&mut self, intents: &BTreeMap<CombatantId, Intent>) -> Vec<CoreEvent> {
        self.tick += 1;

        for event in self.schedule.pop_due(self.tick) {
            self.run_scheduled(event);
        }

        if self.status == MatchStatus::InProgress {
            self.simulate(intents);
        }

        self.drain_events()
    }

    /// Host abort: ends the running match without a winner
    pub fn abort_match(&mut self) {
        if self.status != MatchStatus::InProgress {
            warn!(status = ?self.status, "Abort ignored: no match in progress");
            return;
        }
        info!(tick = self.tick, "Match aborted by host");
        self.end_match(None);
    }

    /// InProgress → Ended. Computes rewards and schedules the return to
    /// lobby; pending respawns and ability expiries are dropped.
    pub fn end_match(&mut self, winner: Option<Winner>) {
        if self.status != MatchStatus::InProgress {
            debug!(status = ?self.status, "End requested while no match is running");
            return;
        }
        self.status = MatchStatus::Ended;

        let duration = self.elapsed_secs();
        let results = self.results(winner, duration);

        self.schedule.clear();
        let due = self.tick + self.clock.ticks_for(self.tuning.timing.lobby_return_delay);
        self.schedule.push(due, ScheduledEvent::ReturnToLobby);

        info!(winner = ?winner, duration_secs = duration, "Match ended");
        self.events.push(CoreEvent::MatchEnded {
            winner,
            duration_secs: duration,
            results,
        });
    }

    /// Kill `victim` outright (hazards, admin). No-op when already dead.
    pub fn on_combatant_death(&mut self, victim: CombatantId, killer: Option<CombatantId>) {
        if self.status != MatchStatus::InProgress {
            debug!(combatant = %victim, "Death ignored: no match in progress");
            return;
        }
        let Some(combatant) = self.combatants.get_mut(&victim) else {
            warn!(combatant = %victim, "Death reported for unknown combatant");
            return;
        };
        if !combatant.state.kill() {
            debug!(combatant = %victim, "Death reported for a dead combatant");
            return;
        }
        self.process_death(victim, killer, None);
    }

    /// Bring a dead combatant back at a safe spawn point with fresh stats
    /// and weapons.
    pub fn respawn(&mut self, id: CombatantId) {
        if self.status != MatchStatus::InProgress {
            return;
        }
        let Some(world) = self
            .active
            .as_ref()
            .filter(|a| a.mode.respawns())
            .map(|a| a.world.clone())
        else {
            return;
        };
        match self.combatants.get(&id) {
            None => {
                warn!(combatant = %id, "Respawn for unknown combatant");
                return;
            }
            Some(c) if c.is_alive() => {
                debug!(combatant = %id, "Respawn skipped: already alive");
                return;
            }
            Some(_) => {}
        }

        let position = self.pick_spawn(world.as_ref());
        let Some(c) = self.combatants.get_mut(&id) else {
            return;
        };
        c.state.respawn(self.tuning.classes.stats(c.class));
        c.weapons = WeaponState::new(
            self.tuning.loadouts.loadout(c.class),
            &self.tuning.weapons,
            self.tuning.combat.reserve_multiplier,
        );
        c.body = Body::new(position, world.bounds().center() - position);
        c.sprinting = false;

        let transition = self.agents.on_respawn(id);
        self.push_transitions(transition);

        info!(combatant = %id, x = position.x, y = position.y, "Combatant respawned");
        self.events.push(CoreEvent::CombatantRespawned { id, position });
    }

    /// Damage from outside the weapon system (hazards, out of bounds)
    pub fn apply_damage(&mut self, target: CombatantId, amount: f32, attacker: Option<CombatantId>) {
        if self.status != MatchStatus::InProgress {
            return;
        }
        let view = self.world_view();
        self.deal_damage(target, amount, attacker, false, None, &view);
    }

    pub fn reload(&mut self, id: CombatantId) {
        if self.accepts_command(id) {
            self.start_reload(id);
        }
    }

    /// Switch to loadout slot `slot`
    pub fn equip_weapon(&mut self, id: CombatantId, slot: usize) {
        if !self.accepts_command(id) {
            return;
        }
        let Some(c) = self.combatants.get_mut(&id) else {
            return;
        };
        if let Some(weapon) =
            c.weapons
                .equip(slot, &self.tuning.weapons, self.tuning.combat.reserve_multiplier)
        {
            self.events.push(CoreEvent::WeaponEquipped { id, weapon });
        }
    }

    pub fn activate_ability(&mut self, id: CombatantId) {
        if self.accepts_command(id) {
            self.try_ability(id, Vec2::ZERO);
        }
    }

    /// Pass a chat line through to the network layer
    pub fn relay_chat(&mut self, sender: CombatantId, text: &str) {
        let name = self
            .combatants
            .get(&sender)
            .map(|c| c.name.clone())
            .or_else(|| self.lobby.get(sender.0 as usize).map(|s| s.name.clone()));
        let Some(sender_name) = name else {
            warn!(combatant = %sender, "Chat from unknown combatant dropped");
            return;
        };
        let text: String = text.trim().chars().take(MAX_CHAT_CHARS).collect();
        if text.is_empty() {
            return;
        }
        self.events.push(CoreEvent::ChatRelayed {
            sender_id: sender,
            sender_name,
            text,
        });
    }

    /// Consistent copy of every combatant for this instant
    pub fn world_view(&self) -> WorldView {
        WorldView::new(self.combatants.values().map(|c| c.view(&self.tuning.weapons)))
    }

    pub fn scoreboard(&self) -> Scoreboard {
        Scoreboard {
            combatants: self
                .ledger
                .records()
                .map(|(id, r)| ScoreEntry {
                    id,
                    name: self.name_of(id),
                    team: r.team,
                    kills: r.kills,
                    deaths: r.deaths,
                    score: r.score,
                })
                .collect(),
            teams: self.ledger.team_scores(),
        }
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        SnapshotBuilder::capture(self)
    }

    fn name_of(&self, id: CombatantId) -> String {
        self.combatants
            .get(&id)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn accepts_command(&self, id: CombatantId) -> bool {
        if self.status != MatchStatus::InProgress {
            debug!(combatant = %id, "Command ignored: no match in progress");
            return false;
        }
        match self.combatants.get(&id) {
            Some(c) => c.is_alive(),
            None => {
                warn!(combatant = %id, "Command for unknown combatant ignored");
                false
            }
        }
    }

    fn run_scheduled(&mut self, event: ScheduledEvent) {
        match event {
            ScheduledEvent::Spawn { index } => self.spawn_combatant(index),
            ScheduledEvent::Respawn { id } => self.respawn(id),
            ScheduledEvent::ShieldExpired { id, life } => {
                self.expire_ability(id, life, AbilityKind::Shield)
            }
            ScheduledEvent::OverchargeExpired { id, life } => {
                self.expire_ability(id, life, AbilityKind::Overcharge)
            }
            ScheduledEvent::ReturnToLobby => self.return_to_lobby(),
        }
    }

    fn spawn_combatant(&mut self, index: usize) {
        if self.status != MatchStatus::InProgress {
            return;
        }
        let Some((mode, world, entry)) = self.active.as_ref().and_then(|a| {
            a.roster
                .get(index)
                .map(|entry| (a.mode, a.world.clone(), entry.clone()))
        }) else {
            return;
        };
        let id = CombatantId(index as u32);
        if self.combatants.contains_key(&id) {
            return;
        }

        let team = mode.has_teams().then(|| Team::for_spawn_index(index));
        let position = self.pick_spawn(world.as_ref());
        let combatant = Combatant {
            id,
            name: entry.name,
            team,
            class: entry.class,
            controller: entry.controller,
            state: CombatantState::new(entry.class, self.tuning.classes.stats(entry.class)),
            body: Body::new(position, world.bounds().center() - position),
            weapons: WeaponState::new(
                self.tuning.loadouts.loadout(entry.class),
                &self.tuning.weapons,
                self.tuning.combat.reserve_multiplier,
            ),
            sprinting: false,
        };

        debug!(combatant = %id, name = %combatant.name, team = ?team, "Combatant spawned");
        self.combatants.insert(id, combatant);
        self.ledger.register(id, team);
        if let Controller::Agent(difficulty) = entry.controller {
            self.agents.insert(AiAgent::new(id, difficulty));
        }
        if let Some(active) = self.active.as_mut() {
            active.pending_spawns = active.pending_spawns.saturating_sub(1);
        }

        self.events.push(CoreEvent::CombatantSpawned {
            id,
            team,
            class: entry.class,
            position,
        });
    }

    /// Safe spawn point against every living combatant, including the ones
    /// spawned earlier this tick
    fn pick_spawn(&mut self, world: &dyn WorldQuery) -> Vec2 {
        let occupied: Vec<Vec2> = self
            .combatants
            .values()
            .filter(|c| c.is_alive())
            .map(|c| c.body.position)
            .collect();
        SpawnSelector::select(
            world.spawn_points(),
            &occupied,
            self.tuning.spawn_safety_radius,
            &mut self.rng,
        )
        .unwrap_or_else(|| world.bounds().center())
    }

    fn simulate(&mut self, intents: &BTreeMap<CombatantId, Intent>) {
        let Some(world) = self.active.as_ref().map(|a| a.world.clone()) else {
            return;
        };
        let dt = self.clock.delta();
        let view = self.world_view();

        let (agent_intents, transitions) = self.agents.think(
            &view,
            world.as_ref(),
            &self.tuning.difficulties,
            &self.tuning.ai,
            &mut self.rng,
            dt,
        );
        self.push_transitions(transitions);

        for id in intents.keys().filter(|id| !self.combatants.contains_key(*id)) {
            warn!(combatant = %id, tick = self.tick, "Intent for unknown combatant ignored");
        }

        let ids: Vec<CombatantId> = self.combatants.keys().copied().collect();
        for id in ids {
            if self.status != MatchStatus::InProgress {
                return;
            }
            let intent = match self.combatants.get(&id).map(|c| c.controller) {
                Some(Controller::Human) => intents.get(&id).copied().unwrap_or_default(),
                Some(Controller::Agent(_)) => agent_intents.get(&id).copied().unwrap_or_default(),
                None => continue,
            };
            self.apply_intent(id, intent.sanitized(), &view, world.as_ref(), dt);
        }
        if self.status != MatchStatus::InProgress {
            return;
        }

        self.upkeep(dt);
        self.advance_timer(dt);
        self.evaluate_win();
    }

    fn apply_intent(
        &mut self,
        id: CombatantId,
        intent: Intent,
        view: &WorldView,
        world: &dyn WorldQuery,
        dt: f32,
    ) {
        let Some(c) = self.combatants.get_mut(&id).filter(|c| c.is_alive()) else {
            return;
        };
        c.body.look(intent.look_vector);
        if intent.weapon_switch_edge {
            if let Some(weapon) = c
                .weapons
                .cycle(&self.tuning.weapons, self.tuning.combat.reserve_multiplier)
            {
                self.events.push(CoreEvent::WeaponEquipped { id, weapon });
            }
        } else {
            c.weapons.set_aiming(intent.aim_held);
        }

        if intent.ability_edge {
            self.try_ability(id, intent.move_vector);
        }
        self.move_combatant(id, &intent, world, dt);
        if intent.reload_edge {
            self.start_reload(id);
        }
        self.fire(
            id,
            Trigger {
                held: intent.fire_held,
                pressed: intent.fire_edge,
            },
            view,
            world,
        );
    }

    fn try_ability(&mut self, id: CombatantId, move_vector: Vec2) {
        let Some(c) = self.combatants.get_mut(&id) else {
            return;
        };
        let Some(effect) = c.state.try_activate(&self.tuning.abilities) else {
            debug!(combatant = %id, "Ability rejected");
            return;
        };
        let ability = effect.kind();
        let life = c.state.life();

        match effect {
            AbilityEffect::Dash { impulse } => {
                let direction = if move_vector != Vec2::ZERO {
                    move_vector
                } else {
                    c.body.facing
                };
                c.body.add_impulse(direction, impulse);
            }
            AbilityEffect::Shield { duration } => {
                let due = self.tick + self.clock.ticks_for(duration);
                self.schedule
                    .push(due, ScheduledEvent::ShieldExpired { id, life });
            }
            AbilityEffect::Overcharge { duration } => {
                let due = self.tick + self.clock.ticks_for(duration);
                self.schedule
                    .push(due, ScheduledEvent::OverchargeExpired { id, life });
            }
        }
        self.events.push(CoreEvent::AbilityActivated { id, ability });
    }

    fn expire_ability(&mut self, id: CombatantId, life: u32, ability: AbilityKind) {
        let Some(c) = self.combatants.get_mut(&id) else {
            return;
        };
        if c.state.life() != life {
            return;
        }
        let expired = match ability {
            AbilityKind::Shield => c.state.expire_shield(),
            AbilityKind::Overcharge => c.state.expire_overcharge(),
            AbilityKind::Dash => false,
        };
        if expired {
            self.events.push(CoreEvent::AbilityExpired { id, ability });
        }
    }

    fn move_combatant(&mut self, id: CombatantId, intent: &Intent, world: &dyn WorldQuery, dt: f32) {
        let Some(c) = self.combatants.get_mut(&id) else {
            return;
        };
        let stats = self.tuning.classes.stats(c.class);
        c.sprinting = intent.sprint_held
            && intent.move_vector.length_squared() > 0.0
            && c.state.energy > 0.0;
        let speed = if c.sprinting {
            stats.move_speed * stats.sprint_multiplier
        } else {
            stats.move_speed
        };
        MovementSystem::integrate(
            &mut c.body,
            intent.move_vector,
            speed,
            stats.move_speed,
            stats.hitbox_radius,
            dt,
            world,
        );
    }

    fn start_reload(&mut self, id: CombatantId) {
        let Some(c) = self.combatants.get_mut(&id) else {
            return;
        };
        if let Some(weapon) = c.weapons.reload(&self.tuning.weapons) {
            self.events.push(CoreEvent::ReloadStarted { id, weapon });
        }
    }

    fn fire(&mut self, id: CombatantId, trigger: Trigger, view: &WorldView, world: &dyn WorldQuery) {
        let Some(c) = self.combatants.get_mut(&id).filter(|c| c.is_alive()) else {
            return;
        };
        let Some(shot) = c.weapons.try_fire(&self.tuning.weapons, trigger) else {
            return;
        };
        let def = self.tuning.weapons.definition(shot.weapon);
        let spread = CombatSystem::spread(
            def,
            c.body.movement,
            shot.recoil,
            c.weapons.is_aiming(),
            &self.tuning.combat,
        );
        let direction = CombatSystem::deviate(c.body.facing, spread, &mut self.rng);
        let origin = c.body.position;
        let multiplier = c.state.damage_multiplier();
        let shooter_team = c.team;
        let (base_damage, range) = (def.damage, def.range);

        self.events.push(CoreEvent::ShotFired {
            shooter_id: id,
            weapon: shot.weapon,
            origin,
            direction,
        });
        if shot.auto_reload {
            self.events.push(CoreEvent::ReloadStarted {
                id,
                weapon: shot.weapon,
            });
        }

        // no friendly fire: teammates neither take hits nor stop them
        let targets: Vec<HitTarget> = self
            .combatants
            .values()
            .filter(|o| o.id != id && o.is_alive())
            .filter(|o| shooter_team.is_none() || o.team != shooter_team)
            .map(|o| HitTarget {
                id: o.id,
                position: o.body.position,
                radius: self.tuning.classes.stats(o.class).hitbox_radius,
            })
            .collect();

        let Some(hit) = CombatSystem::trace(
            origin,
            direction,
            range,
            &targets,
            world,
            self.tuning.combat.headshot_fraction,
        ) else {
            return;
        };
        let amount =
            CombatSystem::shot_damage(base_damage, hit.headshot, multiplier, &self.tuning.combat);
        self.deal_damage(hit.target_id, amount, Some(id), hit.headshot, Some(shot.weapon), view);
    }

    fn deal_damage(
        &mut self,
        target: CombatantId,
        amount: f32,
        attacker: Option<CombatantId>,
        headshot: bool,
        weapon: Option<WeaponKind>,
        view: &WorldView,
    ) {
        let attacker_team = attacker
            .filter(|a| *a != target)
            .and_then(|a| self.combatants.get(&a))
            .and_then(|a| a.team);
        let Some(victim) = self.combatants.get_mut(&target) else {
            warn!(combatant = %target, "Damage for unknown combatant ignored");
            return;
        };
        if attacker_team.is_some() && attacker_team == victim.team {
            debug!(combatant = %target, attacker = ?attacker.map(|a| a.0), "Friendly damage ignored");
            return;
        }
        let Some(outcome) = victim
            .state
            .take_damage(amount, self.tuning.combat.armor_absorb_ratio)
        else {
            return;
        };
        let victim_position = victim.body.position;

        self.events.push(CoreEvent::DamageDealt {
            attacker_id: attacker,
            target_id: target,
            amount: outcome.armor_absorbed + outcome.health_loss,
            armor_absorbed: outcome.armor_absorbed,
            headshot,
        });

        if outcome.killed {
            self.process_death(target, attacker, weapon);
            return;
        }

        let alert = attacker
            .filter(|a| *a != target)
            .and_then(|a| self.combatants.get(&a))
            .filter(|a| a.is_alive())
            .map(|a| DamageAlert {
                victim: target,
                victim_position,
                attacker: a.id,
                attacker_position: a.body.position,
                attacker_team: a.team,
            });
        if let Some(alert) = alert {
            let transitions = self.agents.on_damage_taken(&alert, view, &self.tuning.ai);
            self.push_transitions(transitions);
        }
    }

    /// Bookkeeping for a combatant that just died
    fn process_death(
        &mut self,
        victim: CombatantId,
        killer: Option<CombatantId>,
        weapon: Option<WeaponKind>,
    ) {
        if !self.ledger.record_death(victim, killer) {
            warn!(combatant = %victim, "Death of an unregistered combatant");
        }
        self.events.push(CoreEvent::CombatantDied {
            victim_id: victim,
            killer_id: killer,
        });
        if let Some(entry) = self.kill_feed_entry(victim, killer, weapon) {
            self.events.push(CoreEvent::KillFeed(entry));
        }

        let transition = self.agents.on_death(victim);
        self.push_transitions(transition);
        self.events.push(CoreEvent::ScoreboardUpdated {
            scoreboard: self.scoreboard(),
        });

        if self.active.as_ref().is_some_and(|a| a.mode.respawns()) {
            let due = self.tick + self.clock.ticks_for(self.tuning.timing.respawn_delay);
            self.schedule.push(due, ScheduledEvent::Respawn { id: victim });
        }

        info!(victim = %victim, killer = ?killer.map(|k| k.0), tick = self.tick, "Combatant died");
        self.evaluate_win();
    }

    fn kill_feed_entry(
        &self,
        victim: CombatantId,
        killer: Option<CombatantId>,
        weapon: Option<WeaponKind>,
    ) -> Option<KillFeedEntry> {
        let killer = self.combatants.get(&killer.filter(|k| *k != victim)?)?;
        let victim = self.combatants.get(&victim)?;
        let weapon = weapon.or_else(|| killer.weapons.active_kind())?;
        Some(KillFeedEntry {
            killer_name: killer.name.clone(),
            victim_name: victim.name.clone(),
            weapon_name: self.tuning.weapons.definition(weapon).name.clone(),
        })
    }

    /// Energy, weapon countdowns and rest healing for everyone
    fn upkeep(&mut self, dt: f32) {
        for c in self.combatants.values_mut() {
            c.state.tick(self.tuning.classes.stats(c.class), dt, c.sprinting);
            if !c.is_alive() {
                continue;
            }
            let completions = c.weapons.tick(
                &self.tuning.weapons,
                dt,
                self.tuning.combat.recoil_recovery_rate,
            );
            for done in completions {
                self.events.push(CoreEvent::ReloadCompleted {
                    id: c.id,
                    weapon: done.weapon,
                    current_ammo: done.current_ammo,
                    reserve_ammo: done.reserve_ammo,
                });
            }
            if self.agents.is_resting(c.id) {
                c.state.heal(self.tuning.ai.hide_regen * dt);
            }
        }
    }

    fn advance_timer(&mut self, dt: f32) {
        if let Some(active) = self.active.as_mut() {
            active.elapsed += dt;
            if let Some(remaining) = active.remaining.as_mut() {
                *remaining = (*remaining - dt).max(0.0);
            }
        }
    }

    fn evaluate_win(&mut self) {
        if self.status != MatchStatus::InProgress {
            return;
        }
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.pending_spawns > 0 {
            return;
        }

        let expired = active.remaining.is_some_and(|r| r <= 0.0);
        let kill_limit = active.rules.kill_limit;
        let outcome = match active.mode {
            MatchMode::FreeForAll => self.free_for_all_outcome(kill_limit, expired),
            MatchMode::TeamDeathmatch => self.team_outcome(kill_limit, expired),
            MatchMode::Survival => (self.alive_count() <= 1).then(|| {
                self.combatants
                    .values()
                    .find(|c| c.is_alive())
                    .map(|c| Winner::Combatant(c.id))
            }),
            MatchMode::Training => None,
        };

        if let Some(winner) = outcome {
            self.end_match(winner);
        }
    }

    /// First to the limit wins; at expiry the strictly highest kill count,
    /// earliest id on ties
    fn free_for_all_outcome(&self, kill_limit: Option<u32>, expired: bool) -> Option<Option<Winner>> {
        if let Some(limit) = kill_limit {
            if let Some((id, _)) = self.ledger.records().find(|(_, r)| r.kills >= limit) {
                return Some(Some(Winner::Combatant(id)));
            }
        }
        if !expired {
            return None;
        }

        let mut best: Option<(CombatantId, u32)> = None;
        for (id, record) in self.ledger.records() {
            if best.map_or(true, |(_, kills)| record.kills > kills) {
                best = Some((id, record.kills));
            }
        }
        Some(best.map(|(id, _)| Winner::Combatant(id)))
    }

    /// Red is checked first; a tie at expiry goes to Red
    fn team_outcome(&self, kill_limit: Option<u32>, expired: bool) -> Option<Option<Winner>> {
        let red = self.ledger.team_score(Team::Red);
        let blue = self.ledger.team_score(Team::Blue);
        if let Some(limit) = kill_limit {
            if red >= limit {
                return Some(Some(Winner::Team(Team::Red)));
            }
            if blue >= limit {
                return Some(Some(Winner::Team(Team::Blue)));
            }
        }
        expired.then(|| {
            let team = if blue > red { Team::Blue } else { Team::Red };
            Some(Winner::Team(team))
        })
    }

    fn results(&self, winner: Option<Winner>, duration: f32) -> Vec<MatchResultReport> {
        let rewards = &self.tuning.rewards;
        self.ledger
            .records()
            .map(|(id, r)| {
                let won = match winner {
                    Some(Winner::Combatant(w)) => w == id,
                    Some(Winner::Team(team)) => r.team == Some(team),
                    None => false,
                };
                MatchResultReport {
                    combatant_id: id,
                    name: self.name_of(id),
                    team: r.team,
                    kills: r.kills,
                    deaths: r.deaths,
                    score: r.score,
                    won,
                    match_duration_secs: duration,
                    experience: rewards.experience(r.kills, r.score, won),
                    credits: rewards.credits(r.kills, won),
                }
            })
            .collect()
    }

    fn return_to_lobby(&mut self) {
        if self.status != MatchStatus::Ended {
            return;
        }
        self.status = MatchStatus::Lobby;
        self.active = None;
        self.combatants.clear();
        self.agents.clear();
        self.schedule.clear();
        self.ledger = ScoringLedger::new(self.tuning.rewards.kill_score, false);

        info!(seats = self.lobby.len(), "Returned to lobby");
        self.events.push(CoreEvent::ReturnedToLobby);
    }

    fn push_transitions(&mut self, transitions: impl IntoIterator<Item = StateTransition>) {
        for t in transitions {
            debug!(combatant = %t.id, from = %t.from, to = %t.to, "Agent state changed");
            self.events.push(CoreEvent::AgentStateChanged {
                id: t.id,
                from: t.from,
                to: t.to,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{ArenaMap, Bounds};

    fn quick_tuning() -> Tuning {
        let mut tuning = Tuning::default();
        tuning.timing.spawn_stagger = 0.0;
        tuning
    }

    fn open_range() -> ArenaMap {
        ArenaMap {
            name: "open_range".to_string(),
            bounds: Bounds::new(Vec2::splat(-30.0), Vec2::splat(30.0)),
            obstacles: Vec::new(),
            spawn_points: vec![Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)],
            cover_points: vec![Vec2::new(0.0, 20.0)],
        }
    }

    fn coordinator(tuning: Tuning) -> MatchCoordinator {
        let mut c = MatchCoordinator::new(tuning, TickClock::new(30), 7);
        c.register_map("open_range", Arc::new(open_range()));
        c
    }

    fn seat_humans(c: &mut MatchCoordinator, n: usize) {
        for i in 0..n {
            c.join_lobby(format!("Pilot {i}"), MechaClass::Medium).unwrap();
        }
    }

    fn idle(c: &mut MatchCoordinator, ticks: usize) -> Vec<CoreEvent> {
        let none = BTreeMap::new();
        (0..ticks).flat_map(|_| c.step(&none)).collect()
    }

    fn winner_of(events: &[CoreEvent]) -> Option<Option<Winner>> {
        events.iter().find_map(|e| match e {
            CoreEvent::MatchEnded { winner, .. } => Some(*winner),
            _ => None,
        })
    }

    fn id(n: u32) -> CombatantId {
        CombatantId(n)
    }

    #[test]
    fn ffa_kill_limit_ends_match_immediately() {
        let mut tuning = quick_tuning();
        tuning.timing.respawn_delay = 0.0;
        let mut c = coordinator(tuning);
        seat_humans(&mut c, 8);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);
        assert_eq!(c.alive_count(), 8);

        for k in 0..25u32 {
            assert_eq!(c.status(), MatchStatus::InProgress);
            c.on_combatant_death(id(1 + k % 7), Some(id(0)));
            if k < 24 {
                idle(&mut c, 1);
            }
        }

        assert_eq!(c.status(), MatchStatus::Ended);
        let events = c.drain_events();
        assert_eq!(winner_of(&events), Some(Some(Winner::Combatant(id(0)))));

        let results = events
            .iter()
            .find_map(|e| match e {
                CoreEvent::MatchEnded { results, .. } => Some(results.clone()),
                _ => None,
            })
            .unwrap();
        let top = results.iter().find(|r| r.combatant_id == id(0)).unwrap();
        assert!(top.won);
        assert_eq!((top.kills, top.score), (25, 2500));
        assert_eq!(top.experience, 100 + 25 * 25 + 250 + 200);
        assert_eq!(top.credits, 50 + 250 + 100);
        assert!(results.iter().filter(|r| r.combatant_id != id(0)).all(|r| !r.won));
    }

    #[test]
    fn ffa_expiry_tie_goes_to_first_id() {
        let mut tuning = quick_tuning();
        tuning.modes.free_for_all = ModeRules {
            player_count: 3,
            time_limit_secs: Some(1.0),
            kill_limit: Some(25),
        };
        let mut c = coordinator(tuning);
        seat_humans(&mut c, 3);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);

        c.on_combatant_death(id(2), Some(id(1)));
        c.on_combatant_death(id(1), Some(id(2)));
        let events = idle(&mut c, 45);
        assert_eq!(winner_of(&events), Some(Some(Winner::Combatant(id(1)))));
    }

    fn tdm(kills: &[(u32, u32)]) -> Option<Option<Winner>> {
        let mut tuning = quick_tuning();
        tuning.modes.team_deathmatch = ModeRules {
            player_count: 4,
            time_limit_secs: Some(1.0),
            kill_limit: Some(50),
        };
        let mut c = coordinator(tuning);
        seat_humans(&mut c, 4);
        c.start_match(MatchMode::TeamDeathmatch, "foundry").unwrap();
        idle(&mut c, 1);

        assert_eq!(c.combatant(id(0)).unwrap().team, Some(Team::Red));
        assert_eq!(c.combatant(id(1)).unwrap().team, Some(Team::Blue));

        for &(victim, killer) in kills {
            c.on_combatant_death(id(victim), Some(id(killer)));
        }
        let events = idle(&mut c, 45);
        winner_of(&events)
    }

    #[test]
    fn tdm_tie_at_expiry_goes_to_red() {
        // one kill each way
        assert_eq!(tdm(&[(1, 0), (2, 3)]), Some(Some(Winner::Team(Team::Red))));
        assert_eq!(tdm(&[]), Some(Some(Winner::Team(Team::Red))));
    }

    #[test]
    fn tdm_higher_blue_score_wins_at_expiry() {
        assert_eq!(
            tdm(&[(0, 1), (2, 3)]),
            Some(Some(Winner::Team(Team::Blue)))
        );
    }

    #[test]
    fn teammates_cannot_hurt_or_score_off_each_other() {
        let mut tuning = quick_tuning();
        tuning.modes.team_deathmatch.player_count = 4;
        let mut c = coordinator(tuning);
        seat_humans(&mut c, 4);
        c.start_match(MatchMode::TeamDeathmatch, "foundry").unwrap();
        idle(&mut c, 1);
        c.drain_events();

        // 0 and 2 are both Red
        c.apply_damage(id(2), 1000.0, Some(id(0)));
        assert!(c.combatant(id(2)).unwrap().is_alive());
        assert!(c.drain_events().is_empty());

        c.on_combatant_death(id(2), Some(id(0)));
        assert!(!c.combatant(id(2)).unwrap().is_alive());
        assert_eq!(c.ledger().kills(id(0)), 0);
        assert_eq!(c.ledger().team_score(Team::Red), 0);

        c.apply_damage(id(1), 1000.0, Some(id(0)));
        assert!(!c.combatant(id(1)).unwrap().is_alive());
        assert_eq!(c.ledger().kills(id(0)), 1);
        assert_eq!(c.ledger().team_score(Team::Red), 1);
    }

    #[test]
    fn killed_combatant_respawns_with_full_stats_and_default_ammo() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 8);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);

        let trigger = Intent {
            fire_held: true,
            fire_edge: true,
            ..Intent::default()
        };
        let intents = BTreeMap::from([(id(3), trigger)]);
        for _ in 0..4 {
            c.step(&intents);
        }
        assert!(c.combatant(id(3)).unwrap().weapons.active_slot().unwrap().current_ammo < 30);

        c.apply_damage(id(3), 30.0, Some(id(7)));
        c.on_combatant_death(id(3), Some(id(7)));
        let events = c.drain_events();
        assert!(events.contains(&CoreEvent::CombatantDied {
            victim_id: id(3),
            killer_id: Some(id(7)),
        }));
        assert!(events.iter().any(|e| matches!(e, CoreEvent::KillFeed(k) if k.weapon_name == "Assault Rifle")));

        let victim = c.combatant(id(3)).unwrap();
        assert!(!victim.is_alive());
        assert_eq!(c.ledger().kills(id(7)), 1);
        assert_eq!(c.ledger().record(id(3)).unwrap().deaths, 1);

        idle(&mut c, 89);
        assert!(!c.combatant(id(3)).unwrap().is_alive());
        let events = idle(&mut c, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::CombatantRespawned { id: r, .. } if *r == id(3))));

        let back = c.combatant(id(3)).unwrap();
        assert!(back.is_alive());
        assert_eq!((back.state.health, back.state.max_health), (100.0, 100.0));
        assert_eq!((back.state.armor, back.state.max_armor), (50.0, 50.0));
        assert_eq!(back.state.energy, back.state.max_energy);
        assert_eq!(back.weapons.active_index(), 0);
        let slot = back.weapons.active_slot().unwrap();
        assert_eq!((slot.current_ammo, slot.reserve_ammo), (30, 90));
        assert!(!slot.reloading);
    }

    #[test]
    fn dead_combatants_ignore_damage_and_second_deaths() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 8);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);

        c.on_combatant_death(id(2), None);
        c.drain_events();
        c.apply_damage(id(2), 50.0, Some(id(1)));
        c.on_combatant_death(id(2), Some(id(1)));

        assert!(c.drain_events().is_empty());
        assert_eq!(c.combatant(id(2)).unwrap().state.health, 0.0);
        assert_eq!(c.ledger().total_deaths(), 1);
        assert_eq!(c.ledger().kills(id(1)), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 8);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);

        c.apply_damage(id(99), 50.0, None);
        c.on_combatant_death(id(99), Some(id(0)));
        c.reload(id(99));
        c.respawn(id(99));
        let intents = BTreeMap::from([(id(42), Intent::default())]);
        let events = c.step(&intents);
        assert!(events.is_empty());
        assert_eq!(c.ledger().total_deaths(), 0);
    }

    #[test]
    fn survival_ends_with_the_last_one_standing() {
        let mut tuning = quick_tuning();
        tuning.modes.survival.player_count = 3;
        let mut c = coordinator(tuning);
        seat_humans(&mut c, 3);
        c.start_match(MatchMode::Survival, "foundry").unwrap();
        idle(&mut c, 1);

        c.on_combatant_death(id(1), Some(id(0)));
        assert_eq!(c.status(), MatchStatus::InProgress);
        idle(&mut c, 120);
        assert!(!c.combatant(id(1)).unwrap().is_alive(), "no respawn in survival");

        c.on_combatant_death(id(2), Some(id(0)));
        assert_eq!(c.status(), MatchStatus::Ended);
        assert_eq!(
            winner_of(&c.drain_events()),
            Some(Some(Winner::Combatant(id(0))))
        );
    }

    #[test]
    fn training_ends_only_by_abort_then_returns_to_lobby() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 1);
        c.start_match(MatchMode::Training, "proving_ground").unwrap();
        idle(&mut c, 300);
        assert_eq!(c.status(), MatchStatus::InProgress);
        assert_eq!(c.combatants().count(), 1);

        c.abort_match();
        assert_eq!(c.status(), MatchStatus::Ended);
        assert_eq!(winner_of(&c.drain_events()), Some(None));

        c.abort_match();
        c.end_match(Some(Winner::Combatant(id(0))));
        assert!(c.drain_events().is_empty());

        let events = idle(&mut c, 150);
        assert!(events.contains(&CoreEvent::ReturnedToLobby));
        assert_eq!(c.status(), MatchStatus::Lobby);
        assert_eq!(c.combatants().count(), 0);
        assert_eq!(c.ledger().total_deaths(), 0);
        assert_eq!(c.lobby().len(), 1);

        assert!(c.start_match(MatchMode::Training, "proving_ground").is_ok());
    }

    #[test]
    fn start_is_rejected_for_unknown_maps_and_running_matches() {
        let mut c = coordinator(quick_tuning());
        assert_eq!(
            c.start_match(MatchMode::FreeForAll, "atlantis"),
            Err(MatchError::UnknownMap("atlantis".to_string()))
        );
        assert_eq!(c.status(), MatchStatus::Lobby);
        assert!(c.drain_events().is_empty());

        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        assert_eq!(
            c.start_match(MatchMode::Survival, "foundry"),
            Err(MatchError::AlreadyInProgress)
        );
        assert_eq!(c.mode(), Some(MatchMode::FreeForAll));
        assert_eq!(
            c.join_lobby("late", MechaClass::Light),
            Err(MatchError::NotInLobby(MatchStatus::InProgress))
        );
    }

    #[test]
    fn lobby_fills_up_to_the_largest_mode() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 15);
        assert_eq!(
            c.join_lobby("extra", MechaClass::Heavy),
            Err(MatchError::LobbyFull(15))
        );
    }

    #[test]
    fn agents_fill_the_empty_seats() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 2);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);

        assert_eq!(c.combatants().count(), 8);
        assert_eq!(c.combatant(id(1)).unwrap().controller, Controller::Human);
        let bot = c.combatant(id(2)).unwrap();
        assert_eq!(bot.name, "Bot 03");
        assert_eq!(bot.class, MechaClass::Heavy);
        assert!(c.agent(id(2)).is_some());
        assert!(c.agent(id(1)).is_none());
    }

    #[test]
    fn spawns_are_staggered() {
        let mut c = coordinator(Tuning::default());
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        idle(&mut c, 1);
        assert_eq!(c.combatants().count(), 1);
        assert!(c.pending_spawns() > 0);
        idle(&mut c, 30);
        assert_eq!(c.combatants().count(), 8);
        assert_eq!(c.pending_spawns(), 0);
    }

    #[test]
    fn aimed_first_shot_hits_a_still_target() {
        let mut tuning = quick_tuning();
        tuning.modes.free_for_all.player_count = 2;
        let mut c = coordinator(tuning);
        seat_humans(&mut c, 2);
        c.start_match(MatchMode::FreeForAll, "open_range").unwrap();
        idle(&mut c, 1);

        let shooter = c.combatant(id(0)).unwrap().body.position;
        let target = c.combatant(id(1)).unwrap().body.position;
        assert_eq!(shooter.distance(target), 20.0);

        let intent = Intent {
            look_vector: target - shooter,
            aim_held: true,
            fire_held: true,
            fire_edge: true,
            ..Intent::default()
        };
        let events = c.step(&BTreeMap::from([(id(0), intent)]));
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::ShotFired { shooter_id, .. } if *shooter_id == id(0))));
        assert!(events.iter().any(|e| matches!(
            e,
            CoreEvent::DamageDealt { attacker_id: Some(a), target_id: t, .. } if *a == id(0) && *t == id(1)
        )));
        assert!(c.combatant(id(1)).unwrap().state.armor < 50.0);
    }

    #[test]
    fn shield_raises_armor_ceiling_until_it_expires() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 1);
        c.start_match(MatchMode::Training, "open_range").unwrap();
        idle(&mut c, 1);

        let ability = Intent {
            ability_edge: true,
            ..Intent::default()
        };
        let events = c.step(&BTreeMap::from([(id(0), ability)]));
        assert!(events.contains(&CoreEvent::AbilityActivated {
            id: id(0),
            ability: AbilityKind::Shield,
        }));
        let state = &c.combatant(id(0)).unwrap().state;
        assert_eq!((state.armor, state.max_armor), (100.0, 100.0));

        let events = idle(&mut c, 150);
        assert!(events.contains(&CoreEvent::AbilityExpired {
            id: id(0),
            ability: AbilityKind::Shield,
        }));
        let state = &c.combatant(id(0)).unwrap().state;
        assert_eq!((state.armor, state.max_armor), (50.0, 50.0));
    }

    #[test]
    fn chat_is_relayed_trimmed() {
        let mut c = coordinator(quick_tuning());
        seat_humans(&mut c, 1);
        c.relay_chat(id(0), "  gg  ");
        c.relay_chat(id(5), "who?");
        assert_eq!(
            c.drain_events(),
            vec![CoreEvent::ChatRelayed {
                sender_id: id(0),
                sender_name: "Pilot 0".to_string(),
                text: "gg".to_string(),
            }]
        );
    }

    fn assert_invariants(c: &MatchCoordinator) {
        for combatant in c.combatants() {
            let s = &combatant.state;
            assert!((0.0..=s.max_health).contains(&s.health));
            assert!((0.0..=s.max_armor).contains(&s.armor));
            assert!((0.0..=s.max_energy).contains(&s.energy));
            for (i, kind) in combatant.weapons.loadout().iter().enumerate() {
                if let Some(slot) = combatant.weapons.slot(i) {
                    let def = c.tuning().weapons.definition(*kind);
                    assert!(slot.current_ammo <= def.magazine_size);
                    assert!(slot.reserve_ammo <= def.max_reserve_ammo);
                }
            }
            if let Some(target) = c.agent(combatant.id).and_then(|a| a.target()) {
                assert!(c.combatant(target).is_some_and(|t| t.is_alive()));
            }
        }
    }

    fn bot_match(seed: u64) -> Vec<CoreEvent> {
        let mut c = MatchCoordinator::new(Tuning::default(), TickClock::new(30), seed);
        c.start_match(MatchMode::FreeForAll, "foundry").unwrap();
        let none = BTreeMap::new();
        let mut events = Vec::new();
        for _ in 0..900 {
            events.extend(c.step(&none));
            assert_invariants(&c);
        }

        let died = events
            .iter()
            .filter(|e| matches!(e, CoreEvent::CombatantDied { .. }))
            .count() as u64;
        let credited = events
            .iter()
            .filter(|e| matches!(e, CoreEvent::CombatantDied { victim_id, killer_id: Some(k) } if k != victim_id))
            .count() as u64;
        assert_eq!(c.ledger().total_deaths(), died);
        assert_eq!(c.ledger().total_kills(), credited);
        events
    }

    #[test]
    fn bot_match_keeps_invariants_and_is_reproducible() {
        let first = bot_match(11);
        assert!(first
            .iter()
            .any(|e| matches!(e, CoreEvent::ShotFired { .. })));
        assert_eq!(first, bot_match(11));
    }
}
