//! Async match driver: one tokio task per arena running the coordinator at a
//! fixed tick rate, fed through a command channel and fanned out over a
//! broadcast channel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{CombatantId, CoreEvent, Intent, MatchMode, MatchSnapshot, MechaClass};
use crate::util::rate_limit::IntentRateLimiter;
use crate::util::time::Timer;

use super::r#match::{MatchCoordinator, MatchError};
use super::snapshot::{SnapshotBuilder, SnapshotStats};

const COMMAND_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 64;

/// Work submitted to a running match task
#[derive(Debug)]
pub enum MatchCommand {
    JoinLobby {
        name: String,
        class: MechaClass,
        reply: oneshot::Sender<Result<CombatantId, MatchError>>,
    },
    Start {
        mode: MatchMode,
        map: String,
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
    Intent {
        id: CombatantId,
        intent: Intent,
    },
    Reload {
        id: CombatantId,
    },
    EquipWeapon {
        id: CombatantId,
        slot: usize,
    },
    ActivateAbility {
        id: CombatantId,
    },
    Chat {
        id: CombatantId,
        text: String,
    },
    Abort,
    Shutdown,
}

/// What subscribers receive
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMsg {
    Events {
        match_id: Uuid,
        tick: u64,
        sent_at: DateTime<Utc>,
        events: Vec<CoreEvent>,
    },
    Snapshot {
        match_id: Uuid,
        sent_at: DateTime<Utc>,
        snapshot: MatchSnapshot,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("match task has stopped")]
    Closed,

    #[error("command queue is full")]
    Busy,

    #[error("intent rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    command_tx: mpsc::Sender<MatchCommand>,
    event_tx: broadcast::Sender<SessionMsg>,
    latest: Arc<RwLock<Option<MatchSnapshot>>>,
    limiter: Arc<IntentRateLimiter>,
}

impl MatchHandle {
    pub async fn join_lobby(
        &self,
        name: impl Into<String>,
        class: MechaClass,
    ) -> Result<CombatantId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(MatchCommand::JoinLobby {
            name: name.into(),
            class,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    pub async fn start(&self, mode: MatchMode, map: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(MatchCommand::Start {
            mode,
            map: map.into(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| SessionError::Closed)??)
    }

    /// Queue this tick's intent without waiting. Floods are rejected before
    /// they reach the match task.
    pub fn submit_intent(&self, id: CombatantId, intent: Intent) -> Result<(), SessionError> {
        if !self.limiter.check(id) {
            return Err(SessionError::RateLimited);
        }
        self.command_tx
            .try_send(MatchCommand::Intent { id, intent })
            .map_err(|e| match e {
                TrySendError::Full(_) => SessionError::Busy,
                TrySendError::Closed(_) => SessionError::Closed,
            })
    }

    pub async fn reload(&self, id: CombatantId) -> Result<(), SessionError> {
        self.send(MatchCommand::Reload { id }).await
    }

    pub async fn equip_weapon(&self, id: CombatantId, slot: usize) -> Result<(), SessionError> {
        self.send(MatchCommand::EquipWeapon { id, slot }).await
    }

    pub async fn activate_ability(&self, id: CombatantId) -> Result<(), SessionError> {
        self.send(MatchCommand::ActivateAbility { id }).await
    }

    pub async fn chat(&self, id: CombatantId, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(MatchCommand::Chat {
            id,
            text: text.into(),
        })
        .await
    }

    pub async fn abort(&self) -> Result<(), SessionError> {
        self.send(MatchCommand::Abort).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(MatchCommand::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionMsg> {
        self.event_tx.subscribe()
    }

    /// Most recent snapshot published by the task
    pub fn latest_snapshot(&self) -> Option<MatchSnapshot> {
        self.latest.read().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn send(&self, command: MatchCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Registry of all running arenas
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Drop handles whose task has stopped; returns how many were removed
    pub fn prune_closed(&self) -> usize {
        let before = self.matches.len();
        self.matches.retain(|_, handle| !handle.is_closed());
        before - self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The task side of a match
pub struct GameMatch {
    id: Uuid,
    coordinator: MatchCoordinator,
    command_rx: mpsc::Receiver<MatchCommand>,
    event_tx: broadcast::Sender<SessionMsg>,
    latest: Arc<RwLock<Option<MatchSnapshot>>>,
    limiter: Arc<IntentRateLimiter>,
    snapshot_builder: SnapshotBuilder,
    stats: SnapshotStats,
    /// Latest intent per human; edges are cleared after each step
    intents: BTreeMap<CombatantId, Intent>,
}

impl GameMatch {
    pub fn new(id: Uuid, coordinator: MatchCoordinator, snapshot_tps: u32) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let latest = Arc::new(RwLock::new(None));

        let clock = coordinator.clock();
        let limiter = Arc::new(IntentRateLimiter::new(clock.tps() * 2));

        let handle = MatchHandle {
            id,
            created_at: Utc::now(),
            command_tx,
            event_tx: event_tx.clone(),
            latest: latest.clone(),
            limiter: limiter.clone(),
        };

        let game_match = Self {
            id,
            coordinator,
            command_rx,
            event_tx,
            latest,
            limiter,
            snapshot_builder: SnapshotBuilder::new(clock.snapshot_interval(snapshot_tps)),
            stats: SnapshotStats::default(),
            intents: BTreeMap::new(),
        };

        (game_match, handle)
    }

    /// Run the authoritative tick loop until shutdown or until every handle
    /// is dropped
    pub async fn run(mut self) {
        let clock = self.coordinator.clock();
        info!(match_id = %self.id, tps = clock.tps(), "Match task started");

        let mut tick_interval = interval(clock.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            if !self.process_commands() {
                break;
            }

            let timer = Timer::new();
            let events = self.coordinator.step(&self.intents);
            for intent in self.intents.values_mut() {
                *intent = intent.without_edges();
            }

            let elapsed = timer.elapsed();
            if elapsed > clock.tick_duration() {
                warn!(
                    match_id = %self.id,
                    tick = self.coordinator.tick(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "Tick overran its budget"
                );
            }

            self.publish(events);
        }

        info!(
            match_id = %self.id,
            snapshots = self.stats.total_snapshots,
            "Match task stopped"
        );
    }

    /// Drain the command queue. Returns false when the task should stop.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(MatchCommand::Shutdown) => {
                    info!(match_id = %self.id, "Shutdown requested");
                    self.coordinator.abort_match();
                    let events = self.coordinator.drain_events();
                    self.publish(events);
                    return false;
                }
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    info!(match_id = %self.id, "All handles dropped");
                    return false;
                }
            }
        }
    }

    fn handle_command(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::JoinLobby { name, class, reply } => {
                let _ = reply.send(self.coordinator.join_lobby(name, class));
            }
            MatchCommand::Start { mode, map, reply } => {
                let result = self.coordinator.start_match(mode, &map);
                if result.is_ok() {
                    self.intents.clear();
                    self.limiter.reset();
                }
                let _ = reply.send(result);
            }
            MatchCommand::Intent { id, intent } => {
                let entry = self.intents.entry(id).or_default();
                *entry = entry.merge(intent);
            }
            MatchCommand::Reload { id } => self.coordinator.reload(id),
            MatchCommand::EquipWeapon { id, slot } => self.coordinator.equip_weapon(id, slot),
            MatchCommand::ActivateAbility { id } => self.coordinator.activate_ability(id),
            MatchCommand::Chat { id, text } => self.coordinator.relay_chat(id, &text),
            MatchCommand::Abort => self.coordinator.abort_match(),
            MatchCommand::Shutdown => {}
        }
    }

    fn publish(&mut self, events: Vec<CoreEvent>) {
        let important = events.iter().any(|e| {
            matches!(
                e,
                CoreEvent::MatchStarted { .. }
                    | CoreEvent::CombatantDied { .. }
                    | CoreEvent::MatchEnded { .. }
                    | CoreEvent::ReturnedToLobby
            )
        });
        if important {
            self.snapshot_builder.force_next();
        }
        if events.contains(&CoreEvent::ReturnedToLobby) {
            self.intents.clear();
            info!(
                match_id = %self.id,
                snapshots = self.stats.total_snapshots,
                avg_bytes = self.stats.avg_bytes(),
                avg_combatants = self.stats.avg_combatants_per_snapshot,
                "Snapshot stats"
            );
        }

        if !events.is_empty() {
            // no subscribers is fine
            let _ = self.event_tx.send(SessionMsg::Events {
                match_id: self.id,
                tick: self.coordinator.tick(),
                sent_at: Utc::now(),
                events,
            });
        }

        if self.snapshot_builder.should_send() {
            let snapshot = self.coordinator.snapshot();
            match serde_json::to_vec(&snapshot) {
                Ok(bytes) => self.stats.record(snapshot.combatants.len(), bytes.len()),
                Err(e) => debug!(match_id = %self.id, error = %e, "Snapshot not serializable"),
            }
            *self.latest.write() = Some(snapshot.clone());
            let _ = self.event_tx.send(SessionMsg::Snapshot {
                match_id: self.id,
                sent_at: Utc::now(),
                snapshot,
            });
        }
    }
}
