//! Snapshot building and pacing

use crate::protocol::{CombatantSnapshot, MatchSnapshot};

use super::r#match::{Combatant, MatchCoordinator};

/// Paces snapshots for network transmission
pub struct SnapshotBuilder {
    /// Ticks since the last snapshot went out
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (deaths, match end)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Full, read-only copy of the coordinator's current state
    pub fn capture(coordinator: &MatchCoordinator) -> MatchSnapshot {
        MatchSnapshot {
            tick: coordinator.tick(),
            status: coordinator.status(),
            mode: coordinator.mode(),
            map: coordinator.map_name().map(str::to_string),
            remaining_secs: coordinator.remaining_secs(),
            combatants: coordinator
                .combatants()
                .map(|c| combatant_snapshot(coordinator, c))
                .collect(),
            scoreboard: coordinator.scoreboard(),
        }
    }
}

fn combatant_snapshot(coordinator: &MatchCoordinator, c: &Combatant) -> CombatantSnapshot {
    let weapon = c.weapons.active_kind();
    let slot = c.weapons.active_slot();
    let catalog = &coordinator.tuning().weapons;

    CombatantSnapshot {
        id: c.id,
        name: c.name.clone(),
        team: c.team,
        class: c.class,
        alive: c.is_alive(),
        position: c.body.position,
        facing: c.body.facing,
        health: c.state.health_fraction(),
        armor: c.state.armor_fraction(),
        energy: c.state.energy_fraction(),
        weapon,
        current_ammo: slot.map_or(0, |s| s.current_ammo),
        reserve_ammo: slot.map_or(0, |s| s.reserve_ammo),
        reload_progress: slot
            .zip(weapon)
            .and_then(|(s, k)| s.reload_progress(catalog.definition(k))),
        agent_state: coordinator.agent(c.id).map(|a| a.state()),
    }
}

/// Snapshot size stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_combatants_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, combatant_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_combatants_per_snapshot =
            self.avg_combatants_per_snapshot * ((n - 1.0) / n) + (combatant_count as f32 / n);
    }

    pub fn avg_bytes(&self) -> u64 {
        if self.total_snapshots == 0 {
            0
        } else {
            self.total_bytes / self.total_snapshots
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::ai::BehaviorState;
    use crate::protocol::{CombatantId, MatchMode, MatchStatus, MechaClass};
    use crate::util::time::TickClock;
    use std::collections::BTreeMap;

    #[test]
    fn builder_fires_every_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);

        builder.should_send();
        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn lobby_snapshot_is_empty() {
        let coordinator = MatchCoordinator::new(Tuning::default(), TickClock::new(30), 1);
        let snapshot = SnapshotBuilder::capture(&coordinator);
        assert_eq!(snapshot.status, MatchStatus::Lobby);
        assert!(snapshot.mode.is_none());
        assert!(snapshot.combatants.is_empty());
    }

    #[test]
    fn snapshot_reports_fractions_and_agent_state() {
        let mut tuning = Tuning::default();
        tuning.timing.spawn_stagger = 0.0;
        let mut coordinator = MatchCoordinator::new(tuning, TickClock::new(30), 1);
        coordinator.join_lobby("Ace", MechaClass::Light).unwrap();
        coordinator
            .start_match(MatchMode::FreeForAll, "foundry")
            .unwrap();
        coordinator.step(&BTreeMap::new());
        coordinator.apply_damage(CombatantId(0), 50.0, None);

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.map.as_deref(), Some("foundry"));
        assert_eq!(snapshot.combatants.len(), 8);
        assert_eq!(snapshot.scoreboard.combatants.len(), 8);

        let ace = &snapshot.combatants[0];
        assert_eq!(ace.name, "Ace");
        assert!(ace.agent_state.is_none());
        assert!(ace.health < 1.0 && ace.armor < 1.0);
        assert_eq!(ace.current_ammo, 40);
        assert!(ace.reload_progress.is_none());

        assert!(snapshot.combatants[1..].iter().all(|c| c.agent_state.is_some()));
        assert_ne!(snapshot.combatants[1].agent_state, Some(BehaviorState::Dead));
    }

    #[test]
    fn stats_average_combatants() {
        let mut stats = SnapshotStats::default();
        stats.record(4, 400);
        stats.record(8, 800);
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(stats.avg_bytes(), 600);
        assert!((stats.avg_combatants_per_snapshot - 6.0).abs() < 1e-5);
    }
}
