//! Kill/death/score ledger

use std::collections::BTreeMap;

use crate::protocol::{CombatantId, Team, TeamScore};

/// Per-combatant tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombatantRecord {
    pub team: Option<Team>,
    pub kills: u32,
    pub deaths: u32,
    pub score: u32,
}

/// Aggregates kills, deaths and score per combatant and per team
#[derive(Debug, Clone, Default)]
pub struct ScoringLedger {
    records: BTreeMap<CombatantId, CombatantRecord>,
    teams: BTreeMap<Team, u32>,
    kill_score: u32,
    deaths_processed: u64,
}

impl ScoringLedger {
    pub fn new(kill_score: u32, with_teams: bool) -> Self {
        let mut teams = BTreeMap::new();
        if with_teams {
            teams.insert(Team::Red, 0);
            teams.insert(Team::Blue, 0);
        }
        Self {
            records: BTreeMap::new(),
            teams,
            kill_score,
            deaths_processed: 0,
        }
    }

    pub fn register(&mut self, id: CombatantId, team: Option<Team>) {
        self.records.entry(id).or_insert(CombatantRecord {
            team,
            ..Default::default()
        });
    }

    /// Record one death. The killer is credited only when it is known, is
    /// not the victim and is not on the victim's team. Returns false for an
    /// unregistered victim.
    pub fn record_death(&mut self, victim: CombatantId, killer: Option<CombatantId>) -> bool {
        let Some(record) = self.records.get_mut(&victim) else {
            return false;
        };
        record.deaths += 1;
        self.deaths_processed += 1;
        let victim_team = record.team;

        let Some(killer) = killer.filter(|k| *k != victim) else {
            return true;
        };
        if let Some(record) = self
            .records
            .get_mut(&killer)
            .filter(|r| victim_team.is_none() || r.team != victim_team)
        {
            record.kills += 1;
            record.score += self.kill_score;
            if let Some(team_score) = record.team.and_then(|t| self.teams.get_mut(&t)) {
                *team_score += 1;
            }
        }
        true
    }

    pub fn record(&self, id: CombatantId) -> Option<&CombatantRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = (CombatantId, &CombatantRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    pub fn kills(&self, id: CombatantId) -> u32 {
        self.records.get(&id).map_or(0, |r| r.kills)
    }

    pub fn team_score(&self, team: Team) -> u32 {
        self.teams.get(&team).copied().unwrap_or(0)
    }

    pub fn team_scores(&self) -> Vec<TeamScore> {
        self.teams
            .iter()
            .map(|(team, kills)| TeamScore {
                team: *team,
                kills: *kills,
            })
            .collect()
    }

    pub fn total_deaths(&self) -> u64 {
        self.deaths_processed
    }

    pub fn total_kills(&self) -> u64 {
        self.records.values().map(|r| r.kills as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tdm_ledger() -> ScoringLedger {
        let mut ledger = ScoringLedger::new(100, true);
        for i in 0..4 {
            ledger.register(CombatantId(i), Some(Team::for_spawn_index(i as usize)));
        }
        ledger
    }

    #[test]
    fn kill_credits_killer_and_team() {
        let mut ledger = tdm_ledger();
        assert!(ledger.record_death(CombatantId(1), Some(CombatantId(0))));

        let killer = ledger.record(CombatantId(0)).unwrap();
        assert_eq!((killer.kills, killer.score), (1, 100));
        assert_eq!(ledger.record(CombatantId(1)).unwrap().deaths, 1);
        assert_eq!(ledger.team_score(Team::Red), 1);
        assert_eq!(ledger.team_score(Team::Blue), 0);
    }

    #[test]
    fn self_and_unattributed_deaths_credit_nobody() {
        let mut ledger = tdm_ledger();
        ledger.record_death(CombatantId(2), Some(CombatantId(2)));
        ledger.record_death(CombatantId(3), None);

        assert_eq!(ledger.total_deaths(), 2);
        assert_eq!(ledger.total_kills(), 0);
        assert_eq!(ledger.team_score(Team::Red), 0);
    }

    #[test]
    fn teamkills_credit_nobody() {
        let mut ledger = tdm_ledger();
        // 0 and 2 are both Red
        assert!(ledger.record_death(CombatantId(2), Some(CombatantId(0))));

        assert_eq!(ledger.record(CombatantId(2)).unwrap().deaths, 1);
        assert_eq!(ledger.kills(CombatantId(0)), 0);
        assert_eq!(ledger.team_score(Team::Red), 0);
    }

    #[test]
    fn unknown_victim_is_ignored() {
        let mut ledger = tdm_ledger();
        assert!(!ledger.record_death(CombatantId(99), Some(CombatantId(0))));
        assert_eq!(ledger.total_deaths(), 0);
        assert_eq!(ledger.kills(CombatantId(0)), 0);
    }

    #[test]
    fn team_score_matches_member_kills() {
        let mut ledger = tdm_ledger();
        let deaths = [(1, 0), (3, 2), (0, 1), (2, 3), (1, 2)];
        for (victim, killer) in deaths {
            ledger.record_death(CombatantId(victim), Some(CombatantId(killer)));
        }

        for team in [Team::Red, Team::Blue] {
            let member_kills: u32 = ledger
                .records()
                .filter(|(_, r)| r.team == Some(team))
                .map(|(_, r)| r.kills)
                .sum();
            assert_eq!(ledger.team_score(team), member_kills);
        }
        assert_eq!(ledger.total_kills(), ledger.total_deaths());
    }

    #[test]
    fn free_for_all_has_no_team_scores() {
        let ledger = ScoringLedger::new(100, false);
        assert!(ledger.team_scores().is_empty());
    }
}
