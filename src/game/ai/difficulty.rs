//! Agent difficulty tiers

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Easy,
    Normal,
    Hard,
    Elite,
}

impl Default for DifficultyTier {
    fn default() -> Self {
        Self::Normal
    }
}

/// Perception and pacing for one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub sight_range: f32,
    pub attack_range: f32,
    /// Seconds between two decisions
    pub decision_interval: f32,
    /// Fraction of the class walking speed the agent moves at
    pub move_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyTable {
    pub easy: DifficultyProfile,
    pub normal: DifficultyProfile,
    pub hard: DifficultyProfile,
    pub elite: DifficultyProfile,
}

impl DifficultyTable {
    pub fn profile(&self, tier: DifficultyTier) -> &DifficultyProfile {
        match tier {
            DifficultyTier::Easy => &self.easy,
            DifficultyTier::Normal => &self.normal,
            DifficultyTier::Hard => &self.hard,
            DifficultyTier::Elite => &self.elite,
        }
    }
}

impl Default for DifficultyTable {
    fn default() -> Self {
        Self {
            easy: DifficultyProfile {
                sight_range: 30.0,
                attack_range: 20.0,
                decision_interval: 1.0,
                move_speed: 0.6,
            },
            normal: DifficultyProfile {
                sight_range: 40.0,
                attack_range: 25.0,
                decision_interval: 0.6,
                move_speed: 0.75,
            },
            hard: DifficultyProfile {
                sight_range: 50.0,
                attack_range: 30.0,
                decision_interval: 0.4,
                move_speed: 0.9,
            },
            elite: DifficultyProfile {
                sight_range: 60.0,
                attack_range: 35.0,
                decision_interval: 0.25,
                move_speed: 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harder_tiers_see_further_and_think_faster() {
        let table = DifficultyTable::default();
        let tiers = [
            DifficultyTier::Easy,
            DifficultyTier::Normal,
            DifficultyTier::Hard,
            DifficultyTier::Elite,
        ];
        for pair in tiers.windows(2) {
            let (a, b) = (table.profile(pair[0]), table.profile(pair[1]));
            assert!(b.sight_range > a.sight_range);
            assert!(b.decision_interval < a.decision_interval);
            assert!(b.move_speed > a.move_speed);
        }
    }
}
