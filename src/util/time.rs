//! Time utilities for the fixed-step simulation

use std::time::{Duration, Instant};

/// Default simulation rate
pub const DEFAULT_SIMULATION_TPS: u32 = 30; // 30 ticks per second
/// Default presentation snapshot rate
pub const DEFAULT_SNAPSHOT_TPS: u32 = 10; // 10 snapshots per second

/// The simulation's fixed clock. Every countdown in the core is expressed in
/// seconds and advanced by [`TickClock::delta`] once per tick; scheduled
/// events are keyed by tick number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickClock {
    tps: u32,
}

impl TickClock {
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            tps: ticks_per_second.max(1),
        }
    }

    pub fn tps(&self) -> u32 {
        self.tps
    }

    /// Delta time of one tick (in seconds)
    pub fn delta(&self) -> f32 {
        1.0 / self.tps as f32
    }

    /// Number of whole ticks covering `seconds` (rounded up)
    pub fn ticks_for(&self, seconds: f32) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.tps as f32).ceil() as u64
    }

    pub fn seconds_for(&self, ticks: u64) -> f32 {
        ticks as f32 / self.tps as f32
    }

    /// Wall-clock duration of one tick, for the async driver
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tps as u64)
    }

    /// Ticks between two presentation snapshots
    pub fn snapshot_interval(&self, snapshot_tps: u32) -> u32 {
        (self.tps / snapshot_tps.max(1)).max(1)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATION_TPS)
    }
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_round_up() {
        let clock = TickClock::new(30);
        assert_eq!(clock.ticks_for(3.0), 90);
        assert_eq!(clock.ticks_for(0.01), 1);
        assert_eq!(clock.ticks_for(0.0), 0);
        assert_eq!(clock.ticks_for(f32::NAN), 0);
    }

    #[test]
    fn zero_rate_is_clamped() {
        let clock = TickClock::new(0);
        assert_eq!(clock.tps(), 1);
        assert_eq!(clock.snapshot_interval(0), 1);
    }

    #[test]
    fn snapshot_interval_divides_rate() {
        let clock = TickClock::new(30);
        assert_eq!(clock.snapshot_interval(10), 3);
        assert_eq!(clock.snapshot_interval(60), 1);
    }
}
