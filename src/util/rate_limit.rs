//! Rate limiting for intent submission

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::protocol::CombatantId;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Per-combatant intent limiter. Input layers submit at most one intent per
/// tick; anything beyond twice the tick rate is dropped before it reaches the
/// match task.
pub struct IntentRateLimiter {
    per_second: u32,
    limiters: DashMap<CombatantId, Arc<Limiter>>,
}

impl IntentRateLimiter {
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second,
            limiters: DashMap::new(),
        }
    }

    /// Check if an intent from `id` is allowed (returns true if allowed)
    pub fn check(&self, id: CombatantId) -> bool {
        let limiter = self
            .limiters
            .entry(id)
            .or_insert_with(|| create_limiter(self.per_second))
            .clone();
        limiter.check().is_ok()
    }

    /// Forget all per-combatant state (used when a match returns to lobby)
    pub fn reset(&self) {
        self.limiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_rejected() {
        let limiter = IntentRateLimiter::new(2);
        let id = CombatantId(0);
        assert!(limiter.check(id));
        assert!(limiter.check(id));
        assert!(!limiter.check(id));
        // other combatants have their own budget
        assert!(limiter.check(CombatantId(1)));
    }
}
