//! Tick-keyed queue of delayed simulation events

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::protocol::CombatantId;

/// Work deferred to a later tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEvent {
    /// Staggered initial spawn of roster entry `index`
    Spawn { index: usize },
    Respawn { id: CombatantId },
    /// Shield bonus for life `life` of `id` runs out
    ShieldExpired { id: CombatantId, life: u32 },
    OverchargeExpired { id: CombatantId, life: u32 },
    ReturnToLobby,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    due: u64,
    seq: u64,
    event: ScheduledEvent,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Events due on the same tick come out in insertion order.
#[derive(Debug, Default)]
pub struct Schedule {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due: u64, event: ScheduledEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { due, seq, event }));
    }

    /// Remove and return every event due at or before `tick`
    pub fn pop_due(&mut self, tick: u64) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due > tick {
                break;
            }
            due.push(entry.event);
            self.queue.pop();
        }
        due
    }

    /// Drop everything pending
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, event: &ScheduledEvent) -> bool {
        self.queue.iter().any(|Reverse(e)| &e.event == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_come_out_by_tick_then_insertion() {
        let mut schedule = Schedule::new();
        schedule.push(5, ScheduledEvent::ReturnToLobby);
        schedule.push(3, ScheduledEvent::Respawn { id: CombatantId(2) });
        schedule.push(3, ScheduledEvent::Respawn { id: CombatantId(1) });

        assert!(schedule.pop_due(2).is_empty());
        assert_eq!(
            schedule.pop_due(4),
            vec![
                ScheduledEvent::Respawn { id: CombatantId(2) },
                ScheduledEvent::Respawn { id: CombatantId(1) },
            ]
        );
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.pop_due(100), vec![ScheduledEvent::ReturnToLobby]);
        assert!(schedule.is_empty());
    }

    #[test]
    fn clear_discards_pending_work() {
        let mut schedule = Schedule::new();
        schedule.push(1, ScheduledEvent::Spawn { index: 0 });
        assert!(schedule.contains(&ScheduledEvent::Spawn { index: 0 }));
        schedule.clear();
        assert!(schedule.pop_due(10).is_empty());
    }
}
