//! Per-board queue of scheduled continuations.
//!
//! Timed effects ("revert this flag after N seconds") are modeled as entries
//! in a queue that the board drains once per tick, before entities are
//! ticked. Entries are keyed by [`TimerId`], so cancelling one entry never
//! touches another entry scheduled for the same entity.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

/// Handle returned when scheduling a continuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Ordered set of continuations due at points in simulated time.
#[derive(Clone, Debug)]
pub struct TimerQueue<T> {
    now: Duration,
    next_id: u64,
    entries: BTreeMap<(Duration, TimerId), T>,
    due_at: HashMap<TimerId, Duration>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            entries: BTreeMap::new(),
            due_at: HashMap::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    /// Creates an empty queue at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time the queue has advanced to.
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Number of pending continuations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether no continuation is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reports whether the continuation is still pending.
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_at.contains_key(&id)
    }

    /// Schedules `payload` to fire once `delay` of simulated time has elapsed.
    pub fn schedule(&mut self, delay: Duration, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let due = self.now.saturating_add(delay);
        let _ = self.entries.insert((due, id), payload);
        let _ = self.due_at.insert(id, due);
        id
    }

    /// Cancels a pending continuation, returning its payload.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let due = self.due_at.remove(&id)?;
        self.entries.remove(&(due, id))
    }

    /// Advances simulated time and drains every continuation now due.
    ///
    /// Continuations fire in due order; ties fire in scheduling order.
    pub fn advance(&mut self, dt: Duration) -> Vec<(TimerId, T)> {
        self.now = self.now.saturating_add(dt);
        let mut fired = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            let (due, id) = *entry.key();
            if due > self.now {
                break;
            }
            let payload = entry.remove();
            let _ = self.due_at.remove(&id);
            fired.push((id, payload));
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_order() {
        let mut queue = TimerQueue::new();
        let _ = queue.schedule(Duration::from_secs(3), "late");
        let _ = queue.schedule(Duration::from_secs(1), "early");
        let _ = queue.schedule(Duration::from_secs(1), "early-second");

        assert!(queue.advance(Duration::from_millis(500)).is_empty());
        let fired: Vec<_> = queue
            .advance(Duration::from_secs(1))
            .into_iter()
            .map(|(_, payload)| payload)
            .collect();
        assert_eq!(fired, vec!["early", "early-second"]);
        assert_eq!(queue.len(), 1);

        let fired = queue.advance(Duration::from_secs(2));
        assert_eq!(fired.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancel_only_affects_one_continuation() {
        let mut queue = TimerQueue::new();
        let first = queue.schedule(Duration::from_secs(1), 1);
        let second = queue.schedule(Duration::from_secs(1), 2);

        assert_eq!(queue.cancel(first), Some(1));
        assert_eq!(queue.cancel(first), None);
        assert!(queue.is_pending(second));

        let fired = queue.advance(Duration::from_secs(1));
        assert_eq!(fired, vec![(second, 2)]);
    }

    #[test]
    fn delay_is_relative_to_current_time() {
        let mut queue = TimerQueue::new();
        let _ = queue.advance(Duration::from_secs(10));
        let id = queue.schedule(Duration::from_secs(2), ());
        assert!(queue.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(queue.advance(Duration::from_secs(1)), vec![(id, ())]);
        assert_eq!(queue.now(), Duration::from_secs(12));
    }
}
