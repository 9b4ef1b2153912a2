//! Dynamic queue subscription: a worker calls `update` at startup and
//! whenever its valid tier set changes, telling the sync plane which
//! queues to poll and at what priority.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::task::WORKER_QUEUE_PRIORITY;

/// The queues a single worker process currently polls, by priority.
/// Priority convention: `worker=1`; all tier-named queues > 1. Lower
/// numbers are drained first.
#[derive(Default)]
pub struct QueueSubscription {
    priorities: RwLock<HashMap<String, u32>>,
}

impl QueueSubscription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the subscribed queue set with `tiers`, always including the
    /// fixed `worker` queue at priority 1 regardless of what's passed in.
    pub fn update(&self, tiers: HashMap<String, u32>) {
        let mut priorities = self.priorities.write().expect("queue subscription poisoned");
        *priorities = tiers;
        priorities.insert("worker".to_string(), WORKER_QUEUE_PRIORITY);
    }

    /// Returns the currently subscribed queues ordered by ascending
    /// priority (lowest polled first).
    #[must_use]
    pub fn ordered_queues(&self) -> Vec<String> {
        let priorities = self.priorities.read().expect("queue subscription poisoned");
        let mut queues: Vec<(String, u32)> = priorities.iter().map(|(q, p)| (q.clone(), *p)).collect();
        queues.sort_by_key(|(_, priority)| *priority);
        queues.into_iter().map(|(queue, _)| queue).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_queue_is_always_present_at_priority_one() {
        let sub = QueueSubscription::new();
        sub.update(HashMap::new());
        assert_eq!(sub.ordered_queues(), vec!["worker".to_string()]);
    }

    #[test]
    fn tier_queues_are_ordered_by_priority() {
        let sub = QueueSubscription::new();
        sub.update(HashMap::from([("c-small".to_string(), 2), ("gn-large".to_string(), 3)]));
        assert_eq!(
            sub.ordered_queues(),
            vec!["worker".to_string(), "c-small".to_string(), "gn-large".to_string()]
        );
    }

    #[test]
    fn a_later_update_replaces_the_earlier_tier_set() {
        let sub = QueueSubscription::new();
        sub.update(HashMap::from([("c-small".to_string(), 2)]));
        sub.update(HashMap::from([("gn-large".to_string(), 2)]));
        let queues = sub.ordered_queues();
        assert!(queues.contains(&"gn-large".to_string()));
        assert!(!queues.contains(&"c-small".to_string()));
    }
}
