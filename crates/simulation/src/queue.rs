//! Event keys with deterministic total ordering.

use std::cmp::Ordering;
use std::time::Duration;

/// Identifies a cooperative task within one simulation.
pub type TaskId = u32;

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Virtual time (earlier first)
/// 2. Task id (deterministic ordering across tasks)
/// 3. Sequence number (FIFO for the same time and task)
///
/// Two runs that schedule the same events in the same order therefore pop
/// them in the same order, which is what makes traces reproducible.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event fires.
    pub time: Duration,
    /// Which task receives it.
    pub task: TaskId,
    /// Insertion order tiebreaker.
    pub seq: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.task.cmp(&other.task) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.seq.cmp(&other.seq)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_dominates() {
        let earlier = EventKey {
            time: Duration::from_millis(1),
            task: 9,
            seq: 9,
        };
        let later = EventKey {
            time: Duration::from_millis(2),
            task: 0,
            seq: 0,
        };
        assert!(earlier < later);
    }

    #[test]
    fn task_breaks_time_ties() {
        let a = EventKey {
            time: Duration::from_millis(1),
            task: 0,
            seq: 5,
        };
        let b = EventKey {
            time: Duration::from_millis(1),
            task: 1,
            seq: 1,
        };
        assert!(a < b, "lower task id fires first at equal times");
    }

    #[test]
    fn sequence_preserves_fifo() {
        let a = EventKey {
            time: Duration::from_millis(1),
            task: 2,
            seq: 1,
        };
        let b = EventKey {
            time: Duration::from_millis(1),
            task: 2,
            seq: 2,
        };
        assert!(a < b);
    }
}
