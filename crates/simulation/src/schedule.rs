//! The virtual-clock event queue.

use crate::queue::{EventKey, TaskId};
use std::collections::BTreeMap;
use std::time::Duration;

/// Ordered event queue plus the virtual clock and per-task busy cursors.
///
/// Drivers push events at absolute virtual times and pop them in
/// [`EventKey`] order; popping advances `now`. A task that performs work
/// with a modelled cost records it through [`charge`](Self::charge), and
/// later events for that task are not handed out before the task is free
/// again; the driver re-schedules them at the busy horizon.
#[derive(Debug)]
pub struct Schedule<E> {
    queue: BTreeMap<EventKey, E>,
    busy_until: Vec<Duration>,
    now: Duration,
    seq: u64,
}

impl<E> Schedule<E> {
    pub fn new(num_tasks: usize) -> Self {
        Self {
            queue: BTreeMap::new(),
            busy_until: vec![Duration::ZERO; num_tasks],
            now: Duration::ZERO,
            seq: 0,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Outstanding event count.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Schedule `event` for `task` at absolute virtual time `at`.
    ///
    /// Times in the past are clamped to `now`; insertion order is the
    /// deterministic tiebreaker for equal times.
    pub fn push(&mut self, task: TaskId, at: Duration, event: E) -> EventKey {
        self.seq += 1;
        let key = EventKey {
            time: at.max(self.now),
            task,
            seq: self.seq,
        };
        self.queue.insert(key, event);
        key
    }

    /// Pop the next event, advancing the virtual clock to its time.
    ///
    /// If the owning task is still busy at the event's time, the event is
    /// deferred to the task's busy horizon instead of being returned; the
    /// caller just polls again. This is how `DelayedComp` costs manifest as
    /// serialised per-task work.
    pub fn pop(&mut self) -> Option<(EventKey, E)> {
        self.pop_before(Duration::MAX)
    }

    /// Like [`pop`](Self::pop), but leaves events beyond `bound` queued and
    /// returns `None` once the head of the queue is past it.
    pub fn pop_before(&mut self, bound: Duration) -> Option<(EventKey, E)> {
        loop {
            let (&key, _) = self.queue.first_key_value()?;
            let free_at = self.busy_until[key.task as usize];
            if key.time < free_at {
                let event = self.queue.remove(&key).expect("head entry exists");
                self.seq += 1;
                let deferred = EventKey {
                    time: free_at,
                    task: key.task,
                    seq: self.seq,
                };
                self.queue.insert(deferred, event);
                continue;
            }
            if key.time > bound {
                return None;
            }
            let event = self.queue.remove(&key).expect("head entry exists");
            debug_assert!(key.time >= self.now, "virtual time must not run backwards");
            self.now = key.time;
            return Some((key, event));
        }
    }

    /// Mark `task` busy for `cost` starting at the current time.
    ///
    /// Returns the instant the work completes; effects of the handled event
    /// (sends, traces, state visibility) belong at that instant.
    pub fn charge(&mut self, task: TaskId, cost: Duration) -> Duration {
        let done = self.now + cost;
        let slot = &mut self.busy_until[task as usize];
        *slot = (*slot).max(done);
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_advances_clock_in_order() {
        let mut sched: Schedule<&str> = Schedule::new(2);
        sched.push(1, Duration::from_millis(5), "b");
        sched.push(0, Duration::from_millis(2), "a");
        sched.push(0, Duration::from_millis(9), "c");

        assert_eq!(sched.pop().unwrap().1, "a");
        assert_eq!(sched.now(), Duration::from_millis(2));
        assert_eq!(sched.pop().unwrap().1, "b");
        assert_eq!(sched.pop().unwrap().1, "c");
        assert_eq!(sched.now(), Duration::from_millis(9));
        assert!(sched.pop().is_none());
    }

    #[test]
    fn busy_task_defers_events() {
        let mut sched: Schedule<&str> = Schedule::new(1);
        sched.push(0, Duration::from_millis(1), "first");
        sched.push(0, Duration::from_millis(2), "second");

        let (_, first) = sched.pop().unwrap();
        assert_eq!(first, "first");
        // Handling "first" costs 5ms; "second" must not fire before 6ms.
        sched.charge(0, Duration::from_millis(5));

        let (key, second) = sched.pop().unwrap();
        assert_eq!(second, "second");
        assert_eq!(key.time, Duration::from_millis(6));
    }

    #[test]
    fn past_times_clamp_to_now() {
        let mut sched: Schedule<&str> = Schedule::new(1);
        sched.push(0, Duration::from_millis(4), "a");
        sched.pop().unwrap();
        let key = sched.push(0, Duration::from_millis(1), "late");
        assert_eq!(key.time, Duration::from_millis(4));
    }
}
