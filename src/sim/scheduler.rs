//! Single-threaded discrete-event scheduler with cancellable timers.
//!
//! Events run in non-decreasing virtual time. Events scheduled for the same
//! instant run in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Virtual time in simulation units
pub type SimTime = f64;

/// Handle returned by [`Scheduler::schedule_at`], used to cancel the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct ScheduledEvent<E> {
    time: SimTime,
    seq: u64,
    event: E,
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, earliest (time, seq) must be on top
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct Scheduler<E> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<ScheduledEvent<E>>,
    live: HashSet<u64>,
    events_processed: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
            events_processed: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `event` at `time`. Times in the past (or NaN) run at `now`.
    pub fn schedule_at(&mut self, time: SimTime, event: E) -> TimerHandle {
        let time = if time >= self.now { time } else { self.now };
        let seq = self.next_seq;
        self.next_seq += 1;

        self.queue.push(ScheduledEvent { time, seq, event });
        self.live.insert(seq);
        TimerHandle(seq)
    }

    pub fn schedule_after(&mut self, delay: SimTime, event: E) -> TimerHandle {
        let delay = if delay > 0.0 { delay } else { 0.0 };
        self.schedule_at(self.now + delay, event)
    }

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle.0)
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.live.contains(&handle.0)
    }

    /// Number of timers that are scheduled and not cancelled
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Time of the next live event, discarding cancelled entries on the way.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        self.drop_cancelled();
        self.queue.peek().map(|scheduled| scheduled.time)
    }

    /// Advance the clock to the next live event and return it.
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        self.drop_cancelled();
        let scheduled = self.queue.pop()?;
        self.live.remove(&scheduled.seq);
        self.now = scheduled.time;
        self.events_processed += 1;
        Some((scheduled.time, scheduled.event))
    }

    fn drop_cancelled(&mut self) {
        while let Some(top) = self.queue.peek() {
            if self.live.contains(&top.seq) {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_run_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(5.0, "c");
        scheduler.schedule_at(1.0, "a");
        scheduler.schedule_at(3.0, "b");

        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop()).collect();
        assert_eq!(order, vec![(1.0, "a"), (3.0, "b"), (5.0, "c")]);
        assert_eq!(scheduler.now(), 5.0);
    }

    #[test]
    fn test_same_time_runs_in_scheduling_order() {
        let mut scheduler = Scheduler::new();
        for i in 0..5 {
            scheduler.schedule_at(2.0, i);
        }
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop()).map(|(_, e)| e).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.schedule_at(1.0, 1);
        scheduler.schedule_at(2.0, 2);

        assert!(scheduler.cancel(first));
        assert!(!scheduler.cancel(first));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.peek_time(), Some(2.0));
        assert_eq!(scheduler.pop(), Some((2.0, 2)));
        assert_eq!(scheduler.pop(), None);
    }

    #[test]
    fn test_past_deadline_runs_now() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(4.0, 0);
        scheduler.pop();

        scheduler.schedule_at(1.0, 1);
        scheduler.schedule_after(-3.0, 2);
        assert_eq!(scheduler.pop(), Some((4.0, 1)));
        assert_eq!(scheduler.pop(), Some((4.0, 2)));
        assert_eq!(scheduler.events_processed(), 3);
    }

    #[test]
    fn test_fired_timer_is_not_pending() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule_after(1.0, ());
        assert!(scheduler.is_pending(handle));
        scheduler.pop();
        assert!(!scheduler.is_pending(handle));
        assert!(!scheduler.cancel(handle));
    }
}
