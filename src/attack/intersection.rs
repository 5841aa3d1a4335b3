//! Intersection attack over observation windows.
//!
//! Every GET request sent by the target client opens a window lasting
//! `max_msg_delivery_time`. Servers that receive a message while the window
//! is open are added to it. Closed windows are intersected into a running
//! candidate set; the attack completes once that set has exactly as many
//! servers as there are targets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use super::events::{AttackEvent, AttackEventSink, LogSink};
use super::{Adversary, AdversaryTimer, AttackContext, AttackError, AttackResult, CompletionSignal};
use crate::sim::message::{Message, NodeId, ServerId};
use crate::sim::scheduler::{SimTime, TimerHandle};

#[derive(Debug, Clone, Copy)]
struct WindowKey {
    end_time: SimTime,
    start_time: SimTime,
    seq: u64,
}

impl PartialEq for WindowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WindowKey {}

impl PartialOrd for WindowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WindowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end_time
            .total_cmp(&other.end_time)
            .then_with(|| self.start_time.total_cmp(&other.start_time))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Servers seen receiving while one target request may still be in flight
#[derive(Debug, Clone, Default)]
pub struct AttackWindow {
    /// Time the target client sent its request
    pub start_time: SimTime,
    /// `start_time + max_msg_delivery_time`, exclusive
    pub end_time: SimTime,
    pub candidate_set: BTreeSet<ServerId>,
}

impl AttackWindow {
    fn contains(&self, time: SimTime) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

/// Adversary intersecting the receiving servers of every observation window
#[derive(Debug)]
pub struct IntersectionAttack<S: AttackEventSink = LogSink> {
    max_msg_delivery_time: f64,
    num_target_servers: usize,
    windows: BTreeMap<WindowKey, AttackWindow>,
    next_seq: u64,
    wake: Option<(TimerHandle, SimTime)>,
    candidate_set: Option<BTreeSet<ServerId>>,
    windows_closed: u64,
    resets: u64,
    signal: CompletionSignal,
    sink: S,
}

impl IntersectionAttack<LogSink> {
    /// Attack that reports its events through the `log` facade
    pub fn new(max_msg_delivery_time: f64, num_target_servers: usize) -> Result<Self, AttackError> {
        Self::with_sink(max_msg_delivery_time, num_target_servers, LogSink)
    }
}

impl<S: AttackEventSink> IntersectionAttack<S> {
    /// Attack reporting to `sink`
    pub fn with_sink(max_msg_delivery_time: f64, num_target_servers: usize, sink: S) -> Result<Self, AttackError> {
        if !(max_msg_delivery_time.is_finite() && max_msg_delivery_time > 0.0) {
            return Err(AttackError::InvariantViolation(format!(
                "max_msg_delivery_time must be finite and positive, got {}",
                max_msg_delivery_time
            )));
        }
        if num_target_servers == 0 {
            return Err(AttackError::InvariantViolation(
                "intersection attack needs at least one target server".to_string(),
            ));
        }

        Ok(Self {
            max_msg_delivery_time,
            num_target_servers,
            windows: BTreeMap::new(),
            next_seq: 0,
            wake: None,
            candidate_set: None,
            windows_closed: 0,
            resets: 0,
            signal: CompletionSignal::default(),
            sink,
        })
    }

    /// Current running intersection, `None` before the first window closed
    /// (or right after a reset).
    pub fn candidate_set(&self) -> Option<&BTreeSet<ServerId>> {
        self.candidate_set.as_ref()
    }

    /// Windows not yet closed
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    /// Windows folded into the intersection so far
    pub fn windows_closed(&self) -> u64 {
        self.windows_closed
    }

    /// Times the intersection shrank below the number of targets
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Event sink the attack reports to
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn rearm(&mut self, ctx: &mut AttackContext<'_>) {
        let Some(next_end) = self.windows.keys().next().map(|key| key.end_time) else {
            return;
        };
        if let Some((handle, armed_at)) = self.wake {
            if armed_at <= next_end {
                return;
            }
            ctx.timers.cancel(handle);
        }
        let handle = ctx.timers.schedule_at(next_end, AdversaryTimer::WindowClose);
        self.wake = Some((handle, next_end));
    }

    fn close_due_window(&mut self, now: SimTime) {
        let Some(entry) = self.windows.first_entry() else {
            return;
        };
        if entry.key().end_time > now {
            return;
        }
        let window = entry.remove();
        self.windows_closed += 1;

        let intersection: BTreeSet<ServerId> = match self.candidate_set.take() {
            None => window.candidate_set.clone(),
            Some(current) => current.intersection(&window.candidate_set).copied().collect(),
        };
        self.sink.log(
            now,
            AttackEvent::WindowClosed {
                num_candidates: window.candidate_set.len(),
                intersection_size: intersection.len(),
            },
        );

        match intersection.len().cmp(&self.num_target_servers) {
            Ordering::Equal => {
                if self.signal.fire(now) {
                    self.sink.log(
                        now,
                        AttackEvent::AttackCompleted {
                            target_servers: intersection.clone(),
                            rounds: self.windows_closed,
                        },
                    );
                }
                self.candidate_set = Some(intersection);
            }
            Ordering::Less => {
                self.resets += 1;
                self.sink.log(now, AttackEvent::IntersectionReset { resets: self.resets });
                self.candidate_set = None;
            }
            Ordering::Greater => self.candidate_set = Some(intersection),
        }
    }
}

impl<S: AttackEventSink> Adversary for IntersectionAttack<S> {
    fn name(&self) -> &'static str {
        "intersection"
    }

    fn client_sent_msg(&mut self, _message: &Message, ctx: &mut AttackContext<'_>) {
        if self.signal.is_fired() {
            return;
        }
        let now = ctx.now();
        let end_time = now + self.max_msg_delivery_time;
        let key = WindowKey {
            end_time,
            start_time: now,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        self.windows.insert(
            key,
            AttackWindow {
                start_time: now,
                end_time,
                candidate_set: BTreeSet::new(),
            },
        );
        self.sink.log(now, AttackEvent::WindowOpened { end_time });
        self.rearm(ctx);
    }

    fn server_recved_msg(&mut self, message: &Message, ctx: &mut AttackContext<'_>) {
        if self.signal.is_fired() {
            return;
        }
        let NodeId::Server(server) = message.destination else {
            return;
        };
        let now = ctx.now();
        for window in self.windows.values_mut().filter(|window| window.contains(now)) {
            window.candidate_set.insert(server);
        }
    }

    fn on_timer(&mut self, timer: AdversaryTimer, ctx: &mut AttackContext<'_>) -> Result<(), AttackError> {
        if timer != AdversaryTimer::WindowClose {
            return Ok(());
        }
        self.wake = None;
        if self.signal.is_fired() {
            return Ok(());
        }
        self.close_due_window(ctx.now());
        if !self.signal.is_fired() {
            self.rearm(ctx);
        }
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.signal.is_fired()
    }

    fn result(&self, stop_time: SimTime) -> AttackResult {
        let target_server_set = if self.signal.is_fired() {
            self.candidate_set.clone()
        } else {
            None
        };
        AttackResult {
            target_server_set,
            completion_time: self.signal.fired_at().unwrap_or(stop_time),
            rounds_collected: self.windows_closed,
        }
    }
}
