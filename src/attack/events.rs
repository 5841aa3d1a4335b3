//! Structured events emitted by the attack state machines.
//!
//! The engines never log directly. They hand every notable step to an
//! injected [`AttackEventSink`]; [`LogSink`] forwards to the `log` facade and
//! [`RecordingSink`] keeps everything in memory for inspection.

use std::collections::BTreeSet;

use log::{debug, info, trace};

use crate::sim::message::ServerId;
use crate::sim::scheduler::SimTime;

#[derive(Debug, Clone, PartialEq)]
pub enum AttackEvent {
    /// A round's candidate set was folded into the statistics
    RoundCompleted { round: u64, num_candidates: usize },
    /// The target client completed a request but no server qualified
    RoundSkipped { num_msgs_recved: u32 },
    BaselineSampled { sample: u64, num_candidates: usize },
    BaselineSkipped,
    WindowOpened { end_time: SimTime },
    WindowClosed {
        num_candidates: usize,
        intersection_size: usize,
    },
    /// The running intersection dropped below the number of targets
    IntersectionReset { resets: u64 },
    AttackCompleted {
        target_servers: BTreeSet<ServerId>,
        rounds: u64,
    },
}

pub trait AttackEventSink {
    fn log(&mut self, time: SimTime, event: AttackEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl AttackEventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: SimTime, _event: AttackEvent) {}
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AttackEventSink for LogSink {
    fn log(&mut self, time: SimTime, event: AttackEvent) {
        match event {
            AttackEvent::RoundCompleted { round, num_candidates } => {
                debug!("t={:.3} round {} folded {} candidates", time, round, num_candidates);
            }
            AttackEvent::RoundSkipped { num_msgs_recved } => {
                debug!("t={:.3} skipping round with empty candidate set (k={})", time, num_msgs_recved);
            }
            AttackEvent::BaselineSampled { sample, num_candidates } => {
                trace!("t={:.3} baseline sample {} with {} candidates", time, sample, num_candidates);
            }
            AttackEvent::BaselineSkipped => {
                trace!("t={:.3} skipping empty baseline sample", time);
            }
            AttackEvent::WindowOpened { end_time } => {
                trace!("t={:.3} attack window opened until {:.3}", time, end_time);
            }
            AttackEvent::WindowClosed {
                num_candidates,
                intersection_size,
            } => {
                debug!(
                    "t={:.3} window closed with {} candidates, intersection size {}",
                    time, num_candidates, intersection_size
                );
            }
            AttackEvent::IntersectionReset { resets } => {
                debug!("t={:.3} intersection overshot, reset #{}", time, resets);
            }
            AttackEvent::AttackCompleted { target_servers, rounds } => {
                let names: Vec<String> = target_servers.iter().map(ToString::to_string).collect();
                info!("t={:.3} attack completed after {} rounds: {{{}}}", time, rounds, names.join(", "));
            }
        }
    }
}

/// Keeps every event, in order
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<(SimTime, AttackEvent)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(SimTime, AttackEvent)] {
        &self.events
    }

    pub fn count(&self, predicate: impl Fn(&AttackEvent) -> bool) -> usize {
        self.events.iter().filter(|(_, event)| predicate(event)).count()
    }
}

impl AttackEventSink for RecordingSink {
    fn log(&mut self, time: SimTime, event: AttackEvent) {
        self.events.push((time, event));
    }
}
