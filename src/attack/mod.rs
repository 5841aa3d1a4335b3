//! Passive adversaries observing message flow.
//!
//! An adversary is driven entirely by hooks called from the simulated
//! network. It may schedule its own timers through [`AttackTimers`]; those
//! come back as [`AdversaryTimer`] events via [`Adversary::on_timer`].

pub mod baseline;
pub mod clustering;
pub mod disclosure;
pub mod events;
pub mod intersection;
pub mod send_log;
pub mod stats;
pub mod strategy;

use std::collections::{BTreeMap, BTreeSet};

use rand::RngCore;
use serde::Serialize;

use crate::sim::message::{Message, ServerId};
use crate::sim::scheduler::{Scheduler, SimTime, TimerHandle};

pub use disclosure::{AttackPhase, DisclosureAttack};
pub use events::{AttackEvent, AttackEventSink, LogSink, NoOpSink, RecordingSink};
pub use intersection::IntersectionAttack;
pub use strategy::{CompletionStrategy, StrategyConfig};

#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Timers an adversary can arm for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdversaryTimer {
    BaselineSample,
    WindowClose,
}

/// The slice of the scheduler an adversary is allowed to use
pub trait AttackTimers {
    fn now(&self) -> SimTime;
    fn schedule_at(&mut self, time: SimTime, timer: AdversaryTimer) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

impl<E: From<AdversaryTimer>> AttackTimers for Scheduler<E> {
    fn now(&self) -> SimTime {
        Scheduler::now(self)
    }

    fn schedule_at(&mut self, time: SimTime, timer: AdversaryTimer) -> TimerHandle {
        Scheduler::schedule_at(self, time, E::from(timer))
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        Scheduler::cancel(self, handle)
    }
}

pub struct AttackContext<'a> {
    pub timers: &'a mut dyn AttackTimers,
    pub rng: &'a mut dyn RngCore,
}

impl<'a> AttackContext<'a> {
    pub fn new(timers: &'a mut dyn AttackTimers, rng: &'a mut dyn RngCore) -> Self {
        Self { timers, rng }
    }

    pub fn now(&self) -> SimTime {
        self.timers.now()
    }
}

/// Outcome of one replica's attack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackResult {
    pub target_server_set: Option<BTreeSet<ServerId>>,
    pub completion_time: SimTime,
    pub rounds_collected: u64,
}

/// One-shot completion signal
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletionSignal {
    fired_at: Option<SimTime>,
}

impl CompletionSignal {
    /// Fire the signal. Returns false if it had already fired.
    pub fn fire(&mut self, now: SimTime) -> bool {
        if self.fired_at.is_some() {
            return false;
        }
        self.fired_at = Some(now);
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired_at.is_some()
    }

    pub fn fired_at(&self) -> Option<SimTime> {
        self.fired_at
    }
}

pub trait Adversary {
    fn name(&self) -> &'static str;

    fn start(&mut self, _ctx: &mut AttackContext<'_>) -> Result<(), AttackError> {
        Ok(())
    }

    fn client_sent_msg(&mut self, _message: &Message, _ctx: &mut AttackContext<'_>) {}

    fn server_recved_msg(&mut self, _message: &Message, _ctx: &mut AttackContext<'_>) {}

    fn server_sent_msg(&mut self, _message: &Message, _ctx: &mut AttackContext<'_>) {}

    fn client_completed_get_request(
        &mut self,
        _num_msgs_recved: u32,
        _ctx: &mut AttackContext<'_>,
    ) -> Result<(), AttackError> {
        Ok(())
    }

    fn on_timer(&mut self, _timer: AdversaryTimer, _ctx: &mut AttackContext<'_>) -> Result<(), AttackError> {
        Ok(())
    }

    fn is_completed(&self) -> bool;

    /// Result as of `stop_time`, the virtual time the run loop stopped at.
    fn result(&self, stop_time: SimTime) -> AttackResult;

    /// Per-server signal strengths, for adversaries that compute them
    fn signals(&self) -> Option<BTreeMap<ServerId, f64>> {
        None
    }
}
