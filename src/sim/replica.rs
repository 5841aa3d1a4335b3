//! One independent simulation run.

use std::collections::BTreeMap;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::message::ServerId;
use super::scheduler::Scheduler;
use super::{Scenario, SimError, SimEvent};
use crate::attack::{Adversary, AttackContext, AttackResult};

/// Optional limits on how long a replica may run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Stop before the first event later than this virtual time
    #[serde(default)]
    pub max_time: Option<f64>,
    /// Stop after this many processed events
    #[serde(default)]
    pub max_events: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    TimeLimit,
    EventLimit,
    /// No events left to run
    Drained,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicaOutcome {
    pub seed: u64,
    pub result: AttackResult,
    pub signals: Option<BTreeMap<ServerId, f64>>,
    pub events_processed: u64,
    pub stop_reason: StopReason,
}

impl ReplicaOutcome {
    pub fn is_completed(&self) -> bool {
        self.stop_reason == StopReason::Completed
    }
}

pub struct Replica {
    seed: u64,
    scheduler: Scheduler<SimEvent>,
    rng: StdRng,
    scenario: Box<dyn Scenario>,
    adversary: Box<dyn Adversary>,
    limits: RunLimits,
}

impl Replica {
    pub fn new(seed: u64, scenario: Box<dyn Scenario>, adversary: Box<dyn Adversary>, limits: RunLimits) -> Self {
        Self {
            seed,
            scheduler: Scheduler::new(),
            rng: StdRng::seed_from_u64(seed),
            scenario,
            adversary,
            limits,
        }
    }

    /// Run until the adversary completes, a limit is hit, or nothing is left to do.
    pub fn run(mut self) -> Result<ReplicaOutcome, SimError> {
        debug!(
            "replica {}: {} scenario, {} adversary",
            self.seed,
            self.scenario.name(),
            self.adversary.name()
        );

        {
            let mut ctx = AttackContext::new(&mut self.scheduler, &mut self.rng);
            self.adversary.start(&mut ctx)?;
        }
        self.scenario
            .start(&mut self.scheduler, &mut self.rng, self.adversary.as_mut())?;

        let stop_reason = loop {
            if self.adversary.is_completed() {
                break StopReason::Completed;
            }
            if self
                .limits
                .max_events
                .is_some_and(|max| self.scheduler.events_processed() >= max)
            {
                break StopReason::EventLimit;
            }
            let Some(next) = self.scheduler.peek_time() else {
                break StopReason::Drained;
            };
            if self.limits.max_time.is_some_and(|max| next > max) {
                break StopReason::TimeLimit;
            }

            let Some((time, event)) = self.scheduler.pop() else {
                break StopReason::Drained;
            };
            trace!("t={:.4} {:?}", time, event);

            match event {
                SimEvent::Adversary(timer) => {
                    let mut ctx = AttackContext::new(&mut self.scheduler, &mut self.rng);
                    self.adversary.on_timer(timer, &mut ctx)?;
                }
                other => {
                    self.scenario
                        .handle(other, &mut self.scheduler, &mut self.rng, self.adversary.as_mut())?;
                }
            }
        };

        let stop_time = match (stop_reason, self.limits.max_time) {
            (StopReason::TimeLimit, Some(max)) => max,
            _ => self.scheduler.now(),
        };

        debug!(
            "replica {}: stopped ({:?}) at t={:.3} after {} events",
            self.seed,
            stop_reason,
            stop_time,
            self.scheduler.events_processed()
        );

        Ok(ReplicaOutcome {
            seed: self.seed,
            result: self.adversary.result(stop_time),
            signals: self.adversary.signals(),
            events_processed: self.scheduler.events_processed(),
            stop_reason,
        })
    }
}
