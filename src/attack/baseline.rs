//! Background sampling of ambient server activity.
//!
//! The inspector wakes up at exponentially distributed intervals, takes the
//! same kind of candidate set an attack round would (with `k = 1`), and folds
//! it into the baseline half of the statistics table.

use rand_distr::{Distribution, Exp};

use super::events::{AttackEvent, AttackEventSink};
use super::send_log::SendLog;
use super::stats::AttackStats;
use super::{AdversaryTimer, AttackContext, AttackError};
use crate::sim::scheduler::TimerHandle;

#[derive(Debug)]
pub struct BaselineInspector {
    max_msg_delivery_time: f64,
    interval: Exp<f64>,
    pending: Option<TimerHandle>,
    skipped: u64,
    stopped: bool,
}

impl BaselineInspector {
    /// Sample at rate `rate_factor / max_msg_delivery_time`.
    pub fn new(max_msg_delivery_time: f64, rate_factor: f64) -> Result<Self, AttackError> {
        if !(max_msg_delivery_time.is_finite() && max_msg_delivery_time > 0.0 && rate_factor > 0.0) {
            return Err(AttackError::InvariantViolation(format!(
                "baseline sampling needs a finite positive max delivery time, got {}",
                max_msg_delivery_time
            )));
        }
        let interval = Exp::new(rate_factor / max_msg_delivery_time).map_err(|e| {
            AttackError::InvariantViolation(format!(
                "baseline rate {}/{} is not usable: {}",
                rate_factor, max_msg_delivery_time, e
            ))
        })?;

        Ok(Self {
            max_msg_delivery_time,
            interval,
            pending: None,
            skipped: 0,
            stopped: false,
        })
    }

    pub fn start(&mut self, ctx: &mut AttackContext<'_>) {
        self.stopped = false;
        self.schedule_next(ctx);
    }

    fn schedule_next(&mut self, ctx: &mut AttackContext<'_>) {
        let wait = self.interval.sample(&mut *ctx.rng);
        let at = ctx.now() + wait;
        self.pending = Some(ctx.timers.schedule_at(at, AdversaryTimer::BaselineSample));
    }

    /// Take one baseline sample and schedule the next.
    pub fn on_sample(
        &mut self,
        send_log: &SendLog,
        stats: &mut AttackStats,
        sink: &mut dyn AttackEventSink,
        ctx: &mut AttackContext<'_>,
    ) {
        self.pending = None;
        if self.stopped {
            return;
        }

        let now = ctx.now();
        let candidates = send_log.candidate_set(now - self.max_msg_delivery_time, 1);
        if candidates.is_empty() {
            self.skipped += 1;
            sink.log(now, AttackEvent::BaselineSkipped);
        } else {
            stats.fold_baseline(&candidates);
            sink.log(
                now,
                AttackEvent::BaselineSampled {
                    sample: stats.baseline_rounds(),
                    num_candidates: candidates.len(),
                },
            );
        }

        self.schedule_next(ctx);
    }

    pub fn stop(&mut self, ctx: &mut AttackContext<'_>) {
        self.stopped = true;
        if let Some(handle) = self.pending.take() {
            ctx.timers.cancel(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped && self.pending.is_some()
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
