//! Disclosure attack engine.
//!
//! Each time the target client completes a GET request for `k` messages, the
//! adversary looks at which servers sent at least `k` messages within the last
//! `max_msg_delivery_time`. Those servers form the round's candidate set. The
//! candidate sets are folded into per-server statistics, and a pluggable
//! [`CompletionStrategy`] decides when the target set is identified.

use std::collections::{BTreeMap, BTreeSet};

use super::baseline::BaselineInspector;
use super::events::{AttackEvent, AttackEventSink, LogSink};
use super::send_log::SendLog;
use super::stats::AttackStats;
use super::strategy::{CompletionStrategy, MIN_ROUNDS};
use super::{Adversary, AdversaryTimer, AttackContext, AttackError, AttackResult, CompletionSignal};
use crate::sim::message::{Message, NodeId, ServerId};
use crate::sim::scheduler::SimTime;

/// Where the attack is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackPhase {
    /// Fewer rounds than any strategy will judge
    WarmingUp,
    /// Collecting rounds until the strategy returns a verdict
    Accumulating,
    /// Target set identified; later observations are ignored
    Completed,
}

/// Passive adversary correlating target requests with server send activity
#[derive(Debug)]
pub struct DisclosureAttack<S: AttackEventSink = LogSink> {
    max_msg_delivery_time: f64,
    strategy: CompletionStrategy,
    send_log: SendLog,
    stats: AttackStats,
    baseline: Option<BaselineInspector>,
    signal: CompletionSignal,
    target_server_set: Option<BTreeSet<ServerId>>,
    skipped_rounds: u64,
    sink: S,
}

impl DisclosureAttack<LogSink> {
    /// Attack that reports its events through the `log` facade
    pub fn new(max_msg_delivery_time: f64, strategy: CompletionStrategy) -> Result<Self, AttackError> {
        Self::with_sink(max_msg_delivery_time, strategy, LogSink)
    }
}

impl<S: AttackEventSink> DisclosureAttack<S> {
    /// Attack reporting to `sink`. Starts a baseline inspector when the
    /// strategy needs one.
    pub fn with_sink(max_msg_delivery_time: f64, strategy: CompletionStrategy, sink: S) -> Result<Self, AttackError> {
        if !(max_msg_delivery_time.is_finite() && max_msg_delivery_time > 0.0) {
            return Err(AttackError::InvariantViolation(format!(
                "max_msg_delivery_time must be finite and positive, got {}",
                max_msg_delivery_time
            )));
        }

        let baseline = strategy
            .baseline_rate_factor()
            .map(|factor| BaselineInspector::new(max_msg_delivery_time, factor))
            .transpose()?;

        Ok(Self {
            max_msg_delivery_time,
            strategy,
            send_log: SendLog::new(),
            stats: AttackStats::new(),
            baseline,
            signal: CompletionSignal::default(),
            target_server_set: None,
            skipped_rounds: 0,
            sink,
        })
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> AttackPhase {
        if self.signal.is_fired() {
            AttackPhase::Completed
        } else if self.stats.rounds() < MIN_ROUNDS {
            AttackPhase::WarmingUp
        } else {
            AttackPhase::Accumulating
        }
    }

    /// Per-server attack and baseline statistics
    pub fn stats(&self) -> &AttackStats {
        &self.stats
    }

    /// Recent server send timestamps
    pub fn send_log(&self) -> &SendLog {
        &self.send_log
    }

    /// Completion strategy in use
    pub fn strategy(&self) -> &CompletionStrategy {
        &self.strategy
    }

    /// Event sink the attack reports to
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Completed requests that had no candidate servers
    pub fn skipped_rounds(&self) -> u64 {
        self.skipped_rounds
    }

    /// Identified target servers, once completed
    pub fn target_server_set(&self) -> Option<&BTreeSet<ServerId>> {
        self.target_server_set.as_ref()
    }

    /// Whether baseline samples are still being taken
    pub fn is_baseline_running(&self) -> bool {
        self.baseline.as_ref().is_some_and(BaselineInspector::is_running)
    }

    fn complete(&mut self, targets: BTreeSet<ServerId>, ctx: &mut AttackContext<'_>) {
        let now = ctx.now();
        if !self.signal.fire(now) {
            return;
        }
        if let Some(baseline) = self.baseline.as_mut() {
            baseline.stop(ctx);
        }
        self.sink.log(
            now,
            AttackEvent::AttackCompleted {
                target_servers: targets.clone(),
                rounds: self.stats.rounds(),
            },
        );
        self.target_server_set = Some(targets);
    }
}

impl<S: AttackEventSink> Adversary for DisclosureAttack<S> {
    fn name(&self) -> &'static str {
        "disclosure"
    }

    fn start(&mut self, ctx: &mut AttackContext<'_>) -> Result<(), AttackError> {
        if let Some(baseline) = self.baseline.as_mut() {
            baseline.start(ctx);
        }
        Ok(())
    }

    fn server_sent_msg(&mut self, message: &Message, ctx: &mut AttackContext<'_>) {
        if self.signal.is_fired() {
            return;
        }
        if let NodeId::Server(server) = message.source {
            self.send_log.record(server, ctx.now());
        }
    }

    fn client_completed_get_request(
        &mut self,
        num_msgs_recved: u32,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), AttackError> {
        if self.signal.is_fired() {
            return Ok(());
        }
        if num_msgs_recved == 0 {
            return Err(AttackError::InvariantViolation(
                "client completed a GET request for zero messages".to_string(),
            ));
        }

        let now = ctx.now();
        let min_time = now - self.max_msg_delivery_time;
        let candidates = self.send_log.candidate_set(min_time, num_msgs_recved as usize);
        if candidates.is_empty() {
            self.skipped_rounds += 1;
            self.sink.log(now, AttackEvent::RoundSkipped { num_msgs_recved });
            return Ok(());
        }

        self.send_log.trim(min_time);
        self.stats.fold_sample(&candidates);
        self.sink.log(
            now,
            AttackEvent::RoundCompleted {
                round: self.stats.rounds(),
                num_candidates: candidates.len(),
            },
        );

        if let Some(targets) = self.strategy.evaluate(&self.stats) {
            self.complete(targets, ctx);
        }
        Ok(())
    }

    fn on_timer(&mut self, timer: AdversaryTimer, ctx: &mut AttackContext<'_>) -> Result<(), AttackError> {
        if timer != AdversaryTimer::BaselineSample {
            return Ok(());
        }
        if let Some(baseline) = self.baseline.as_mut() {
            baseline.on_sample(&self.send_log, &mut self.stats, &mut self.sink, ctx);
        }
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.signal.is_fired()
    }

    fn result(&self, stop_time: SimTime) -> AttackResult {
        AttackResult {
            target_server_set: self.target_server_set.clone(),
            completion_time: self.signal.fired_at().unwrap_or(stop_time),
            rounds_collected: self.stats.rounds(),
        }
    }

    fn signals(&self) -> Option<BTreeMap<ServerId, f64>> {
        self.strategy.uses_posteriors().then(|| self.stats.signals())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::events::RecordingSink;
    use crate::attack::strategy::StrategyConfig;
    use crate::sim::message::{ClientId, MessageFactory, MessageKind};
    use crate::sim::scheduler::Scheduler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Harness {
        scheduler: Scheduler<AdversaryTimer>,
        rng: StdRng,
        factory: MessageFactory,
        attack: DisclosureAttack<RecordingSink>,
    }

    impl Harness {
        fn new(strategy: StrategyConfig) -> Self {
            let strategy = CompletionStrategy::new(&strategy).unwrap();
            Self {
                scheduler: Scheduler::new(),
                rng: StdRng::seed_from_u64(1),
                factory: MessageFactory::new(),
                attack: DisclosureAttack::with_sink(1.0, strategy, RecordingSink::new()).unwrap(),
            }
        }

        /// Advance the clock to `time`, handing any adversary timer to the attack.
        fn advance_to(&mut self, time: SimTime) {
            self.scheduler.schedule_at(time, AdversaryTimer::WindowClose);
            while let Some((_, timer)) = self.scheduler.pop() {
                let mut ctx = AttackContext::new(&mut self.scheduler, &mut self.rng);
                self.attack.on_timer(timer, &mut ctx).unwrap();
                if self.scheduler.now() >= time {
                    break;
                }
            }
        }

        fn server_sends(&mut self, server: u32) {
            let message = self.factory.create(
                MessageKind::Data,
                NodeId::Server(ServerId(server)),
                NodeId::Client(ClientId(0)),
            );
            let mut ctx = AttackContext::new(&mut self.scheduler, &mut self.rng);
            self.attack.server_sent_msg(&message, &mut ctx);
        }

        fn complete_request(&mut self, k: u32) -> Result<(), AttackError> {
            let mut ctx = AttackContext::new(&mut self.scheduler, &mut self.rng);
            self.attack.client_completed_get_request(k, &mut ctx)
        }
    }

    #[test]
    fn test_identifies_single_target() {
        let mut h = Harness::new(StrategyConfig::FrequencyThreshold { error_percent: 0.2 });
        assert_eq!(h.attack.phase(), AttackPhase::WarmingUp);

        let mut t = 0.0;
        for round in 0..30u32 {
            t += 3.0;
            h.advance_to(t);
            h.server_sends(0);
            h.server_sends(0);
            // background noise on a rotating server
            h.server_sends(1 + round % 4);
            h.advance_to(t + 0.5);
            h.complete_request(2).unwrap();
            if h.attack.is_completed() {
                break;
            }
        }

        assert_eq!(h.attack.phase(), AttackPhase::Completed);
        let result = h.attack.result(1e9);
        assert_eq!(result.target_server_set, Some(BTreeSet::from([ServerId(0)])));
        assert_eq!(result.rounds_collected, MIN_ROUNDS);
        assert!(result.completion_time < 1e9);
    }

    #[test]
    fn test_rounds_increase_by_one() {
        // Never converges, so every round is counted
        let mut h = Harness::new(StrategyConfig::BayesianClustering { max_stdev: 1e-6 });
        let mut previous = 0;
        for i in 0..15u32 {
            h.advance_to(i as f64 * 2.0 + 1.0);
            h.server_sends(i % 3);
            h.complete_request(1).unwrap();
            let rounds = h.attack.stats().rounds();
            assert_eq!(rounds, previous + 1);
            previous = rounds;
        }
        assert_eq!(h.attack.phase(), AttackPhase::Accumulating);
    }

    #[test]
    fn test_empty_round_is_skipped() {
        let mut h = Harness::new(StrategyConfig::FrequencyThreshold { error_percent: 0.2 });
        h.server_sends(0);
        h.advance_to(5.0);
        h.complete_request(1).unwrap();

        assert_eq!(h.attack.stats().rounds(), 0);
        assert_eq!(h.attack.skipped_rounds(), 1);
        assert_eq!(
            h.attack.sink().count(|e| matches!(e, AttackEvent::RoundSkipped { .. })),
            1
        );
    }

    #[test]
    fn test_zero_messages_is_invariant_violation() {
        let mut h = Harness::new(StrategyConfig::FrequencyThreshold { error_percent: 0.2 });
        assert!(matches!(
            h.complete_request(0),
            Err(AttackError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_completion_freezes_state() {
        let mut h = Harness::new(StrategyConfig::FrequencyThreshold { error_percent: 0.2 });
        for i in 0..10 {
            h.advance_to(i as f64 * 2.0 + 1.0);
            h.server_sends(0);
            h.complete_request(1).unwrap();
        }
        assert!(h.attack.is_completed());
        let result = h.attack.result(100.0);
        assert_eq!(result.completion_time, 19.0);

        h.advance_to(30.0);
        h.server_sends(4);
        h.complete_request(1).unwrap();
        assert_eq!(h.attack.result(100.0), result);
        assert_eq!(
            h.attack.sink().count(|e| matches!(e, AttackEvent::AttackCompleted { .. })),
            1
        );
    }

    #[test]
    fn test_baseline_runs_until_completion() {
        let mut h = Harness::new(StrategyConfig::BaselineSubtracted { error_percent: 0.2 });
        {
            let mut ctx = AttackContext::new(&mut h.scheduler, &mut h.rng);
            h.attack.start(&mut ctx).unwrap();
        }
        assert!(h.attack.is_baseline_running());

        for i in 0..100 {
            let t = i as f64 * 10.0;
            // s5 is busy all the time, s0 only right before our requests
            for j in 0..20 {
                h.advance_to(t + j as f64 * 0.5);
                h.server_sends(5);
            }
            h.advance_to(t + 9.9);
            h.server_sends(0);
            h.complete_request(1).unwrap();
            if h.attack.is_completed() {
                break;
            }
        }

        assert!(h.attack.stats().baseline_rounds() > 0);
        assert_eq!(h.attack.target_server_set(), Some(&BTreeSet::from([ServerId(0)])));
        assert!(!h.attack.is_baseline_running());
        assert_eq!(h.attack.signals(), None);
    }

    #[test]
    fn test_result_without_verdict_uses_stop_time() {
        let h = Harness::new(StrategyConfig::BayesianClustering { max_stdev: 0.01 });
        let result = h.attack.result(42.0);
        assert_eq!(result.target_server_set, None);
        assert_eq!(result.completion_time, 42.0);
        assert_eq!(result.rounds_collected, 0);
        assert_eq!(h.attack.signals(), Some(BTreeMap::new()));
    }

    #[test]
    fn test_rejects_unbounded_delivery_time() {
        let strategy = CompletionStrategy::new(&StrategyConfig::FrequencyThreshold { error_percent: 0.2 }).unwrap();
        assert!(DisclosureAttack::new(f64::INFINITY, strategy).is_err());
    }
}
