//! Aggregation of replica outcomes.

use std::collections::BTreeSet;

use serde::Serialize;
use statrs::statistics::Statistics;

use super::runner::ReplicaBatch;
use crate::config::ExperimentConfig;
use crate::sim::message::ServerId;

/// How one replica's verdict splits the servers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub num_targets_identified_as_target: usize,
    pub num_targets_identified_as_non_target: usize,
    pub num_non_targets_identified_as_target: usize,
    pub num_non_targets_identified_as_non_target: usize,
    pub prob_target_identified_as_non_target: f64,
    pub prob_non_target_identified_as_target: f64,
}

impl ClassificationResult {
    pub fn new(identified: &BTreeSet<ServerId>, true_targets: &BTreeSet<ServerId>, num_servers: usize) -> Self {
        let num_targets_identified_as_target = identified.intersection(true_targets).count();
        let num_non_targets_identified_as_target = identified.len() - num_targets_identified_as_target;
        let num_targets_identified_as_non_target = true_targets.len() - num_targets_identified_as_target;
        let num_non_targets = num_servers.saturating_sub(true_targets.len());
        let num_non_targets_identified_as_non_target =
            num_non_targets.saturating_sub(num_non_targets_identified_as_target);

        Self {
            num_targets_identified_as_target,
            num_targets_identified_as_non_target,
            num_non_targets_identified_as_target,
            num_non_targets_identified_as_non_target,
            prob_target_identified_as_non_target: ratio(num_targets_identified_as_non_target, true_targets.len()),
            prob_non_target_identified_as_target: ratio(num_non_targets_identified_as_target, num_non_targets),
        }
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Mean and population standard deviation of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std_dev: f64,
}

impl MeanStd {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            mean: values.mean(),
            std_dev: values.population_std_dev(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSummary {
    pub num_servers: usize,
    pub num_target_servers: usize,
    pub replicas: usize,
    pub completed: usize,
    pub unfinished: usize,
    pub failed: usize,
    /// Over completed replicas only
    pub time_to_deanonymize: Option<MeanStd>,
    pub num_rounds: Option<MeanStd>,
    /// Fraction of finished replicas whose verdict is exactly the true target set
    pub target_server_set_accuracy: f64,
    pub prob_target_identified_as_non_target: Option<MeanStd>,
    pub prob_non_target_identified_as_target: Option<MeanStd>,
    pub classification_results: Vec<ClassificationResult>,
    pub signal_strength_for_target_servers: Vec<f64>,
    pub signal_strength_for_non_target_servers: Vec<f64>,
}

/// Reduce a batch of outcomes to one summary.
///
/// Unfinished replicas count as having identified no targets.
pub fn summarize(config: &ExperimentConfig, batch: &ReplicaBatch) -> ExperimentSummary {
    let num_servers = config.scenario.num_servers();
    let true_targets = config.true_targets();
    let no_verdict = BTreeSet::new();

    let completed: Vec<_> = batch.outcomes.iter().filter(|o| o.is_completed()).collect();
    let times: Vec<f64> = completed.iter().map(|o| o.result.completion_time).collect();
    let rounds: Vec<f64> = completed.iter().map(|o| o.result.rounds_collected as f64).collect();

    let classification_results: Vec<ClassificationResult> = batch
        .outcomes
        .iter()
        .map(|o| {
            let identified = o.result.target_server_set.as_ref().unwrap_or(&no_verdict);
            ClassificationResult::new(identified, &true_targets, num_servers)
        })
        .collect();

    let num_correct = batch
        .outcomes
        .iter()
        .filter(|o| o.result.target_server_set.as_ref() == Some(&true_targets))
        .count();

    let mut signal_strength_for_target_servers = Vec::new();
    let mut signal_strength_for_non_target_servers = Vec::new();
    for signals in batch.outcomes.iter().filter_map(|o| o.signals.as_ref()) {
        for (server, &signal) in signals {
            if true_targets.contains(server) {
                signal_strength_for_target_servers.push(signal);
            } else {
                signal_strength_for_non_target_servers.push(signal);
            }
        }
    }

    let miss: Vec<f64> = classification_results
        .iter()
        .map(|c| c.prob_target_identified_as_non_target)
        .collect();
    let false_alarm: Vec<f64> = classification_results
        .iter()
        .map(|c| c.prob_non_target_identified_as_target)
        .collect();

    ExperimentSummary {
        num_servers,
        num_target_servers: true_targets.len(),
        replicas: config.general.replicas,
        completed: completed.len(),
        unfinished: batch.outcomes.len() - completed.len(),
        failed: batch.failed.len(),
        time_to_deanonymize: MeanStd::of(&times),
        num_rounds: MeanStd::of(&rounds),
        target_server_set_accuracy: ratio(num_correct, batch.outcomes.len()),
        prob_target_identified_as_non_target: MeanStd::of(&miss),
        prob_non_target_identified_as_target: MeanStd::of(&false_alarm),
        classification_results,
        signal_strength_for_target_servers,
        signal_strength_for_non_target_servers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::AttackResult;
    use crate::sim::{ReplicaOutcome, StopReason};
    use std::collections::BTreeMap;

    fn servers(ids: &[u32]) -> BTreeSet<ServerId> {
        ids.iter().copied().map(ServerId).collect()
    }

    fn config() -> ExperimentConfig {
        serde_yaml::from_str(
            r#"
general:
  replicas: 3
scenario:
  type: round_model
  num_servers: 10
  num_target_servers: 2
  prob_server_active: 0.1
  prob_attack_round: 0.5
  max_msg_delivery_time: 1.0
adversary:
  type: disclosure
  strategy:
    max_stdev: 0.05
"#,
        )
        .unwrap()
    }

    fn outcome(targets: Option<&[u32]>, time: f64, rounds: u64) -> ReplicaOutcome {
        let signals: BTreeMap<ServerId, f64> = [(ServerId(0), 0.5), (ServerId(1), 0.4), (ServerId(5), 0.01)]
            .into_iter()
            .collect();
        ReplicaOutcome {
            seed: 0,
            result: AttackResult {
                target_server_set: targets.map(servers),
                completion_time: time,
                rounds_collected: rounds,
            },
            signals: Some(signals),
            events_processed: 0,
            stop_reason: if targets.is_some() {
                StopReason::Completed
            } else {
                StopReason::TimeLimit
            },
        }
    }

    #[test]
    fn test_classification_counts() {
        let result = ClassificationResult::new(&servers(&[0, 4]), &servers(&[0, 1]), 10);
        assert_eq!(result.num_targets_identified_as_target, 1);
        assert_eq!(result.num_targets_identified_as_non_target, 1);
        assert_eq!(result.num_non_targets_identified_as_target, 1);
        assert_eq!(result.num_non_targets_identified_as_non_target, 7);
        assert_eq!(result.prob_target_identified_as_non_target, 0.5);
        assert_eq!(result.prob_non_target_identified_as_target, 0.125);
    }

    #[test]
    fn test_all_servers_targets_has_no_false_alarms() {
        let result = ClassificationResult::new(&servers(&[0, 1]), &servers(&[0, 1]), 2);
        assert_eq!(result.prob_non_target_identified_as_target, 0.0);
        assert_eq!(result.prob_target_identified_as_non_target, 0.0);
    }

    #[test]
    fn test_summarize() {
        let batch = ReplicaBatch {
            outcomes: vec![
                outcome(Some(&[0, 1]), 10.0, 20),
                outcome(Some(&[0]), 20.0, 30),
                outcome(None, 50.0, 40),
            ],
            failed: vec![7],
        };
        let summary = summarize(&config(), &batch);

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.unfinished, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.time_to_deanonymize, Some(MeanStd { mean: 15.0, std_dev: 5.0 }));
        assert_eq!(summary.num_rounds.map(|m| m.mean), Some(25.0));
        assert!((summary.target_server_set_accuracy - 1.0 / 3.0).abs() < 1e-12);

        // Unfinished replica misses both targets
        assert_eq!(summary.classification_results[2].prob_target_identified_as_non_target, 1.0);
        assert_eq!(summary.signal_strength_for_target_servers.len(), 6);
        assert_eq!(summary.signal_strength_for_non_target_servers, vec![0.01; 3]);
    }

    #[test]
    fn test_empty_batch() {
        let batch = ReplicaBatch {
            outcomes: Vec::new(),
            failed: vec![0, 1, 2],
        };
        let summary = summarize(&config(), &batch);
        assert_eq!(summary.time_to_deanonymize, None);
        assert_eq!(summary.target_server_set_accuracy, 0.0);
        assert_eq!(summary.failed, 3);
    }
}
