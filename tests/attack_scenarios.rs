//! End-to-end runs of each adversary against each scenario.

use std::collections::BTreeSet;

use disclosuresim::config::ExperimentConfig;
use disclosuresim::experiment::{build_replica, run_replicas, summarize};
use disclosuresim::sim::message::ServerId;
use disclosuresim::sim::StopReason;

const NETWORK: &str = r#"
general:
  seed: 11
  replicas: 3
  max_time: 20000.0
scenario:
  type: network
  num_clients: 6
  num_servers: 6
  num_target_servers: 1
  network_delay:
    type: uniform
    min: 0.1
    max: 0.5
  idle_time:
    type: exponential
    rate: 0.5
  target_idle_time:
    type: exponential
    rate: 0.2
  msgs_per_request:
    type: constant
    value: 1
adversary:
  type: disclosure
  strategy:
    error_percent: 0.3
"#;

const ROUND_MODEL: &str = r#"
general:
  seed: 5
  replicas: 3
  max_time: 100000.0
scenario:
  type: round_model
  num_servers: 10
  num_target_servers: 1
  prob_server_active: 0.1
  prob_attack_round: 0.5
  max_msg_delivery_time: 1.0
adversary:
  type: disclosure
  strategy:
    error_percent: 0.3
"#;

fn with_adversary(base: &str, adversary: &str) -> ExperimentConfig {
    let start = base.find("adversary:").unwrap();
    let yaml = format!("{}{}", &base[..start], adversary);
    let config: ExperimentConfig = serde_yaml::from_str(&yaml).unwrap();
    config.validate().unwrap();
    config
}

fn s0() -> BTreeSet<ServerId> {
    [ServerId(0)].into_iter().collect()
}

#[test]
fn frequency_threshold_finds_target_in_network() {
    let config: ExperimentConfig = serde_yaml::from_str(NETWORK).unwrap();
    let batch = run_replicas(&config);

    assert!(batch.failed.is_empty());
    for outcome in &batch.outcomes {
        assert_eq!(outcome.stop_reason, StopReason::Completed);
        assert_eq!(outcome.result.target_server_set, Some(s0()));
        assert!(outcome.result.rounds_collected >= 10);
        assert!(outcome.signals.is_none());
    }

    let summary = summarize(&config, &batch);
    assert_eq!(summary.target_server_set_accuracy, 1.0);
    assert_eq!(summary.num_rounds.map(|m| m.mean >= 10.0), Some(true));
}

#[test]
fn intersection_attack_finds_target_in_network() {
    let config = with_adversary(NETWORK, "adversary:\n  type: intersection\n");
    let outcome = build_replica(&config, 3).unwrap().run().unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.result.target_server_set, Some(s0()));
}

#[test]
fn bayesian_clustering_reports_signals() {
    let config = with_adversary(ROUND_MODEL, "adversary:\n  type: disclosure\n  strategy:\n    max_stdev: 0.1\n");
    let batch = run_replicas(&config);

    let summary = summarize(&config, &batch);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.target_server_set_accuracy, 1.0);
    assert_eq!(summary.signal_strength_for_target_servers.len(), 3);

    let weakest_target = summary
        .signal_strength_for_target_servers
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let strongest_noise = summary
        .signal_strength_for_non_target_servers
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(weakest_target > strongest_noise);
}

#[test]
fn outlier_threshold_finds_target() {
    let config = with_adversary(
        ROUND_MODEL,
        "adversary:\n  type: disclosure\n  strategy:\n    max_stdev: 0.1\n    detection_threshold: 0.2\n",
    );
    let outcome = build_replica(&config, 9).unwrap().run().unwrap();
    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.result.target_server_set, Some(s0()));
}

#[test]
fn stationary_rounds_finds_target() {
    let config = with_adversary(
        ROUND_MODEL,
        "adversary:\n  type: disclosure\n  strategy:\n    stability_threshold: 0.05\n",
    );
    let outcome = build_replica(&config, 2).unwrap().run().unwrap();
    assert_eq!(outcome.stop_reason, StopReason::Completed);
    assert_eq!(outcome.result.target_server_set, Some(s0()));
}

#[test]
fn same_seed_same_results() {
    let config: ExperimentConfig = serde_yaml::from_str(NETWORK).unwrap();
    let mut first: Vec<_> = run_replicas(&config).outcomes;
    let mut second: Vec<_> = run_replicas(&config).outcomes;
    first.sort_by_key(|o| o.seed);
    second.sort_by_key(|o| o.seed);

    let first: Vec<_> = first.into_iter().map(|o| o.result).collect();
    let second: Vec<_> = second.into_iter().map(|o| o.result).collect();
    assert_eq!(first, second);
}

#[test]
fn time_limit_leaves_replica_unfinished() {
    let mut config: ExperimentConfig = serde_yaml::from_str(ROUND_MODEL).unwrap();
    config.general.max_time = Some(3.0);
    let batch = run_replicas(&config);

    let summary = summarize(&config, &batch);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.unfinished, 3);
    assert_eq!(summary.time_to_deanonymize, None);
    for outcome in &batch.outcomes {
        assert_eq!(outcome.stop_reason, StopReason::TimeLimit);
        assert_eq!(outcome.result.target_server_set, None);
        assert_eq!(outcome.result.completion_time, 3.0);
    }
}
