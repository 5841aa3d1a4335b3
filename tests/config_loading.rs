//! Loading experiment files from disk.

use std::io::Write;

use disclosuresim::attack::StrategyConfig;
use disclosuresim::config::{AdversaryConfig, ExperimentConfig, ScenarioConfig};
use disclosuresim::config_loader::load_config;
use tempfile::NamedTempFile;

const BASE: &str = r#"
general:
  seed: 3
  replicas: 10
  log_level: debug
scenario:
  type: network
  num_clients: 20
  num_servers: 20
  num_target_servers: 2
  network_delay:
    type: truncated_normal
    mean: 1.0
    std_dev: 0.1
  idle_time:
    type: exponential
    rate: 0.1
  msgs_per_request:
    type: discrete_uniform
    min: 1
    max: 3
adversary:
  type: disclosure
  max_msg_delivery_time: 2.0
"#;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", yaml).unwrap();
    file
}

fn load_with_strategy(strategy: &str) -> color_eyre::Result<ExperimentConfig> {
    let file = write_config(&format!("{}  strategy:\n{}", BASE, strategy));
    load_config(file.path())
}

fn strategy_of(config: &ExperimentConfig) -> &StrategyConfig {
    match &config.adversary {
        AdversaryConfig::Disclosure { strategy, .. } => strategy,
        other => panic!("unexpected adversary {:?}", other),
    }
}

#[test]
fn strategy_selected_by_parameters() {
    let cases = [
        ("    error_percent: 0.2\n", "frequency_threshold"),
        ("    max_stdev: 0.05\n", "bayesian_clustering"),
        ("    max_stdev: 0.05\n    detection_threshold: 0.3\n", "outlier_threshold"),
        (
            "    max_stdev: 0.05\n    detection_threshold: 0.3\n    num_servers_to_exclude_from_threshold: 2\n",
            "early_termination",
        ),
        ("    stability_threshold: 0.01\n", "stationary_rounds"),
        ("    type: baseline_subtracted\n    error_percent: 0.2\n", "baseline_subtracted"),
    ];

    for (strategy, expected) in cases {
        let config = load_with_strategy(strategy).unwrap();
        assert_eq!(strategy_of(&config).name(), expected, "strategy block:\n{}", strategy);
    }
}

#[test]
fn load_network_experiment() {
    let config = load_with_strategy("    error_percent: 0.2\n").unwrap();
    assert_eq!(config.general.seed, 3);
    assert_eq!(config.general.replicas, 10);
    assert_eq!(config.max_msg_delivery_time().unwrap(), 2.0);
    match &config.scenario {
        ScenarioConfig::Network(network) => {
            assert_eq!(network.num_clients, 20);
            assert!(network.target_idle_time.is_none());
            assert!(network.params().is_ok());
        }
        other => panic!("unexpected scenario {:?}", other),
    }
}

#[test]
fn unmatched_strategy_is_rejected() {
    let err = load_with_strategy("    detection_threshold: 0.3\n").unwrap_err();
    assert!(format!("{:?}", err).contains("no completion strategy matches"));
}

#[test]
fn missing_parameter_for_explicit_strategy_is_rejected() {
    let err = load_with_strategy("    type: outlier_threshold\n    max_stdev: 0.05\n").unwrap_err();
    assert!(format!("{:?}", err).contains("requires 'detection_threshold'"));
}

#[test]
fn unknown_strategy_is_rejected() {
    let err = load_with_strategy("    type: majority_vote\n    error_percent: 0.2\n").unwrap_err();
    assert!(format!("{:?}", err).contains("unknown completion strategy"));
}

#[test]
fn out_of_range_parameter_is_rejected() {
    let err = load_with_strategy("    error_percent: 1.5\n").unwrap_err();
    assert!(format!("{:?}", err).contains("Invalid adversary configuration"));
}

#[test]
fn unknown_distribution_is_rejected() {
    let yaml = BASE.replace("type: exponential", "type: pareto") + "  strategy:\n    error_percent: 0.2\n";
    let file = write_config(&yaml);
    assert!(load_config(file.path()).is_err());
}

#[test]
fn invalid_distribution_parameter_is_rejected() {
    let yaml = BASE.replace("rate: 0.1", "rate: -1.0") + "  strategy:\n    error_percent: 0.2\n";
    let file = write_config(&yaml);
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{:?}", err).contains("Invalid scenario configuration"));
}
