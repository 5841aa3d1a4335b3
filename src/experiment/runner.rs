//! Builds and runs independent replicas of an experiment.

use rayon::prelude::*;

use super::summary::{summarize, ExperimentSummary};
use crate::attack::{Adversary, CompletionStrategy, DisclosureAttack, IntersectionAttack};
use crate::config::{AdversaryConfig, ExperimentConfig, ScenarioConfig, ValidationError};
use crate::sim::{Replica, ReplicaOutcome, RoundModel, Scenario, SimError, TorNetwork};

/// Outcomes of all replicas that ran to the end, successfully or not
#[derive(Debug, Clone)]
pub struct ReplicaBatch {
    pub outcomes: Vec<ReplicaOutcome>,
    /// Seeds of replicas that failed with an error
    pub failed: Vec<u64>,
}

/// Build one replica with its own scenario, adversary and RNG.
pub fn build_replica(config: &ExperimentConfig, seed: u64) -> Result<Replica, SimError> {
    let max_msg_delivery_time = config
        .max_msg_delivery_time()
        .map_err(|e| SimError::InvalidScenario(e.to_string()))?;

    let scenario: Box<dyn Scenario> = match &config.scenario {
        ScenarioConfig::Network(network) => Box::new(TorNetwork::new(network.params()?)?),
        ScenarioConfig::RoundModel(model) => Box::new(RoundModel::new(model.params())?),
    };

    let adversary: Box<dyn Adversary> = match &config.adversary {
        AdversaryConfig::Disclosure { strategy, .. } => Box::new(DisclosureAttack::new(
            max_msg_delivery_time,
            CompletionStrategy::new(strategy)?,
        )?),
        AdversaryConfig::Intersection { .. } => Box::new(IntersectionAttack::new(
            max_msg_delivery_time,
            config.scenario.num_target_servers(),
        )?),
    };

    Ok(Replica::new(seed, scenario, adversary, config.general.limits()))
}

/// Run `general.replicas` replicas in parallel, seeded `seed + i`.
///
/// A replica that fails is logged and left out of the outcomes.
pub fn run_replicas(config: &ExperimentConfig) -> ReplicaBatch {
    let base_seed = config.general.seed;
    log::info!(
        "Running {} replicas of {} / {} (base seed {})",
        config.general.replicas,
        config.scenario.name(),
        config.adversary.name(),
        base_seed
    );

    let results: Vec<(u64, Result<ReplicaOutcome, SimError>)> = (0..config.general.replicas as u64)
        .into_par_iter()
        .map(|i| {
            let seed = base_seed.wrapping_add(i);
            (seed, build_replica(config, seed).and_then(Replica::run))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (seed, result) in results {
        match result {
            Ok(outcome) => {
                log::debug!(
                    "Replica {}: {:?} after {} rounds at t={:.3}",
                    seed,
                    outcome.stop_reason,
                    outcome.result.rounds_collected,
                    outcome.result.completion_time
                );
                outcomes.push(outcome);
            }
            Err(e) => {
                log::warn!("Replica {} failed: {}", seed, e);
                failed.push(seed);
            }
        }
    }

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    log::info!(
        "Finished {} replicas: {} completed, {} unfinished, {} failed",
        config.general.replicas,
        completed,
        outcomes.len() - completed,
        failed.len()
    );

    ReplicaBatch { outcomes, failed }
}

/// Re-run the experiment once per server count and summarize each point.
pub fn sweep(
    config: &ExperimentConfig,
    num_servers_list: &[usize],
) -> Result<Vec<ExperimentSummary>, ValidationError> {
    let mut summaries = Vec::with_capacity(num_servers_list.len());
    for &num_servers in num_servers_list {
        log::info!(">> num_servers = {}", num_servers);
        let point = ExperimentConfig {
            scenario: config.scenario.with_num_servers(num_servers),
            ..config.clone()
        };
        point.validate()?;

        let batch = run_replicas(&point);
        summaries.push(summarize(&point, &batch));
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::StopReason;

    fn config(replicas: usize) -> ExperimentConfig {
        let yaml = format!(
            r#"
general:
  seed: 100
  replicas: {}
  max_time: 2000.0
scenario:
  type: round_model
  num_servers: 20
  num_target_servers: 1
  prob_server_active: 0.05
  prob_attack_round: 0.5
  max_msg_delivery_time: 1.0
adversary:
  type: disclosure
  strategy:
    error_percent: 0.3
"#,
            replicas
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_replicas_use_consecutive_seeds() {
        let batch = run_replicas(&config(4));
        assert!(batch.failed.is_empty());
        let mut seeds: Vec<u64> = batch.outcomes.iter().map(|o| o.seed).collect();
        seeds.sort_unstable();
        assert_eq!(seeds, vec![100, 101, 102, 103]);
    }

    #[test]
    fn test_replica_matches_serial_run() {
        let config = config(2);
        let batch = run_replicas(&config);
        let parallel = batch.outcomes.iter().find(|o| o.seed == 101).unwrap();
        let serial = build_replica(&config, 101).unwrap().run().unwrap();
        assert_eq!(parallel.result, serial.result);
        assert_eq!(serial.stop_reason, StopReason::Completed);
    }

    #[test]
    fn test_intersection_replica_builds() {
        let yaml = r#"
scenario:
  type: network
  num_clients: 4
  num_servers: 4
  num_target_servers: 1
  network_delay:
    type: uniform
    min: 0.1
    max: 0.5
  idle_time:
    type: exponential
    rate: 1.0
  msgs_per_request:
    type: constant
    value: 1
adversary:
  type: intersection
"#;
        let config: ExperimentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert!(build_replica(&config, 0).is_ok());
    }

    #[test]
    fn test_sweep_one_summary_per_point() {
        let summaries = sweep(&config(2), &[10, 30]).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].num_servers, 10);
        assert_eq!(summaries[1].num_servers, 30);
        assert!(summaries.iter().all(|s| s.completed + s.unfinished + s.failed == 2));
    }

    #[test]
    fn test_sweep_rejects_too_few_servers() {
        let mut config = config(1);
        if let ScenarioConfig::RoundModel(model) = &mut config.scenario {
            model.num_target_servers = 3;
        }
        assert!(sweep(&config, &[2]).is_err());
    }
}
