use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::attack::StrategyConfig;
use crate::prob::{DistributionConfig, DistributionError};
use crate::sim::message::ServerId;
use crate::sim::{RoundModelParams, RunLimits, TorNetworkParams};

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// One experiment: a scenario, an adversary and how many replicas to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub scenario: ScenarioConfig,
    pub adversary: AdversaryConfig,
}

impl ExperimentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.general.validate()?;
        self.scenario.validate()?;

        if let AdversaryConfig::Disclosure { strategy, .. } = &self.adversary {
            strategy.validate().map_err(ValidationError::InvalidAdversary)?;
        }
        // The round model has no client sends to open windows on
        if let (AdversaryConfig::Intersection { .. }, ScenarioConfig::RoundModel(_)) =
            (&self.adversary, &self.scenario)
        {
            return Err(ValidationError::InvalidAdversary(
                "intersection attack requires the network scenario".to_string(),
            ));
        }
        self.max_msg_delivery_time()?;

        Ok(())
    }

    /// Upper bound on message delivery time used by the adversary.
    ///
    /// Falls back to the scenario's bound (the largest possible network
    /// delay for the network scenario) when the adversary does not set one.
    pub fn max_msg_delivery_time(&self) -> Result<f64, ValidationError> {
        let explicit = match &self.adversary {
            AdversaryConfig::Disclosure {
                max_msg_delivery_time, ..
            }
            | AdversaryConfig::Intersection { max_msg_delivery_time } => *max_msg_delivery_time,
        };

        let max = match (explicit, &self.scenario) {
            (Some(max), _) => max,
            (None, ScenarioConfig::Network(network)) => network
                .network_delay
                .max_value()
                .map_err(|e| ValidationError::InvalidScenario(format!("network_delay: {}", e)))?,
            (None, ScenarioConfig::RoundModel(model)) => model.max_msg_delivery_time,
        };

        if !(max.is_finite() && max > 0.0) {
            return Err(ValidationError::InvalidAdversary(format!(
                "max_msg_delivery_time must be finite and positive, got {}; \
                 set it explicitly when the network delay is unbounded",
                max
            )));
        }
        Ok(max)
    }

    /// The servers the target client actually talks to
    pub fn true_targets(&self) -> BTreeSet<ServerId> {
        (0..self.scenario.num_target_servers() as u32).map(ServerId).collect()
    }

    /// Get the general configuration
    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// Worker threads for replicas, 0 picks one per core
    #[serde(default)]
    pub threads: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_replicas() -> usize {
    1
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            replicas: default_replicas(),
            threads: 0,
            max_time: None,
            max_events: None,
            log_level: Some("info".to_string()),
        }
    }
}

impl GeneralConfig {
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            max_time: self.max_time,
            max_events: self.max_events,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.replicas == 0 {
            return Err(ValidationError::InvalidGeneral("replicas must be at least 1".to_string()));
        }
        if let Some(max_time) = self.max_time {
            if !(max_time.is_finite() && max_time > 0.0) {
                return Err(ValidationError::InvalidGeneral(format!(
                    "max_time must be finite and positive, got {}",
                    max_time
                )));
            }
        }
        if self.max_events == Some(0) {
            return Err(ValidationError::InvalidGeneral("max_events must be at least 1".to_string()));
        }
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ValidationError::InvalidGeneral(format!(
                    "unknown log_level '{}', expected one of {:?}",
                    level, LOG_LEVELS
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioConfig {
    Network(NetworkConfig),
    RoundModel(RoundModelConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Background clients, besides the target client
    pub num_clients: usize,
    pub num_servers: usize,
    pub num_target_servers: usize,
    pub network_delay: DistributionConfig,
    pub idle_time: DistributionConfig,
    /// Defaults to `idle_time`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_idle_time: Option<DistributionConfig>,
    pub msgs_per_request: DistributionConfig,
}

impl NetworkConfig {
    pub fn params(&self) -> Result<TorNetworkParams, DistributionError> {
        let idle_time = self.idle_time.build()?;
        let target_idle_time = match &self.target_idle_time {
            Some(dist) => dist.build()?,
            None => idle_time.clone(),
        };
        Ok(TorNetworkParams {
            num_clients: self.num_clients,
            num_servers: self.num_servers,
            num_target_servers: self.num_target_servers,
            network_delay: self.network_delay.build()?,
            idle_time,
            target_idle_time,
            msgs_per_request: self.msgs_per_request.build()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundModelConfig {
    pub num_servers: usize,
    pub num_target_servers: usize,
    pub prob_server_active: f64,
    pub prob_attack_round: f64,
    pub max_msg_delivery_time: f64,
}

impl RoundModelConfig {
    pub fn params(&self) -> RoundModelParams {
        RoundModelParams {
            num_servers: self.num_servers,
            num_target_servers: self.num_target_servers,
            prob_server_active: self.prob_server_active,
            prob_attack_round: self.prob_attack_round,
            max_msg_delivery_time: self.max_msg_delivery_time,
        }
    }
}

impl ScenarioConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioConfig::Network(_) => "network",
            ScenarioConfig::RoundModel(_) => "round_model",
        }
    }

    pub fn num_servers(&self) -> usize {
        match self {
            ScenarioConfig::Network(network) => network.num_servers,
            ScenarioConfig::RoundModel(model) => model.num_servers,
        }
    }

    pub fn num_target_servers(&self) -> usize {
        match self {
            ScenarioConfig::Network(network) => network.num_target_servers,
            ScenarioConfig::RoundModel(model) => model.num_target_servers,
        }
    }

    /// Same scenario with `num_servers` servers. The network scenario also
    /// gets one background client per server.
    pub fn with_num_servers(&self, num_servers: usize) -> ScenarioConfig {
        let mut scenario = self.clone();
        match &mut scenario {
            ScenarioConfig::Network(network) => {
                network.num_servers = num_servers;
                network.num_clients = num_servers;
            }
            ScenarioConfig::RoundModel(model) => model.num_servers = num_servers,
        }
        scenario
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let num_servers = self.num_servers();
        let num_target_servers = self.num_target_servers();
        if num_servers == 0 {
            return Err(ValidationError::InvalidScenario("num_servers must be at least 1".to_string()));
        }
        if num_target_servers == 0 || num_target_servers > num_servers {
            return Err(ValidationError::InvalidScenario(format!(
                "num_target_servers must be in 1..={}, got {}",
                num_servers, num_target_servers
            )));
        }

        match self {
            ScenarioConfig::Network(network) => {
                network
                    .params()
                    .map_err(|e| ValidationError::InvalidScenario(e.to_string()))?;
            }
            ScenarioConfig::RoundModel(model) => {
                for (name, p) in [
                    ("prob_server_active", model.prob_server_active),
                    ("prob_attack_round", model.prob_attack_round),
                ] {
                    if !(0.0..=1.0).contains(&p) {
                        return Err(ValidationError::InvalidScenario(format!(
                            "{} must be in [0, 1], got {}",
                            name, p
                        )));
                    }
                }
                if !(model.max_msg_delivery_time.is_finite() && model.max_msg_delivery_time > 0.0) {
                    return Err(ValidationError::InvalidScenario(format!(
                        "max_msg_delivery_time must be finite and positive, got {}",
                        model.max_msg_delivery_time
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdversaryConfig {
    Disclosure {
        strategy: StrategyConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_msg_delivery_time: Option<f64>,
    },
    Intersection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_msg_delivery_time: Option<f64>,
    },
}

impl AdversaryConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AdversaryConfig::Disclosure { .. } => "disclosure",
            AdversaryConfig::Intersection { .. } => "intersection",
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid scenario configuration: {0}")]
    InvalidScenario(String),
    #[error("Invalid adversary configuration: {0}")]
    InvalidAdversary(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK: &str = r#"
general:
  seed: 7
  replicas: 4
scenario:
  type: network
  num_clients: 10
  num_servers: 10
  num_target_servers: 2
  network_delay:
    type: uniform
    min: 0.5
    max: 1.5
  idle_time:
    type: exponential
    rate: 0.5
  msgs_per_request:
    type: constant
    value: 3
adversary:
  type: disclosure
  strategy:
    error_percent: 0.2
"#;

    #[test]
    fn test_parse_network_config() {
        let config: ExperimentConfig = serde_yaml::from_str(NETWORK).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.general().seed, 7);
        assert_eq!(config.general().replicas, 4);
        assert_eq!(config.scenario.name(), "network");
        assert_eq!(config.adversary.name(), "disclosure");
        assert_eq!(config.max_msg_delivery_time().unwrap(), 1.5);
        assert_eq!(config.true_targets(), [ServerId(0), ServerId(1)].into_iter().collect());
        match &config.adversary {
            AdversaryConfig::Disclosure { strategy, .. } => {
                assert_eq!(strategy, &StrategyConfig::FrequencyThreshold { error_percent: 0.2 });
            }
            other => panic!("unexpected adversary {:?}", other),
        }
    }

    #[test]
    fn test_parse_round_model_config() {
        let yaml = r#"
scenario:
  type: round_model
  num_servers: 50
  num_target_servers: 1
  prob_server_active: 0.1
  prob_attack_round: 0.5
  max_msg_delivery_time: 2.0
adversary:
  type: disclosure
  strategy:
    stability_threshold: 0.01
"#;
        let config: ExperimentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general().replicas, 1);
        assert_eq!(config.max_msg_delivery_time().unwrap(), 2.0);
        assert_eq!(config.general().limits(), RunLimits::default());

        let intersection = yaml.replace("type: disclosure\n  strategy:\n    stability_threshold: 0.01", "type: intersection");
        let config: ExperimentConfig = serde_yaml::from_str(&intersection).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAdversary(_))));
    }

    #[test]
    fn test_unbounded_delay_needs_explicit_max() {
        let yaml = NETWORK.replace("type: uniform\n    min: 0.5\n    max: 1.5", "type: exponential\n    rate: 1.0");
        let config: ExperimentConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAdversary(_))));

        let yaml = yaml.replace("    error_percent: 0.2", "    error_percent: 0.2\n  max_msg_delivery_time: 5.0");
        let config: ExperimentConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_msg_delivery_time().unwrap(), 5.0);
    }

    #[test]
    fn test_strategy_without_known_parameters_fails_to_parse() {
        let yaml = NETWORK.replace("error_percent: 0.2", "threshold: 0.2");
        assert!(serde_yaml::from_str::<ExperimentConfig>(&yaml).is_err());
    }

    #[test]
    fn test_rejects_too_many_targets() {
        let yaml = NETWORK.replace("num_target_servers: 2", "num_target_servers: 11");
        let config: ExperimentConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidScenario(_))));
    }

    #[test]
    fn test_rejects_zero_replicas() {
        let yaml = NETWORK.replace("replicas: 4", "replicas: 0");
        let config: ExperimentConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));
    }

    #[test]
    fn test_with_num_servers_scales_clients() {
        let config: ExperimentConfig = serde_yaml::from_str(NETWORK).unwrap();
        match config.scenario.with_num_servers(40) {
            ScenarioConfig::Network(network) => {
                assert_eq!(network.num_servers, 40);
                assert_eq!(network.num_clients, 40);
                assert_eq!(network.num_target_servers, 2);
            }
            other => panic!("unexpected scenario {:?}", other),
        }
    }
}
