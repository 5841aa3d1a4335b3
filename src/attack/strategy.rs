//! Completion strategies: decision rules that turn accumulated per-server
//! statistics into a verdict on the target server set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::clustering::two_means;
use super::stats::AttackStats;
use super::AttackError;
use crate::prob::RandomVariable;
use crate::sim::message::ServerId;

/// No strategy is consulted before this many rounds
pub const MIN_ROUNDS: u64 = 10;

/// Consecutive stationary rounds required before clustering
pub const STATIONARY_ROUNDS_REQUIRED: u32 = 20;

const SMOOTHING: f64 = 0.9;

/// Strategy parameters as written in an experiment file.
///
/// `type` may be omitted, in which case the strategy is inferred from the
/// parameters that are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "StrategyParams")]
pub enum StrategyConfig {
    FrequencyThreshold {
        error_percent: f64,
    },
    BaselineSubtracted {
        error_percent: f64,
    },
    BayesianClustering {
        max_stdev: f64,
    },
    OutlierThreshold {
        max_stdev: f64,
        detection_threshold: f64,
    },
    EarlyTermination {
        max_stdev: f64,
        detection_threshold: f64,
        num_servers_to_exclude_from_threshold: usize,
    },
    StationaryRounds {
        stability_threshold: f64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrategyParams {
    #[serde(rename = "type")]
    kind: Option<String>,
    error_percent: Option<f64>,
    max_stdev: Option<f64>,
    detection_threshold: Option<f64>,
    num_servers_to_exclude_from_threshold: Option<usize>,
    stability_threshold: Option<f64>,
}

fn require<T>(value: Option<T>, strategy: &str, param: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("strategy '{}' requires '{}'", strategy, param))
}

impl TryFrom<StrategyParams> for StrategyConfig {
    type Error = String;

    fn try_from(p: StrategyParams) -> Result<Self, Self::Error> {
        let kind = match p.kind.as_deref() {
            Some(kind) => kind,
            None if p.stability_threshold.is_some() => "stationary_rounds",
            None if p.max_stdev.is_some()
                && p.detection_threshold.is_some()
                && p.num_servers_to_exclude_from_threshold.is_some() =>
            {
                "early_termination"
            }
            None if p.max_stdev.is_some() && p.detection_threshold.is_some() => "outlier_threshold",
            None if p.max_stdev.is_some() => "bayesian_clustering",
            None if p.error_percent.is_some() => "frequency_threshold",
            None => {
                return Err("no completion strategy matches the given parameters; expected one of \
                     error_percent, max_stdev [+ detection_threshold [+ num_servers_to_exclude_from_threshold]], \
                     stability_threshold"
                    .to_string())
            }
        };

        let config = match kind {
            "frequency_threshold" => StrategyConfig::FrequencyThreshold {
                error_percent: require(p.error_percent, kind, "error_percent")?,
            },
            "baseline_subtracted" => StrategyConfig::BaselineSubtracted {
                error_percent: require(p.error_percent, kind, "error_percent")?,
            },
            "bayesian_clustering" => StrategyConfig::BayesianClustering {
                max_stdev: require(p.max_stdev, kind, "max_stdev")?,
            },
            "outlier_threshold" => StrategyConfig::OutlierThreshold {
                max_stdev: require(p.max_stdev, kind, "max_stdev")?,
                detection_threshold: require(p.detection_threshold, kind, "detection_threshold")?,
            },
            "early_termination" => StrategyConfig::EarlyTermination {
                max_stdev: require(p.max_stdev, kind, "max_stdev")?,
                detection_threshold: require(p.detection_threshold, kind, "detection_threshold")?,
                num_servers_to_exclude_from_threshold: require(
                    p.num_servers_to_exclude_from_threshold,
                    kind,
                    "num_servers_to_exclude_from_threshold",
                )?,
            },
            "stationary_rounds" => StrategyConfig::StationaryRounds {
                stability_threshold: require(p.stability_threshold, kind, "stability_threshold")?,
            },
            other => return Err(format!("unknown completion strategy '{}'", other)),
        };
        Ok(config)
    }
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::FrequencyThreshold { .. } => "frequency_threshold",
            StrategyConfig::BaselineSubtracted { .. } => "baseline_subtracted",
            StrategyConfig::BayesianClustering { .. } => "bayesian_clustering",
            StrategyConfig::OutlierThreshold { .. } => "outlier_threshold",
            StrategyConfig::EarlyTermination { .. } => "early_termination",
            StrategyConfig::StationaryRounds { .. } => "stationary_rounds",
        }
    }

    /// Range checks on the parameters
    pub fn validate(&self) -> Result<(), String> {
        let check_error_percent = |e: f64| {
            if e > 0.0 && e < 1.0 {
                Ok(())
            } else {
                Err(format!("error_percent must be in (0, 1), got {}", e))
            }
        };
        let check_max_stdev = |s: f64| {
            if s.is_finite() && s > 0.0 {
                Ok(())
            } else {
                Err(format!("max_stdev must be positive, got {}", s))
            }
        };
        let check_detection = |d: f64| {
            if d.is_finite() {
                Ok(())
            } else {
                Err(format!("detection_threshold must be finite, got {}", d))
            }
        };

        match *self {
            StrategyConfig::FrequencyThreshold { error_percent }
            | StrategyConfig::BaselineSubtracted { error_percent } => check_error_percent(error_percent),
            StrategyConfig::BayesianClustering { max_stdev } => check_max_stdev(max_stdev),
            StrategyConfig::OutlierThreshold {
                max_stdev,
                detection_threshold,
            }
            | StrategyConfig::EarlyTermination {
                max_stdev,
                detection_threshold,
                ..
            } => {
                check_max_stdev(max_stdev)?;
                check_detection(detection_threshold)
            }
            StrategyConfig::StationaryRounds { stability_threshold } => {
                if stability_threshold.is_finite() && stability_threshold > 0.0 {
                    Ok(())
                } else {
                    Err(format!("stability_threshold must be positive, got {}", stability_threshold))
                }
            }
        }
    }
}

/// Smoothed weight differences for the stationary-rounds strategy
#[derive(Debug, Clone, Default)]
pub struct StationaryRounds {
    stability_threshold: f64,
    smoothed: BTreeMap<ServerId, f64>,
    rounds_stationary: u32,
}

impl StationaryRounds {
    pub fn new(stability_threshold: f64) -> Self {
        Self {
            stability_threshold,
            ..Self::default()
        }
    }

    pub fn rounds_stationary(&self) -> u32 {
        self.rounds_stationary
    }

    fn evaluate(&mut self, stats: &AttackStats) -> Option<BTreeSet<ServerId>> {
        let mut moved = false;
        for (server, stat) in stats.servers() {
            let avg = self.smoothed.entry(server).or_insert(0.0);
            let step = (stat.weight - stat.baseline_weight) - *avg;
            *avg += SMOOTHING * step;
            if step.abs() > self.stability_threshold {
                moved = true;
            }
        }
        if moved {
            self.rounds_stationary = 0;
        }
        self.rounds_stationary += 1;

        if self.rounds_stationary < STATIONARY_ROUNDS_REQUIRED {
            return None;
        }
        let (servers, values): (Vec<ServerId>, Vec<f64>) = self.smoothed.iter().map(|(&s, &v)| (s, v)).unzip();
        high_cluster(&servers, &values)
    }
}

#[derive(Debug, Clone)]
pub enum CompletionStrategy {
    FrequencyThreshold {
        error_percent: f64,
    },
    BaselineSubtracted {
        error_percent: f64,
    },
    BayesianClustering {
        max_stdev: f64,
    },
    OutlierThreshold {
        max_stdev: f64,
        detection_threshold: f64,
    },
    EarlyTermination {
        max_stdev: f64,
        detection_threshold: f64,
        num_servers_to_exclude_from_threshold: usize,
    },
    StationaryRounds(StationaryRounds),
}

impl CompletionStrategy {
    pub fn new(config: &StrategyConfig) -> Result<Self, AttackError> {
        config.validate().map_err(AttackError::InvariantViolation)?;

        let strategy = match *config {
            StrategyConfig::FrequencyThreshold { error_percent } => {
                CompletionStrategy::FrequencyThreshold { error_percent }
            }
            StrategyConfig::BaselineSubtracted { error_percent } => {
                CompletionStrategy::BaselineSubtracted { error_percent }
            }
            StrategyConfig::BayesianClustering { max_stdev } => CompletionStrategy::BayesianClustering { max_stdev },
            StrategyConfig::OutlierThreshold {
                max_stdev,
                detection_threshold,
            } => CompletionStrategy::OutlierThreshold {
                max_stdev,
                detection_threshold,
            },
            StrategyConfig::EarlyTermination {
                max_stdev,
                detection_threshold,
                num_servers_to_exclude_from_threshold,
            } => CompletionStrategy::EarlyTermination {
                max_stdev,
                detection_threshold,
                num_servers_to_exclude_from_threshold,
            },
            StrategyConfig::StationaryRounds { stability_threshold } => {
                CompletionStrategy::StationaryRounds(StationaryRounds::new(stability_threshold))
            }
        };
        Ok(strategy)
    }

    /// Rate of baseline sampling in units of `1 / max_msg_delivery_time`,
    /// or `None` if the strategy does not use a baseline.
    pub fn baseline_rate_factor(&self) -> Option<f64> {
        match self {
            CompletionStrategy::FrequencyThreshold { .. } => None,
            CompletionStrategy::BaselineSubtracted { .. } | CompletionStrategy::StationaryRounds(_) => Some(2.0),
            CompletionStrategy::BayesianClustering { .. }
            | CompletionStrategy::OutlierThreshold { .. }
            | CompletionStrategy::EarlyTermination { .. } => Some(3.0),
        }
    }

    /// Whether verdicts come from Beta posteriors (and per-server signals are meaningful)
    pub fn uses_posteriors(&self) -> bool {
        matches!(
            self,
            CompletionStrategy::BayesianClustering { .. }
                | CompletionStrategy::OutlierThreshold { .. }
                | CompletionStrategy::EarlyTermination { .. }
        )
    }

    /// Verdict on the target set, or `None` to keep accumulating.
    pub fn evaluate(&mut self, stats: &AttackStats) -> Option<BTreeSet<ServerId>> {
        if stats.rounds() < MIN_ROUNDS {
            return None;
        }

        let verdict = match self {
            CompletionStrategy::FrequencyThreshold { error_percent } => {
                let weights = stats.servers().map(|(server, stat)| (stat.weight, server)).collect();
                frequency_threshold(weights, *error_percent)
            }
            CompletionStrategy::BaselineSubtracted { error_percent } => {
                let weights = stats
                    .servers()
                    .map(|(server, stat)| ((stat.weight - stat.baseline_weight).max(0.0), server))
                    .collect();
                frequency_threshold(weights, *error_percent)
            }
            CompletionStrategy::BayesianClustering { max_stdev } => {
                if num_unconverged(stats, *max_stdev) > 0 {
                    return None;
                }
                let (servers, values): (Vec<ServerId>, Vec<f64>) =
                    stats.signals().into_iter().map(|(s, signal)| (s, signal.abs())).unzip();
                high_cluster(&servers, &values)
            }
            CompletionStrategy::OutlierThreshold {
                max_stdev,
                detection_threshold,
            } => {
                if num_unconverged(stats, *max_stdev) > 0 {
                    return None;
                }
                Some(outliers(stats, *detection_threshold))
            }
            CompletionStrategy::EarlyTermination {
                max_stdev,
                detection_threshold,
                num_servers_to_exclude_from_threshold,
            } => {
                if num_unconverged(stats, *max_stdev) > *num_servers_to_exclude_from_threshold {
                    return None;
                }
                Some(outliers(stats, *detection_threshold))
            }
            CompletionStrategy::StationaryRounds(state) => state.evaluate(stats),
        };

        verdict.filter(|targets| !targets.is_empty())
    }
}

/// Find `m` such that exactly the top `m` weights sit around `1/m`.
fn frequency_threshold(mut weights: Vec<(f64, ServerId)>, error_percent: f64) -> Option<BTreeSet<ServerId>> {
    weights.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let n = weights.len();
    let max_weight = weights.last()?.0;

    for m in (1..=n).rev() {
        let target = 1.0 / m as f64;
        let low = target * (1.0 - error_percent);
        let high = target * (1.0 + error_percent);
        if !(low <= max_weight && max_weight <= high) {
            continue;
        }

        let left = weights.partition_point(|(w, _)| *w < low);
        if n - left == m {
            return Some(weights[left..].iter().map(|&(_, server)| server).collect());
        }
    }
    None
}

/// Number of servers whose attack or baseline posterior is still too wide.
/// A server never seen by one of the samplers counts as unconverged.
fn num_unconverged(stats: &AttackStats, max_stdev: f64) -> usize {
    let converged = |posterior: Option<crate::prob::Beta>| {
        posterior
            .and_then(|beta| beta.stdev())
            .is_some_and(|stdev| !stdev.is_nan() && stdev <= max_stdev)
    };

    stats
        .servers()
        .filter(|&(server, _)| {
            !converged(stats.attack_posterior(server)) || !converged(stats.baseline_posterior(server))
        })
        .count()
}

fn outliers(stats: &AttackStats, detection_threshold: f64) -> BTreeSet<ServerId> {
    stats
        .signals()
        .into_iter()
        .filter(|&(_, signal)| signal >= detection_threshold)
        .map(|(server, _)| server)
        .collect()
}

fn high_cluster(servers: &[ServerId], values: &[f64]) -> Option<BTreeSet<ServerId>> {
    let clusters = two_means(values)?;
    Some(
        servers
            .iter()
            .zip(&clusters.is_high)
            .filter(|(_, &high)| high)
            .map(|(&server, _)| server)
            .collect(),
    )
}
