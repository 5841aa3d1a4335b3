//! Random variables used for delays, idle times and request sizes.
//!
//! Distributions are declared in YAML as tagged maps and turned into shared
//! trait objects with [`DistributionConfig::build`].

pub mod random_variable;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use random_variable::{
    Beta, Binomial, Constant, DiscreteUniform, Exponential, Normal, Poisson, RandomVariable, TruncatedNormal,
    Uniform,
};

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("Invalid {distribution} parameter: {reason}")]
    InvalidParameter {
        distribution: &'static str,
        reason: String,
    },
}

/// Distribution as written in an experiment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionConfig {
    Constant {
        value: f64,
    },
    Exponential {
        rate: f64,
        #[serde(default)]
        offset: f64,
    },
    Uniform {
        min: f64,
        max: f64,
    },
    DiscreteUniform {
        min: i64,
        max: i64,
    },
    Normal {
        mean: f64,
        std_dev: f64,
    },
    TruncatedNormal {
        mean: f64,
        std_dev: f64,
    },
    Poisson {
        rate: f64,
    },
    Binomial {
        n: u64,
        p: f64,
    },
    Beta {
        a: f64,
        b: f64,
    },
}

impl DistributionConfig {
    pub fn build(&self) -> Result<Arc<dyn RandomVariable>, DistributionError> {
        let rv: Arc<dyn RandomVariable> = match *self {
            DistributionConfig::Constant { value } => Arc::new(Constant::new(value)?),
            DistributionConfig::Exponential { rate, offset } => Arc::new(Exponential::new(rate, offset)?),
            DistributionConfig::Uniform { min, max } => Arc::new(Uniform::new(min, max)?),
            DistributionConfig::DiscreteUniform { min, max } => Arc::new(DiscreteUniform::new(min, max)?),
            DistributionConfig::Normal { mean, std_dev } => Arc::new(Normal::new(mean, std_dev)?),
            DistributionConfig::TruncatedNormal { mean, std_dev } => {
                Arc::new(TruncatedNormal::new(mean, std_dev)?)
            }
            DistributionConfig::Poisson { rate } => Arc::new(Poisson::new(rate)?),
            DistributionConfig::Binomial { n, p } => Arc::new(Binomial::new(n, p)?),
            DistributionConfig::Beta { a, b } => Arc::new(Beta::new(a, b)?),
        };
        Ok(rv)
    }

    /// Upper end of the support, without building the sampler.
    pub fn max_value(&self) -> Result<f64, DistributionError> {
        Ok(self.build()?.max_value())
    }
}
