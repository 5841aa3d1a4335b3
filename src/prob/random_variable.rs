//! Sampling and closed-form distributions.
//!
//! Every distribution samples from a generator passed in by the caller, so a
//! replica seeded once replays the same trajectory. Closed forms come from
//! `statrs`, sampling from `rand_distr`.

use std::fmt;

use rand::distributions::Uniform as UniformSampler;
use rand::RngCore;
use rand_distr::Distribution;
use statrs::distribution::{Continuous, ContinuousCDF, DiscreteCDF};
use statrs::statistics::Distribution as Moments;

use super::DistributionError;

/// Common contract of every distribution used by the simulation.
///
/// `mean` and `stdev` return `None` when the closed form is undefined; callers
/// treat that the same way as a NaN.
pub trait RandomVariable: fmt::Debug + Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> f64;

    fn cdf(&self, x: f64) -> f64;

    fn tail_prob(&self, x: f64) -> f64 {
        1.0 - self.cdf(x)
    }

    fn mean(&self) -> Option<f64>;

    fn stdev(&self) -> Option<f64>;

    fn min_value(&self) -> f64;

    fn max_value(&self) -> f64;
}

fn invalid(distribution: &'static str, reason: impl Into<String>) -> DistributionError {
    DistributionError::InvalidParameter {
        distribution,
        reason: reason.into(),
    }
}

/// Degenerate distribution, used for zero-delay networks and fixed idle times
#[derive(Debug, Clone, Copy)]
pub struct Constant {
    value: f64,
}

impl Constant {
    pub fn new(value: f64) -> Result<Self, DistributionError> {
        if !value.is_finite() {
            return Err(invalid("Constant", format!("value must be finite, got {}", value)));
        }
        Ok(Self { value })
    }
}

impl RandomVariable for Constant {
    fn sample(&self, _rng: &mut dyn RngCore) -> f64 {
        self.value
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < self.value {
            0.0
        } else {
            1.0
        }
    }

    fn mean(&self) -> Option<f64> {
        Some(self.value)
    }

    fn stdev(&self) -> Option<f64> {
        Some(0.0)
    }

    fn min_value(&self) -> f64 {
        self.value
    }

    fn max_value(&self) -> f64 {
        self.value
    }
}

/// Exponential distribution shifted right by `offset`
#[derive(Debug, Clone)]
pub struct Exponential {
    rate: f64,
    offset: f64,
    sampler: rand_distr::Exp<f64>,
}

impl Exponential {
    pub fn new(rate: f64, offset: f64) -> Result<Self, DistributionError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(invalid("Exponential", format!("rate must be positive, got {}", rate)));
        }
        if !offset.is_finite() {
            return Err(invalid("Exponential", format!("offset must be finite, got {}", offset)));
        }
        let sampler = rand_distr::Exp::new(rate).map_err(|e| invalid("Exponential", e.to_string()))?;

        Ok(Self { rate, offset, sampler })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl RandomVariable for Exponential {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.offset + self.sampler.sample(rng)
    }

    fn cdf(&self, x: f64) -> f64 {
        if x <= self.offset {
            return 0.0;
        }
        1.0 - (-self.rate * (x - self.offset)).exp()
    }

    fn tail_prob(&self, x: f64) -> f64 {
        if x <= self.offset {
            return 1.0;
        }
        (-self.rate * (x - self.offset)).exp()
    }

    fn mean(&self) -> Option<f64> {
        Some(self.offset + 1.0 / self.rate)
    }

    fn stdev(&self) -> Option<f64> {
        Some(1.0 / self.rate)
    }

    fn min_value(&self) -> f64 {
        self.offset
    }

    fn max_value(&self) -> f64 {
        f64::INFINITY
    }
}

/// Continuous uniform distribution on `[min, max]`
#[derive(Debug, Clone)]
pub struct Uniform {
    min: f64,
    max: f64,
    sampler: UniformSampler<f64>,
}

impl Uniform {
    pub fn new(min: f64, max: f64) -> Result<Self, DistributionError> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(invalid("Uniform", format!("need finite min <= max, got [{}, {}]", min, max)));
        }
        Ok(Self {
            min,
            max,
            sampler: UniformSampler::new_inclusive(min, max),
        })
    }
}

impl RandomVariable for Uniform {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < self.min {
            0.0
        } else if x >= self.max {
            1.0
        } else {
            (x - self.min) / (self.max - self.min)
        }
    }

    fn mean(&self) -> Option<f64> {
        Some((self.min + self.max) / 2.0)
    }

    fn stdev(&self) -> Option<f64> {
        Some((self.max - self.min) / 12f64.sqrt())
    }

    fn min_value(&self) -> f64 {
        self.min
    }

    fn max_value(&self) -> f64 {
        self.max
    }
}

/// Uniform distribution over the integers `min..=max`
#[derive(Debug, Clone)]
pub struct DiscreteUniform {
    min: i64,
    max: i64,
    sampler: UniformSampler<i64>,
}

impl DiscreteUniform {
    pub fn new(min: i64, max: i64) -> Result<Self, DistributionError> {
        if min > max {
            return Err(invalid("DiscreteUniform", format!("need min <= max, got [{}, {}]", min, max)));
        }
        Ok(Self {
            min,
            max,
            sampler: UniformSampler::new_inclusive(min, max),
        })
    }

    fn num_values(&self) -> f64 {
        (self.max - self.min + 1) as f64
    }
}

impl RandomVariable for DiscreteUniform {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng) as f64
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < self.min as f64 {
            0.0
        } else if x >= self.max as f64 {
            1.0
        } else {
            (x.floor() - self.min as f64 + 1.0) / self.num_values()
        }
    }

    fn mean(&self) -> Option<f64> {
        Some((self.min + self.max) as f64 / 2.0)
    }

    fn stdev(&self) -> Option<f64> {
        let n = self.num_values();
        Some(((n * n - 1.0) / 12.0).sqrt())
    }

    fn min_value(&self) -> f64 {
        self.min as f64
    }

    fn max_value(&self) -> f64 {
        self.max as f64
    }
}

#[derive(Debug, Clone)]
pub struct Normal {
    sampler: rand_distr::Normal<f64>,
    closed: statrs::distribution::Normal,
}

impl Normal {
    pub fn new(mean: f64, std_dev: f64) -> Result<Self, DistributionError> {
        if !(std_dev.is_finite() && std_dev > 0.0) || !mean.is_finite() {
            return Err(invalid("Normal", format!("need finite mean and std_dev > 0, got ({}, {})", mean, std_dev)));
        }
        let sampler = rand_distr::Normal::new(mean, std_dev).map_err(|e| invalid("Normal", e.to_string()))?;
        let closed =
            statrs::distribution::Normal::new(mean, std_dev).map_err(|e| invalid("Normal", e.to_string()))?;

        Ok(Self { sampler, closed })
    }
}

impl RandomVariable for Normal {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn cdf(&self, x: f64) -> f64 {
        self.closed.cdf(x)
    }

    fn tail_prob(&self, x: f64) -> f64 {
        self.closed.sf(x)
    }

    fn mean(&self) -> Option<f64> {
        Moments::mean(&self.closed)
    }

    fn stdev(&self) -> Option<f64> {
        Moments::std_dev(&self.closed)
    }

    fn min_value(&self) -> f64 {
        f64::NEG_INFINITY
    }

    fn max_value(&self) -> f64 {
        f64::INFINITY
    }
}

/// Normal distribution truncated to `[0, mean + 10 * std_dev]`.
///
/// The finite upper end gives network delays a usable `max_value`.
#[derive(Debug, Clone)]
pub struct TruncatedNormal {
    mu: f64,
    sigma: f64,
    upper: f64,
    normalizer: f64,
    sampler: rand_distr::Normal<f64>,
    standard: statrs::distribution::Normal,
}

impl TruncatedNormal {
    const MAX_REJECTIONS: usize = 10_000;

    pub fn new(mu: f64, sigma: f64) -> Result<Self, DistributionError> {
        if !(sigma.is_finite() && sigma > 0.0) || !mu.is_finite() {
            return Err(invalid(
                "TruncatedNormal",
                format!("need finite mean and std_dev > 0, got ({}, {})", mu, sigma),
            ));
        }
        let upper = mu + 10.0 * sigma;
        let standard =
            statrs::distribution::Normal::new(0.0, 1.0).map_err(|e| invalid("TruncatedNormal", e.to_string()))?;
        let normalizer = standard.cdf((upper - mu) / sigma) - standard.cdf(-mu / sigma);
        if upper <= 0.0 || normalizer <= 1e-12 {
            return Err(invalid(
                "TruncatedNormal",
                format!("no probability mass on [0, {}] for mean {} and std_dev {}", upper, mu, sigma),
            ));
        }
        let sampler =
            rand_distr::Normal::new(mu, sigma).map_err(|e| invalid("TruncatedNormal", e.to_string()))?;

        Ok(Self {
            mu,
            sigma,
            upper,
            normalizer,
            sampler,
            standard,
        })
    }

    fn alpha(&self) -> f64 {
        -self.mu / self.sigma
    }

    fn beta(&self) -> f64 {
        (self.upper - self.mu) / self.sigma
    }
}

impl RandomVariable for TruncatedNormal {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        for _ in 0..Self::MAX_REJECTIONS {
            let x = self.sampler.sample(rng);
            if (0.0..=self.upper).contains(&x) {
                return x;
            }
        }
        self.sampler.sample(rng).clamp(0.0, self.upper)
    }

    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            0.0
        } else if x >= self.upper {
            1.0
        } else {
            (self.standard.cdf((x - self.mu) / self.sigma) - self.standard.cdf(self.alpha())) / self.normalizer
        }
    }

    fn mean(&self) -> Option<f64> {
        let shift = (self.standard.pdf(self.alpha()) - self.standard.pdf(self.beta())) / self.normalizer;
        Some(self.mu + self.sigma * shift)
    }

    fn stdev(&self) -> Option<f64> {
        let (a, b) = (self.alpha(), self.beta());
        let (pdf_a, pdf_b) = (self.standard.pdf(a), self.standard.pdf(b));
        let shift = (pdf_a - pdf_b) / self.normalizer;
        let var = self.sigma * self.sigma * (1.0 + (a * pdf_a - b * pdf_b) / self.normalizer - shift * shift);
        (var >= 0.0).then(|| var.sqrt())
    }

    fn min_value(&self) -> f64 {
        0.0
    }

    fn max_value(&self) -> f64 {
        self.upper
    }
}

#[derive(Debug, Clone)]
pub struct Poisson {
    rate: f64,
    sampler: rand_distr::Poisson<f64>,
    closed: statrs::distribution::Poisson,
}

impl Poisson {
    pub fn new(rate: f64) -> Result<Self, DistributionError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(invalid("Poisson", format!("rate must be positive, got {}", rate)));
        }
        let sampler = rand_distr::Poisson::new(rate).map_err(|e| invalid("Poisson", e.to_string()))?;
        let closed = statrs::distribution::Poisson::new(rate).map_err(|e| invalid("Poisson", e.to_string()))?;

        Ok(Self { rate, sampler, closed })
    }
}

impl RandomVariable for Poisson {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        self.closed.cdf(x.floor() as u64)
    }

    fn tail_prob(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 1.0;
        }
        self.closed.sf(x.floor() as u64)
    }

    fn mean(&self) -> Option<f64> {
        Some(self.rate)
    }

    fn stdev(&self) -> Option<f64> {
        Some(self.rate.sqrt())
    }

    fn min_value(&self) -> f64 {
        0.0
    }

    fn max_value(&self) -> f64 {
        f64::INFINITY
    }
}

#[derive(Debug, Clone)]
pub struct Binomial {
    n: u64,
    p: f64,
    sampler: rand_distr::Binomial,
    closed: statrs::distribution::Binomial,
}

impl Binomial {
    pub fn new(n: u64, p: f64) -> Result<Self, DistributionError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid("Binomial", format!("p must be in [0, 1], got {}", p)));
        }
        let sampler = rand_distr::Binomial::new(n, p).map_err(|e| invalid("Binomial", e.to_string()))?;
        let closed = statrs::distribution::Binomial::new(p, n).map_err(|e| invalid("Binomial", e.to_string()))?;

        Ok(Self { n, p, sampler, closed })
    }
}

impl RandomVariable for Binomial {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng) as f64
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            0.0
        } else if x >= self.n as f64 {
            1.0
        } else {
            self.closed.cdf(x.floor() as u64)
        }
    }

    fn mean(&self) -> Option<f64> {
        Some(self.n as f64 * self.p)
    }

    fn stdev(&self) -> Option<f64> {
        Some((self.n as f64 * self.p * (1.0 - self.p)).sqrt())
    }

    fn min_value(&self) -> f64 {
        0.0
    }

    fn max_value(&self) -> f64 {
        self.n as f64
    }
}

/// Beta distribution on `[0, 1]`.
///
/// The disclosure attack builds one per server and round as a posterior over
/// "probability of appearing in a sample".
#[derive(Debug, Clone)]
pub struct Beta {
    sampler: rand_distr::Beta<f64>,
    closed: statrs::distribution::Beta,
}

impl Beta {
    pub fn new(a: f64, b: f64) -> Result<Self, DistributionError> {
        if !(a.is_finite() && a > 0.0 && b.is_finite() && b > 0.0) {
            return Err(invalid("Beta", format!("shapes must be positive, got a={} b={}", a, b)));
        }
        let sampler = rand_distr::Beta::new(a, b).map_err(|e| invalid("Beta", e.to_string()))?;
        let closed = statrs::distribution::Beta::new(a, b).map_err(|e| invalid("Beta", e.to_string()))?;

        Ok(Self { sampler, closed })
    }

    /// Posterior after `hits` successes in `trials` trials under a flat prior.
    ///
    /// Both shapes get `+1`, so a server seen in zero or in every trial still
    /// has a finite, non-zero deviation.
    pub fn posterior(hits: u64, trials: u64) -> Result<Self, DistributionError> {
        if hits > trials {
            return Err(invalid("Beta", format!("hits {} exceed trials {}", hits, trials)));
        }
        Self::new(hits as f64 + 1.0, (trials - hits) as f64 + 1.0)
    }
}

impl RandomVariable for Beta {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            0.0
        } else if x >= 1.0 {
            1.0
        } else {
            self.closed.cdf(x)
        }
    }

    fn mean(&self) -> Option<f64> {
        Moments::mean(&self.closed)
    }

    fn stdev(&self) -> Option<f64> {
        Moments::std_dev(&self.closed)
    }

    fn min_value(&self) -> f64 {
        0.0
    }

    fn max_value(&self) -> f64 {
        1.0
    }
}
