//! Probability distributions and on-demand sampling.
//!
//! Parametric distributions wrap the corresponding `statrs` type, which
//! validates parameters at construction and samples through `rand`.
//! Arithmetic on distributions produces a [`Dist::SampleSet`].

use std::rc::Rc;

use rand::distributions::Distribution as _;
use rand::rngs::StdRng;
use rand::Rng;
use statrs::distribution::{Beta, LogNormal, Normal, Triangular, Uniform};
use statrs::statistics::{Distribution as _, Statistics};

use crate::error::EvalError;

/// z-score of the 95th percentile; `a to b` is a 90% credible interval.
const Z_95: f64 = 1.6448536269514722;

#[derive(Debug, Clone)]
pub enum Dist {
    Normal(Normal),
    Lognormal(LogNormal),
    Uniform(Uniform),
    Beta(Beta),
    Triangular(Triangular),
    PointMass(f64),
    SampleSet(Rc<Vec<f64>>),
}

impl Dist {
    pub fn normal(mean: f64, stdev: f64) -> Result<Dist, EvalError> {
        Normal::new(mean, stdev)
            .map(Dist::Normal)
            .map_err(|e| EvalError::invalid_dist(format!("normal({}, {}): {}", mean, stdev, e)))
    }

    pub fn lognormal(mu: f64, sigma: f64) -> Result<Dist, EvalError> {
        LogNormal::new(mu, sigma)
            .map(Dist::Lognormal)
            .map_err(|e| EvalError::invalid_dist(format!("lognormal({}, {}): {}", mu, sigma, e)))
    }

    pub fn uniform(low: f64, high: f64) -> Result<Dist, EvalError> {
        if low.is_nan() || high.is_nan() || low >= high {
            return Err(EvalError::invalid_dist(format!(
                "uniform({}, {}): low must be less than high",
                low, high
            )));
        }
        Uniform::new(low, high)
            .map(Dist::Uniform)
            .map_err(|e| EvalError::invalid_dist(format!("uniform({}, {}): {}", low, high, e)))
    }

    pub fn beta(alpha: f64, beta: f64) -> Result<Dist, EvalError> {
        Beta::new(alpha, beta)
            .map(Dist::Beta)
            .map_err(|e| EvalError::invalid_dist(format!("beta({}, {}): {}", alpha, beta, e)))
    }

    pub fn triangular(min: f64, mode: f64, max: f64) -> Result<Dist, EvalError> {
        Triangular::new(min, max, mode).map(Dist::Triangular).map_err(|e| {
            EvalError::invalid_dist(format!("triangular({}, {}, {}): {}", min, mode, max, e))
        })
    }

    pub fn point_mass(value: f64) -> Result<Dist, EvalError> {
        if !value.is_finite() {
            return Err(EvalError::invalid_dist(format!(
                "pointMass({}): value must be finite",
                value
            )));
        }
        Ok(Dist::PointMass(value))
    }

    /// `low to high`: lognormal when both bounds are positive, normal otherwise.
    pub fn credible_interval(low: f64, high: f64) -> Result<Dist, EvalError> {
        if low.is_nan() || high.is_nan() || low >= high {
            return Err(EvalError::invalid_dist(format!(
                "{} to {}: low value must be less than high value",
                low, high
            )));
        }
        if low > 0.0 {
            let (ln_low, ln_high) = (low.ln(), high.ln());
            Dist::lognormal((ln_low + ln_high) / 2.0, (ln_high - ln_low) / (2.0 * Z_95))
        } else {
            Dist::normal((low + high) / 2.0, (high - low) / (2.0 * Z_95))
        }
    }

    pub fn sample_set(samples: Vec<f64>) -> Result<Dist, EvalError> {
        if samples.is_empty() {
            return Err(EvalError::invalid_dist("sample set must not be empty"));
        }
        Ok(Dist::SampleSet(Rc::new(samples)))
    }

    /// Draw `n` samples. A sample set yields its first `n` samples when it
    /// holds enough, and resamples with replacement otherwise.
    pub fn sample_n<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        match self {
            Dist::Normal(d) => (0..n).map(|_| d.sample(rng)).collect(),
            Dist::Lognormal(d) => (0..n).map(|_| d.sample(rng)).collect(),
            Dist::Uniform(d) => (0..n).map(|_| d.sample(rng)).collect(),
            Dist::Beta(d) => (0..n).map(|_| d.sample(rng)).collect(),
            Dist::Triangular(d) => (0..n).map(|_| d.sample(rng)).collect(),
            Dist::PointMass(v) => vec![*v; n],
            Dist::SampleSet(samples) => {
                if n <= samples.len() {
                    samples[..n].to_vec()
                } else {
                    (0..n)
                        .map(|_| samples[rng.gen_range(0..samples.len())])
                        .collect()
                }
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Dist::PointMass(v) => *v,
            Dist::SampleSet(samples) => samples[rng.gen_range(0..samples.len())],
            other => other.sample_n(1, rng)[0],
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Dist::Normal(d) => d.mean(),
            Dist::Lognormal(d) => d.mean(),
            Dist::Uniform(d) => d.mean(),
            Dist::Beta(d) => d.mean(),
            Dist::Triangular(d) => d.mean(),
            Dist::PointMass(v) => Some(*v),
            Dist::SampleSet(samples) => Some(Statistics::mean(samples.iter())),
        }
        .unwrap_or(f64::NAN)
    }

    pub fn stdev(&self) -> f64 {
        match self {
            Dist::Normal(d) => d.std_dev(),
            Dist::Lognormal(d) => d.std_dev(),
            Dist::Uniform(d) => d.std_dev(),
            Dist::Beta(d) => d.std_dev(),
            Dist::Triangular(d) => d.std_dev(),
            Dist::PointMass(_) => Some(0.0),
            Dist::SampleSet(samples) => Some(Statistics::std_dev(samples.iter())),
        }
        .unwrap_or(f64::NAN)
    }
}

/// Source of samples for distribution values.
///
/// Engines implement this so that samples drawn after evaluation continue
/// the engine's random stream; a bare `StdRng` works for standalone use.
pub trait Sampler {
    fn sample_n(&mut self, dist: &Dist, n: usize) -> Vec<f64>;
}

impl Sampler for StdRng {
    fn sample_n(&mut self, dist: &Dist, n: usize) -> Vec<f64> {
        dist.sample_n(n, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn sample_n_returns_exactly_n() {
        let d = Dist::normal(0.0, 1.0).unwrap();
        assert_eq!(d.sample_n(1000, &mut rng()).len(), 1000);
        assert!(d.sample_n(0, &mut rng()).is_empty());
    }

    #[test]
    fn same_seed_same_samples() {
        let d = Dist::credible_interval(1.0, 10.0).unwrap();
        assert_eq!(d.sample_n(50, &mut rng()), d.sample_n(50, &mut rng()));
    }

    #[test]
    fn positive_interval_is_lognormal() {
        assert!(matches!(
            Dist::credible_interval(1.0, 10.0).unwrap(),
            Dist::Lognormal(_)
        ));
        assert!(matches!(
            Dist::credible_interval(-1.0, 10.0).unwrap(),
            Dist::Normal(_)
        ));
    }

    #[test]
    fn credible_interval_covers_ninety_percent() {
        let d = Dist::credible_interval(-10.0, 10.0).unwrap();
        let samples = d.sample_n(20_000, &mut rng());
        let inside = samples.iter().filter(|x| x.abs() <= 10.0).count() as f64;
        let share = inside / samples.len() as f64;
        assert!((share - 0.9).abs() < 0.02, "share inside = {}", share);
    }

    #[test]
    fn inverted_bounds_rejected() {
        assert!(Dist::credible_interval(5.0, 1.0).is_err());
        assert!(Dist::uniform(3.0, 3.0).is_err());
    }

    #[test]
    fn negative_stdev_rejected() {
        let err = Dist::normal(0.0, -1.0).unwrap_err();
        assert!(err.to_string().starts_with("invalid distribution: normal(0, -1)"));
    }

    #[test]
    fn sample_set_prefix_then_resample() {
        let d = Dist::sample_set(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(d.sample_n(2, &mut rng()), vec![1.0, 2.0]);
        let more = d.sample_n(10, &mut rng());
        assert_eq!(more.len(), 10);
        assert!(more.iter().all(|x| [1.0, 2.0, 3.0].contains(x)));
    }

    #[test]
    fn analytic_moments() {
        assert_eq!(Dist::normal(3.0, 2.0).unwrap().mean(), 3.0);
        assert_eq!(Dist::normal(3.0, 2.0).unwrap().stdev(), 2.0);
        assert_eq!(Dist::uniform(0.0, 10.0).unwrap().mean(), 5.0);
        assert_eq!(Dist::point_mass(4.0).unwrap().stdev(), 0.0);
        assert_eq!(Dist::sample_set(vec![1.0, 2.0, 3.0]).unwrap().mean(), 2.0);
    }
}
