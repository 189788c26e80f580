use anyhow::{anyhow, bail, Result};
use statrs::distribution::{Beta as BetaDistribution, ContinuousCDF};
use statrs::function::beta::ln_beta;
use statrs::function::gamma::digamma;

/// A Beta distribution over a success probability.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Beta {
    pub alpha: f64,
    pub beta: f64,
}

impl Beta {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Method-of-moments fit. `None` when the moments admit no Beta
    /// (degenerate mean, zero variance or variance too large).
    pub fn from_moments(mean: f64, variance: f64) -> Option<Self> {
        if !(mean > 0.0 && mean < 1.0) || !(variance > 1e-12) {
            return None;
        }
        let common = mean * (1.0 - mean) / variance - 1.0;
        if common <= 0.0 {
            return None;
        }
        Some(Beta::new(mean * common, (1.0 - mean) * common))
    }

    /// Method-of-moments fit on observed success ratios.
    pub fn from_ratios(ratios: &[f64]) -> Option<Self> {
        if ratios.is_empty() {
            return None;
        }
        let count = ratios.len() as f64;
        let mean = ratios.iter().sum::<f64>() / count;
        let variance = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / count;
        Beta::from_moments(mean, variance)
    }

    pub fn is_valid(&self) -> bool {
        self.alpha.is_finite() && self.beta.is_finite() && self.alpha > 0.0 && self.beta > 0.0
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let numerator = self.alpha * self.beta;
        let denominator = (self.alpha + self.beta).powf(2.0) * (self.alpha + self.beta + 1.0);
        numerator / denominator
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Conjugate update with `hits` successes out of `at_bats` trials.
    pub fn posterior(&self, hits: u64, at_bats: u64) -> Beta {
        Beta::new(
            self.alpha + hits as f64,
            self.beta + at_bats.saturating_sub(hits) as f64,
        )
    }

    /// Beta-binomial log marginal likelihood of `hits` out of `at_bats`,
    /// without the binomial coefficient.
    pub fn log_marginal(&self, hits: u64, at_bats: u64) -> f64 {
        let posterior = self.posterior(hits, at_bats);
        ln_beta(posterior.alpha, posterior.beta) - ln_beta(self.alpha, self.beta)
    }

    /// Partial derivatives of `log_marginal` with respect to alpha and beta.
    pub fn log_marginal_gradient(&self, hits: u64, at_bats: u64) -> (f64, f64) {
        let (h, n) = (hits as f64, at_bats as f64);
        let total = digamma(self.alpha + self.beta) - digamma(n + self.alpha + self.beta);
        (
            digamma(h + self.alpha) - digamma(self.alpha) + total,
            digamma(n - h + self.beta) - digamma(self.beta) + total,
        )
    }

    fn distribution(&self) -> Result<BetaDistribution> {
        BetaDistribution::new(self.alpha, self.beta)
            .map_err(|e| anyhow!("Invalid Beta({}, {}): {}", self.alpha, self.beta, e))
    }

    /// P(X <= x)
    pub fn cdf(&self, x: f64) -> Result<f64> {
        Ok(self.distribution()?.cdf(x))
    }

    pub fn quantile(&self, p: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&p) {
            bail!("Quantile probability must be in [0, 1], got {}", p);
        }
        Ok(self.distribution()?.inverse_cdf(p))
    }

    /// Equal-tailed credible interval holding `level` of the mass.
    pub fn credible_interval(&self, level: f64) -> Result<(f64, f64)> {
        if !(level > 0.0 && level < 1.0) {
            bail!("Credible level must be in (0, 1), got {}", level);
        }
        let tail = (1.0 - level) / 2.0;
        Ok((self.quantile(tail)?, self.quantile(1.0 - tail)?))
    }
}
