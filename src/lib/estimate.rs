use crate::beta::Beta;
use crate::player::BattingCounts;
use crate::prior::FittedPrior;
use anyhow::{bail, Result};
use itertools::Itertools;
use log::{debug, info};
use ordered_float::OrderedFloat;

#[derive(Debug, Clone, PartialEq)]
pub struct EstimationConfig {
    /// Credible level of the per-player intervals
    pub level: f64,
    /// Batting average the one-sided posterior test is run against
    pub threshold: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            level: 0.95,
            threshold: 0.3,
        }
    }
}

impl EstimationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.level > 0.0 && self.level < 1.0) {
            bail!("Credible level must be in (0, 1), got {}", self.level);
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            bail!("Test threshold must be in (0, 1), got {}", self.threshold);
        }
        Ok(())
    }
}

/// Empirical-Bayes estimates for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRecord {
    pub player_id: String,
    pub hits: u64,
    pub at_bats: u64,
    pub true_p: Option<f64>,
    pub raw: f64,
    pub shrunken: f64,
    pub posterior: Beta,
    pub low: f64,
    pub high: f64,
    pub level: f64,
    /// Posterior probability that the true average is below the threshold
    pub pep: f64,
    pub qvalue: f64,
}

impl EstimateRecord {
    /// Rederive the interval bounds at another credible level.
    pub fn recompute_interval(&mut self, level: f64) -> Result<()> {
        let (low, high) = self.posterior.credible_interval(level)?;
        self.low = low;
        self.high = high;
        self.level = level;
        Ok(())
    }

    /// Whether the interval holds the true average, if one is known.
    pub fn covers_truth(&self) -> Option<bool> {
        self.true_p.map(|p| self.low <= p && p <= self.high)
    }
}

pub fn estimate<T: BattingCounts>(
    records: &[T],
    prior: &FittedPrior,
    config: &EstimationConfig,
) -> Result<Vec<EstimateRecord>> {
    config.validate()?;
    let mut estimates = Vec::with_capacity(records.len());
    for record in records {
        let (hits, at_bats) = (record.hits(), record.at_bats());
        if at_bats == 0 || hits > at_bats {
            bail!(
                "Cannot estimate player {} with {} hits in {} at-bats",
                record.player_id(),
                hits,
                at_bats
            );
        }
        let player_prior = prior.beta_for(at_bats);
        if !player_prior.is_valid() {
            bail!(
                "Prior for player {} is not a proper Beta: α = {}, β = {}",
                record.player_id(),
                player_prior.alpha,
                player_prior.beta
            );
        }
        let posterior = player_prior.posterior(hits, at_bats);
        let (low, high) = posterior.credible_interval(config.level)?;
        estimates.push(EstimateRecord {
            player_id: record.player_id().to_string(),
            hits,
            at_bats,
            true_p: record.true_p(),
            raw: hits as f64 / at_bats as f64,
            shrunken: posterior.mean(),
            posterior,
            low,
            high,
            level: config.level,
            pep: posterior.cdf(config.threshold)?,
            qvalue: f64::NAN,
        });
    }
    add_qvalues(&mut estimates);
    debug!("Estimated {} players", estimates.len());
    Ok(estimates)
}

/// q-value of a player: mean posterior error probability over every player
/// ranked at least as confidently above the threshold.
pub fn add_qvalues(records: &mut [EstimateRecord]) {
    let order = (0..records.len())
        .sorted_by_key(|&i| OrderedFloat(records[i].pep))
        .collect::<Vec<usize>>();
    let mut cumulative = 0.0;
    for (rank, i) in order.into_iter().enumerate() {
        cumulative += records[i].pep;
        records[i].qvalue = cumulative / (rank + 1) as f64;
    }
}

/// Players admitted at `q <= target_fdr`.
pub fn discoveries(records: &[EstimateRecord], target_fdr: f64) -> Vec<&EstimateRecord> {
    let admitted = records
        .iter()
        .filter(|r| r.qvalue <= target_fdr)
        .collect::<Vec<&EstimateRecord>>();
    info!(
        "{} of {} players admitted at q <= {}",
        admitted.len(),
        records.len(),
        target_fdr
    );
    admitted
}
