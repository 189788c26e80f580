use crate::estimate::{estimate, EstimateRecord, EstimationConfig};
use crate::evaluate::{summarise, EvaluationConfig, Summary};
use crate::player::PlayerRecord;
use crate::prior::{fit_prior, FittedPrior, PriorModel};
use crate::simulate::{simulate, SimulatedRecord};
use anyhow::Result;
use log::info;
use serde::Serialize;
use std::time::Instant;
use strum_macros::{Display, EnumString};

/// Which prior the simulated players are shrunk towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum EstimationPrior {
    /// Refit on the simulated counts, as an analyst without the truth would
    Simulated,
    /// The prior the truth was drawn from
    Real,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyConfig {
    pub seed: u64,
    pub prior_model: PriorModel,
    pub estimation_prior: EstimationPrior,
    pub estimation: EstimationConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            seed: 2015,
            prior_model: PriorModel::Flat,
            estimation_prior: EstimationPrior::Simulated,
            estimation: EstimationConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl StudyConfig {
    pub fn validate(&self) -> Result<()> {
        self.estimation.validate()?;
        self.evaluation.validate()
    }
}

/// One simulated season: the truth, the prior used to estimate it, the
/// estimates and their scores.
#[derive(Debug, Clone)]
pub struct Study {
    pub seed: u64,
    pub simulated: Vec<SimulatedRecord>,
    pub prior: FittedPrior,
    pub estimates: Vec<EstimateRecord>,
    pub summary: Summary,
}

pub fn run_study(
    players: &[PlayerRecord],
    true_prior: &FittedPrior,
    config: &StudyConfig,
    seed: u64,
) -> Result<Study> {
    config.validate()?;
    let simulated = simulate(players, true_prior, seed)?;
    let prior = match config.estimation_prior {
        EstimationPrior::Simulated => fit_prior(&simulated, config.prior_model)?,
        EstimationPrior::Real => true_prior.clone(),
    };
    let estimates = estimate(&simulated, &prior, &config.estimation)?;
    let summary = summarise(&estimates, &config.estimation, &config.evaluation)?;
    Ok(Study {
        seed,
        simulated,
        prior,
        estimates,
        summary,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replication {
    pub seed: u64,
    pub prior: FittedPrior,
    pub summary: Summary,
}

/// Repeat the study for seeds `config.seed .. config.seed + n`.
pub fn replicate(
    players: &[PlayerRecord],
    true_prior: &FittedPrior,
    config: &StudyConfig,
    n: usize,
) -> Result<Vec<Replication>> {
    let mut replications = Vec::with_capacity(n);
    for i in 0..n {
        let timer = Instant::now();
        let seed = config.seed.wrapping_add(i as u64);
        let study = run_study(players, true_prior, config, seed)?;
        info!(
            "Replication {}/{} (seed {}) finished in {:?}",
            i + 1,
            n,
            seed,
            timer.elapsed()
        );
        replications.push(Replication {
            seed,
            prior: study.prior,
            summary: study.summary,
        });
    }
    Ok(replications)
}
