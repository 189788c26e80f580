// src/cli.rs
use battingsim_utils::estimate::EstimationConfig;
use battingsim_utils::evaluate::EvaluationConfig;
use battingsim_utils::prior::PriorModel;
use battingsim_utils::replicate::{EstimationPrior, StudyConfig};
use clap::{Parser, ValueEnum};

/// Simulate batting averages from a fitted prior and score empirical Bayes
/// estimates against the known truth.
#[derive(Parser, Debug)]
#[command(name = "battingsim", version, about = "Empirical Bayes shrinkage simulation")]
pub struct Cli {
    #[arg(
        value_name = "CAREERS",
        help = "File path to the table of player hits and at-bats (csv, or tsv by extension)"
    )]
    pub careers: String,

    #[arg(
        long,
        short,
        default_value = "battingsim",
        value_name = "OUT",
        help = "Output directory"
    )]
    pub out: String,

    #[arg(long, short, default_value = "2015", help = "Seed of the simulation")]
    pub seed: u64,

    #[arg(long, default_value = "0.95", help = "Credible level of the per-player intervals")]
    pub level: f64,

    #[arg(
        long,
        default_value = "0.3",
        help = "Batting average the posterior test is run against"
    )]
    pub threshold: f64,

    #[arg(long, default_value = "0.1", help = "q-value cut-off for the discovery list")]
    pub target_fdr: f64,

    #[arg(
        long,
        default_value = "flat",
        value_name = "PRIOR",
        help = "Prior model: flat or ab-dependent"
    )]
    pub prior: PriorModel,

    #[arg(
        long,
        default_value = "simulated",
        help = "Shrink towards a prior refit on the simulated data (simulated) or the generating one (real)"
    )]
    pub estimation_prior: EstimationPrior,

    #[arg(
        long,
        default_value = "1",
        help = "Minimum career at-bats for a player to be included"
    )]
    pub min_at_bats: u64,

    #[arg(long, default_value = "2", help = "Number of at-bat bins per decade")]
    pub bins_per_decade: u32,

    #[arg(
        long,
        default_value = "0",
        help = "Number of extra replications with consecutive seeds"
    )]
    pub replications: usize,

    #[arg(
        value_enum,
        long,
        default_value = "normal",
        value_name = "VERBOSITY",
        help = "Verbosity level"
    )]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn study_config(&self) -> StudyConfig {
        StudyConfig {
            seed: self.seed,
            prior_model: self.prior,
            estimation_prior: self.estimation_prior,
            estimation: EstimationConfig {
                level: self.level,
                threshold: self.threshold,
            },
            evaluation: EvaluationConfig {
                target_fdr: self.target_fdr,
                bins_per_decade: self.bins_per_decade,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Normal,
    Silent,
}

impl LogLevel {
    pub fn default_filter(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "debug",
            LogLevel::Normal => "info",
            LogLevel::Silent => "off",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["battingsim", "careers.csv"]).unwrap();
        let config = cli.study_config();
        assert_eq!(config.seed, 2015);
        assert_eq!(config.prior_model, PriorModel::Flat);
        assert_eq!(config.estimation_prior, EstimationPrior::Simulated);
        assert_eq!(config.estimation, EstimationConfig::default());
        assert_eq!(config.evaluation, EvaluationConfig::default());
        assert_eq!(cli.verbosity, LogLevel::Normal);
        assert_eq!(cli.replications, 0);
    }

    #[test]
    fn test_parse_options() {
        let cli = Cli::try_parse_from([
            "battingsim",
            "careers.tsv",
            "--prior",
            "ab-dependent",
            "--estimation-prior",
            "real",
            "--level",
            "0.8",
            "--seed",
            "7",
            "--verbosity",
            "silent",
        ])
        .unwrap();
        let config = cli.study_config();
        assert_eq!(config.prior_model, PriorModel::AbDependent);
        assert_eq!(config.estimation_prior, EstimationPrior::Real);
        assert_eq!(config.estimation.level, 0.8);
        assert_eq!(config.seed, 7);
        assert_eq!(cli.verbosity.default_filter(), "off");
    }

    #[test]
    fn test_unknown_prior_is_rejected() {
        assert!(Cli::try_parse_from(["battingsim", "careers.csv", "--prior", "hierarchical"]).is_err());
    }
}
