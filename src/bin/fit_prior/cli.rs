// src/cli.rs
use battingsim_utils::prior::PriorModel;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "fit_prior", version, about = "Fit a beta-binomial prior to career batting counts")]
pub struct Cli {
    #[arg(
        value_name = "CAREERS",
        help = "File path to the table of player hits and at-bats (csv, or tsv by extension)"
    )]
    pub careers: String,

    #[arg(
        long,
        default_value = "flat",
        value_name = "PRIOR",
        help = "Prior model: flat or ab-dependent"
    )]
    pub prior: PriorModel,

    #[arg(
        long,
        default_value = "1",
        help = "Minimum career at-bats for a player to be included"
    )]
    pub min_at_bats: u64,

    #[arg(
        value_enum,
        long,
        default_value = "silent",
        value_name = "VERBOSITY",
        help = "Verbosity level"
    )]
    pub verbosity: LogLevel,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    Verbose,
    Normal,
    Silent,
}
