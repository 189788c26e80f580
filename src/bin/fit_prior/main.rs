use anyhow::Result;
use battingsim_utils::player::load_players;
use battingsim_utils::prior::fit_prior;
use clap::Parser;
use env_logger::Env;
use std::path::Path;

mod cli;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    // Set up logging level
    match args.verbosity {
        cli::LogLevel::Silent => {
            env_logger::Builder::from_env(Env::default().default_filter_or("off")).init();
        }
        cli::LogLevel::Normal => {
            env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
        }
        cli::LogLevel::Verbose => {
            env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();
        }
    }

    let players = load_players(Path::new(&args.careers), args.min_at_bats)?;
    let prior = fit_prior(&players, args.prior)?;

    println!("parameter\testimate\tstd_error");
    for (name, estimate, se) in prior.parameters() {
        println!("{}\t{}\t{}", name, estimate, se);
    }
    println!("log_likelihood\t{}\tNA", prior.log_likelihood());
    println!("n_players\t{}\tNA", players.len());
    Ok(())
}
