use anyhow::{bail, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::Path;

mod cli;
mod io;
mod study;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.verbosity.default_filter()))
        .init();

    let config = args.study_config();
    config.validate()?;

    // Create output directory
    info!("Running batting average simulation");
    let out_path = Path::new(&args.out);
    if out_path.exists() {
        bail!("Output directory already exists: {}", args.out);
    }
    std::fs::create_dir(out_path)?;

    study::battingsim(&args, &config)?;
    Ok(())
}
