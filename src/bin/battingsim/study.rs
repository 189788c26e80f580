use crate::{cli, io};
use anyhow::Result;
use battingsim_utils::estimate::discoveries;
use battingsim_utils::evaluate::{ab_bins, coverage, fdr_curve};
use battingsim_utils::player::load_players;
use battingsim_utils::prior::fit_prior;
use battingsim_utils::replicate::{replicate, run_study, StudyConfig};
use log::{debug, info};
use std::{path::Path, time::Instant};

pub fn battingsim(args: &cli::Cli, config: &StudyConfig) -> Result<()> {
    let global_timer = Instant::now();
    let outdir = Path::new(&args.out);

    let players = load_players(Path::new(&args.careers), args.min_at_bats)?;

    let timer = Instant::now();
    info!("Fitting {} prior to {} real players", config.prior_model, players.len());
    let real_prior = fit_prior(&players, config.prior_model)?;
    info!("Fitted real prior in {:?}", timer.elapsed());

    let timer = Instant::now();
    info!(
        "Simulating with seed {}, estimating with the {} prior",
        config.seed, config.estimation_prior
    );
    let study = run_study(&players, &real_prior, config, config.seed)?;
    info!("Simulated and estimated in {:?}", timer.elapsed());

    let timer = Instant::now();
    let bins = ab_bins(&study.estimates, config.evaluation.bins_per_decade)?;
    let coverage_curve = coverage(&study.estimates, &config.evaluation.levels)?;
    let fdr = fdr_curve(
        &study.estimates,
        config.estimation.threshold,
        &config.evaluation.q_thresholds,
    )?;
    for point in &coverage_curve {
        debug!("Coverage at {:.2}: {:.4}", point.level, point.coverage);
    }
    let admitted = discoveries(&study.estimates, config.evaluation.target_fdr);
    debug!(
        "Best discovery: {}",
        admitted
            .iter()
            .min_by(|a, b| a.qvalue.total_cmp(&b.qvalue))
            .map(|e| e.player_id.as_str())
            .unwrap_or("none")
    );
    info!("Evaluated estimates in {:?}", timer.elapsed());

    io::write_table(&outdir.join("simulated.tsv"), &study.simulated)?;
    io::write_estimates(&outdir.join("estimates.tsv"), &study.estimates)?;
    io::write_table(&outdir.join("ab_bins.tsv"), &bins)?;
    io::write_table(&outdir.join("coverage.tsv"), &coverage_curve)?;
    io::write_table(&outdir.join("fdr.tsv"), &fdr)?;
    io::write_report(
        &outdir.join("summary.json"),
        &io::Report {
            n_players: players.len(),
            seed: study.seed,
            real_prior: &real_prior,
            estimation_prior: &study.prior,
            summary: &study.summary,
        },
    )?;

    if args.replications > 0 {
        let timer = Instant::now();
        info!("Running {} replications", args.replications);
        let replications = replicate(&players, &real_prior, config, args.replications)?;
        io::write_replications(&outdir.join("replications.tsv"), &replications)?;
        info!("Finished replications in {:?}", timer.elapsed());
    }

    println!(
        "MSE raw: {:.6}\tMSE shrunken: {:.6}\tcoverage ({}): {:.4}\tFDR (q <= {}): {}",
        study.summary.mse_raw,
        study.summary.mse_shrunken,
        config.estimation.level,
        study.summary.coverage,
        config.evaluation.target_fdr,
        study
            .summary
            .fdr
            .map(|f| format!("{:.4}", f))
            .unwrap_or_else(|| "NA".to_string())
    );
    info!("Finished processing in {:?}", global_timer.elapsed());
    Ok(())
}
