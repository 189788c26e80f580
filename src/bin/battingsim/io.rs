use anyhow::{anyhow, Result};
use battingsim_utils::estimate::EstimateRecord;
use battingsim_utils::evaluate::Summary;
use battingsim_utils::prior::FittedPrior;
use battingsim_utils::replicate::Replication;
use csv::{Writer, WriterBuilder};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

fn tsv_writer(path: &Path) -> Result<Writer<File>> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|e| anyhow!("Could not create {}: {}", path.display(), e))
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NA".to_string())
}

/// Write any serializable rows as a tab separated table with a header.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn write_estimates(path: &Path, estimates: &[EstimateRecord]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "player_id",
        "hits",
        "at_bats",
        "true_p",
        "raw",
        "shrunken",
        "alpha1",
        "beta1",
        "low",
        "high",
        "pep",
        "qvalue",
    ])?;
    for e in estimates {
        writer.write_record(&[
            e.player_id.clone(),
            e.hits.to_string(),
            e.at_bats.to_string(),
            format_optional(e.true_p),
            e.raw.to_string(),
            e.shrunken.to_string(),
            e.posterior.alpha.to_string(),
            e.posterior.beta.to_string(),
            e.low.to_string(),
            e.high.to_string(),
            e.pep.to_string(),
            e.qvalue.to_string(),
        ])?;
    }
    writer.flush()?;
    info!("Wrote {} estimates to {}", estimates.len(), path.display());
    Ok(())
}

/// One row per replication: the refit hyperparameters next to the scores.
pub fn write_replications(path: &Path, replications: &[Replication]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    let Some(first) = replications.first() else {
        writer.flush()?;
        return Ok(());
    };
    let mut header = vec!["seed".to_string()];
    header.extend(first.prior.parameters().iter().map(|(name, _, _)| name.to_string()));
    header.extend(
        ["mse_raw", "mse_shrunken", "coverage", "n_discoveries", "fdr"]
            .iter()
            .map(|s| s.to_string()),
    );
    writer.write_record(&header)?;
    for replication in replications {
        let mut row = vec![replication.seed.to_string()];
        row.extend(
            replication
                .prior
                .parameters()
                .iter()
                .map(|(_, estimate, _)| estimate.to_string()),
        );
        let s = &replication.summary;
        row.push(s.mse_raw.to_string());
        row.push(s.mse_shrunken.to_string());
        row.push(s.coverage.to_string());
        row.push(s.n_discoveries.to_string());
        row.push(format_optional(s.fdr));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!("Wrote {} replications to {}", replications.len(), path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub n_players: usize,
    pub seed: u64,
    pub real_prior: &'a FittedPrior,
    pub estimation_prior: &'a FittedPrior,
    pub summary: &'a Summary,
}

pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| anyhow!("Could not create {}: {}", path.display(), e))?;
    serde_json::to_writer_pretty(file, report)?;
    info!("Wrote summary to {}", path.display());
    Ok(())
}
