use crate::estimate::{EstimateRecord, EstimationConfig};
use anyhow::{bail, Result};
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

/// Which per-player estimate is scored against the truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    Raw,
    Shrunken,
}

impl Estimator {
    pub fn value(&self, record: &EstimateRecord) -> f64 {
        match self {
            Estimator::Raw => record.raw,
            Estimator::Shrunken => record.shrunken,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    /// q-value cut-off defining the discovery list
    pub target_fdr: f64,
    pub bins_per_decade: u32,
    pub levels: Vec<f64>,
    pub q_thresholds: Vec<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            target_fdr: 0.1,
            bins_per_decade: 2,
            levels: (10..=19).map(|i| i as f64 * 0.05).collect(),
            q_thresholds: (1..=25).map(|i| i as f64 / 100.0).collect(),
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_fdr > 0.0 && self.target_fdr < 1.0) {
            bail!("Target FDR must be in (0, 1), got {}", self.target_fdr);
        }
        if self.bins_per_decade == 0 {
            bail!("At least one bin per decade of at-bats is needed");
        }
        if let Some(level) = self.levels.iter().find(|l| !(**l > 0.0 && **l < 1.0)) {
            bail!("Coverage levels must be in (0, 1), got {}", level);
        }
        Ok(())
    }
}

fn truths(records: &[EstimateRecord]) -> Result<Vec<f64>> {
    if records.is_empty() {
        bail!("No estimates to evaluate");
    }
    records
        .iter()
        .map(|r| match r.true_p {
            Some(p) => Ok(p),
            None => bail!("Player {} has no known true average", r.player_id),
        })
        .collect()
}

pub fn mse(records: &[EstimateRecord], estimator: Estimator) -> Result<f64> {
    let truth = truths(records)?;
    let total: f64 = records
        .iter()
        .zip(&truth)
        .map(|(r, p)| (estimator.value(r) - p).powi(2))
        .sum();
    Ok(total / records.len() as f64)
}

/// Least-squares slope of `estimates` regressed on `truth`; 1 for an
/// unbiased estimator. `NaN` when the slope is not defined.
pub fn bias_slope(truth: &[f64], estimates: &[f64]) -> f64 {
    let n = truth.len().min(estimates.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_truth = truth[..n].iter().sum::<f64>() / n as f64;
    let mean_estimate = estimates[..n].iter().sum::<f64>() / n as f64;
    let mut covariance = 0.0;
    let mut variance = 0.0;
    for (t, e) in truth[..n].iter().zip(&estimates[..n]) {
        covariance += (t - mean_truth) * (e - mean_estimate);
        variance += (t - mean_truth).powi(2);
    }
    if variance == 0.0 {
        return f64::NAN;
    }
    covariance / variance
}

/// Bias slope over the records with a known true average.
fn estimator_slope(records: &[&EstimateRecord], estimator: Estimator) -> f64 {
    let (truth, estimates): (Vec<f64>, Vec<f64>) = records
        .iter()
        .filter_map(|r| r.true_p.map(|p| (p, estimator.value(r))))
        .unzip();
    bias_slope(&truth, &estimates)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbBin {
    /// Bin centre, a power of ten
    pub at_bats: f64,
    pub n: usize,
    pub mse_raw: f64,
    pub mse_shrunken: f64,
    pub slope_raw: f64,
    pub slope_shrunken: f64,
}

/// MSE and bias slope within logarithmic bins of at-bats. A player lands in
/// the bin `10^(round(log10(AB) * k) / k)` for `k` bins per decade.
pub fn ab_bins(records: &[EstimateRecord], bins_per_decade: u32) -> Result<Vec<AbBin>> {
    truths(records)?;
    if bins_per_decade == 0 {
        bail!("At least one bin per decade of at-bats is needed");
    }
    let k = bins_per_decade as f64;
    let groups = records
        .iter()
        .into_group_map_by(|r| ((r.at_bats as f64).log10() * k).round() as i64);

    let mut bins = Vec::with_capacity(groups.len());
    for (key, members) in groups.into_iter().sorted_by_key(|(key, _)| *key) {
        let squared_error = |estimator: Estimator| {
            members
                .iter()
                .filter_map(|r| r.true_p.map(|p| (estimator.value(r) - p).powi(2)))
                .sum::<f64>()
                / members.len() as f64
        };
        let bin = AbBin {
            at_bats: 10f64.powf(key as f64 / k),
            n: members.len(),
            mse_raw: squared_error(Estimator::Raw),
            mse_shrunken: squared_error(Estimator::Shrunken),
            slope_raw: estimator_slope(&members, Estimator::Raw),
            slope_shrunken: estimator_slope(&members, Estimator::Shrunken),
        };
        debug!(
            "AB bin {:.0}: n = {}, MSE raw = {:.6}, MSE shrunken = {:.6}",
            bin.at_bats, bin.n, bin.mse_raw, bin.mse_shrunken
        );
        bins.push(bin);
    }
    Ok(bins)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveragePoint {
    pub level: f64,
    pub coverage: f64,
    pub n: usize,
}

/// Fraction of credible intervals holding the true average, per level.
pub fn coverage(records: &[EstimateRecord], levels: &[f64]) -> Result<Vec<CoveragePoint>> {
    truths(records)?;
    let mut points = Vec::with_capacity(levels.len());
    let mut working = records.to_vec();
    for &level in levels {
        let mut covered = 0;
        for record in working.iter_mut() {
            record.recompute_interval(level)?;
            if record.covers_truth() == Some(true) {
                covered += 1;
            }
        }
        points.push(CoveragePoint {
            level,
            coverage: covered as f64 / working.len() as f64,
            n: working.len(),
        });
    }
    Ok(points)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FdrPoint {
    pub q_threshold: f64,
    pub n_admitted: usize,
    pub n_false: usize,
    /// `None` when no player is admitted
    pub fdr: Option<f64>,
}

/// Realised false discovery proportion when admitting `q <= t`, where a
/// discovery is false if the true average is below `threshold`.
pub fn fdr_curve(
    records: &[EstimateRecord],
    threshold: f64,
    q_thresholds: &[f64],
) -> Result<Vec<FdrPoint>> {
    let truth = truths(records)?;
    let points = q_thresholds
        .iter()
        .map(|&q_threshold| {
            let (n_admitted, n_false) = records
                .iter()
                .zip(&truth)
                .filter(|(r, _)| r.qvalue <= q_threshold)
                .fold((0, 0), |(admitted, wrong), (_, &p)| {
                    (admitted + 1, wrong + usize::from(p < threshold))
                });
            FdrPoint {
                q_threshold,
                n_admitted,
                n_false,
                fdr: (n_admitted > 0).then(|| n_false as f64 / n_admitted as f64),
            }
        })
        .collect();
    Ok(points)
}

/// Headline numbers of one simulated study.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub n_players: usize,
    pub mse_raw: f64,
    pub mse_shrunken: f64,
    pub slope_raw: f64,
    pub slope_shrunken: f64,
    pub level: f64,
    pub coverage: f64,
    pub threshold: f64,
    pub target_fdr: f64,
    pub n_discoveries: usize,
    pub fdr: Option<f64>,
}

pub fn summarise(
    records: &[EstimateRecord],
    estimation: &EstimationConfig,
    evaluation: &EvaluationConfig,
) -> Result<Summary> {
    let all: Vec<&EstimateRecord> = records.iter().collect();
    let coverage_at_level = coverage(records, &[estimation.level])?;
    let fdr_at_target = fdr_curve(records, estimation.threshold, &[evaluation.target_fdr])?;
    let summary = Summary {
        n_players: records.len(),
        mse_raw: mse(records, Estimator::Raw)?,
        mse_shrunken: mse(records, Estimator::Shrunken)?,
        slope_raw: estimator_slope(&all, Estimator::Raw),
        slope_shrunken: estimator_slope(&all, Estimator::Shrunken),
        level: estimation.level,
        coverage: coverage_at_level[0].coverage,
        threshold: estimation.threshold,
        target_fdr: evaluation.target_fdr,
        n_discoveries: fdr_at_target[0].n_admitted,
        fdr: fdr_at_target[0].fdr,
    };
    info!(
        "MSE raw = {:.6}, MSE shrunken = {:.6}, coverage at {} = {:.3}, FDR at q <= {} = {}",
        summary.mse_raw,
        summary.mse_shrunken,
        summary.level,
        summary.coverage,
        summary.target_fdr,
        summary
            .fdr
            .map(|f| format!("{:.3}", f))
            .unwrap_or_else(|| "NA".to_string())
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::estimate;
    use crate::player::PlayerRecord;
    use crate::prior::{fit_flat, fit_prior, FittedPrior, PriorModel};
    use crate::simulate::simulate;
    use approx::assert_abs_diff_eq;

    /// At-bats spread evenly on the log scale between 50 and 3000.
    fn population(n: usize) -> Vec<PlayerRecord> {
        (0..n)
            .map(|i| {
                let t = i as f64 / (n - 1) as f64;
                let at_bats = (50.0 * 60.0_f64.powf(t)).round() as u64;
                PlayerRecord::new(&format!("p{}", i), 0, at_bats)
            })
            .collect()
    }

    fn study(n: usize, seed: u64) -> Vec<EstimateRecord> {
        let prior = FittedPrior::flat(20.0, 60.0);
        let simulated = simulate(&population(n), &prior, seed).unwrap();
        estimate(&simulated, &prior, &EstimationConfig::default()).unwrap()
    }

    fn record(true_p: Option<f64>, raw: f64, shrunken: f64, at_bats: u64) -> EstimateRecord {
        EstimateRecord {
            player_id: "x".to_string(),
            hits: 0,
            at_bats,
            true_p,
            raw,
            shrunken,
            posterior: crate::beta::Beta::new(1.0, 1.0),
            low: 0.0,
            high: 1.0,
            level: 0.95,
            pep: 0.5,
            qvalue: 0.5,
        }
    }

    #[test]
    fn test_mse() {
        let records = vec![record(Some(0.3), 0.4, 0.3, 10), record(Some(0.2), 0.2, 0.25, 10)];
        assert_abs_diff_eq!(mse(&records, Estimator::Raw).unwrap(), 0.005, epsilon = 1e-12);
        assert_abs_diff_eq!(mse(&records, Estimator::Shrunken).unwrap(), 0.00125, epsilon = 1e-12);
        assert!(mse(&[record(None, 0.1, 0.1, 10)], Estimator::Raw).is_err());
        assert!(mse(&[], Estimator::Raw).is_err());
    }

    #[test]
    fn test_bias_slope() {
        let truth = [0.1, 0.2, 0.3, 0.4];
        let unbiased = [0.1, 0.2, 0.3, 0.4];
        let shrunk = [0.2, 0.25, 0.3, 0.35];
        assert_abs_diff_eq!(bias_slope(&truth, &unbiased), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bias_slope(&truth, &shrunk), 0.5, epsilon = 1e-12);
        assert!(bias_slope(&[0.1], &[0.1]).is_nan());
        assert!(bias_slope(&[0.2, 0.2], &[0.1, 0.3]).is_nan());
    }

    #[test]
    fn test_estimator_slope_pairs_truth_with_estimate() {
        let records = vec![
            record(Some(0.1), 0.1, 0.1, 10),
            record(None, 0.9, 0.9, 10),
            record(Some(0.3), 0.3, 0.3, 10),
        ];
        let all: Vec<&EstimateRecord> = records.iter().collect();
        assert_abs_diff_eq!(estimator_slope(&all, Estimator::Raw), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(estimator_slope(&all, Estimator::Shrunken), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ab_bins_grouping() {
        let records = vec![
            record(Some(0.3), 0.3, 0.3, 10),
            record(Some(0.3), 0.3, 0.3, 12),
            record(Some(0.3), 0.3, 0.3, 100),
            record(Some(0.3), 0.3, 0.3, 1000),
        ];
        let bins = ab_bins(&records, 1).unwrap();
        assert_eq!(bins.len(), 3);
        for (bin, centre) in bins.iter().zip([10.0, 100.0, 1000.0]) {
            assert_abs_diff_eq!(bin.at_bats, centre, epsilon = 1e-9);
        }
        assert_eq!(bins[0].n, 2);
        assert!(bins[0].slope_raw.is_nan());
        let finer = ab_bins(&records, 2).unwrap();
        assert_eq!(finer.len(), 3);
        assert!(ab_bins(&records, 0).is_err());
    }

    #[test]
    fn test_fdr_curve_counts() {
        let mut records = vec![
            record(Some(0.35), 0.3, 0.3, 10),
            record(Some(0.25), 0.3, 0.3, 10),
            record(Some(0.32), 0.3, 0.3, 10),
        ];
        records[0].qvalue = 0.01;
        records[1].qvalue = 0.05;
        records[2].qvalue = 0.2;
        let curve = fdr_curve(&records, 0.3, &[0.001, 0.01, 0.1, 0.3]).unwrap();
        assert_eq!(curve[0].n_admitted, 0);
        assert_eq!(curve[0].fdr, None);
        assert_eq!(curve[1].fdr, Some(0.0));
        assert_eq!(curve[2].n_admitted, 2);
        assert_eq!(curve[2].n_false, 1);
        assert_eq!(curve[2].fdr, Some(0.5));
        assert_eq!(curve[3].n_admitted, 3);
    }

    #[test]
    fn test_shrinkage_beats_raw_on_mse() {
        let records = study(10_000, 1);
        let raw = mse(&records, Estimator::Raw).unwrap();
        let shrunken = mse(&records, Estimator::Shrunken).unwrap();
        assert!(shrunken < raw, "shrunken {} vs raw {}", shrunken, raw);
    }

    #[test]
    fn test_shrinkage_beats_raw_with_a_refit_prior() {
        let truth = FittedPrior::flat(20.0, 60.0);
        let simulated = simulate(&population(10_000), &truth, 21).unwrap();
        let fitted = fit_flat(&simulated).unwrap();
        let records = estimate(&simulated, &fitted, &EstimationConfig::default()).unwrap();
        assert!(mse(&records, Estimator::Shrunken).unwrap() < mse(&records, Estimator::Raw).unwrap());
        // Shrinkage matters most where at-bats are few
        for bin in ab_bins(&records, 2).unwrap().iter().filter(|b| b.at_bats < 500.0) {
            assert!(bin.mse_shrunken <= bin.mse_raw, "bin {:?}", bin);
        }
    }

    #[test]
    fn test_raw_is_unbiased_and_shrunken_is_pulled_in() {
        let records = study(10_000, 2);
        let all: Vec<&EstimateRecord> = records.iter().collect();
        let raw = estimator_slope(&all, Estimator::Raw);
        let shrunken = estimator_slope(&all, Estimator::Shrunken);
        assert!((raw - 1.0).abs() < 0.1, "raw slope {}", raw);
        assert!(shrunken < raw, "shrunken slope {} vs raw slope {}", shrunken, raw);
    }

    #[test]
    fn test_credible_intervals_are_calibrated() {
        let records = study(10_000, 3);
        let points = coverage(&records, &[0.5, 0.7, 0.9, 0.95]).unwrap();
        for point in points {
            assert!(
                (point.coverage - point.level).abs() < 0.02,
                "coverage {} at level {}",
                point.coverage,
                point.level
            );
        }
    }

    #[test]
    fn test_qvalues_control_fdr() {
        let records = study(40_000, 4);
        let curve = fdr_curve(&records, 0.3, &[0.1]).unwrap();
        let fdr = curve[0].fdr.unwrap();
        assert!(curve[0].n_admitted > 500, "admitted {}", curve[0].n_admitted);
        assert!((fdr - 0.1).abs() < 0.03, "fdr {}", fdr);
    }

    /// Simulate from `truth`, then estimate with a prior refit on the
    /// simulated counts, as the default pipeline does.
    fn refit_study(truth: &FittedPrior, model: PriorModel, n: usize, seed: u64) -> Vec<EstimateRecord> {
        let simulated = simulate(&population(n), truth, seed).unwrap();
        let fitted = fit_prior(&simulated, model).unwrap();
        assert_eq!(fitted.model(), model);
        estimate(&simulated, &fitted, &EstimationConfig::default()).unwrap()
    }

    fn assert_calibrated(records: &[EstimateRecord]) {
        for point in coverage(records, &[0.5, 0.7, 0.9, 0.95]).unwrap() {
            assert!(
                (point.coverage - point.level).abs() < 0.02,
                "coverage {} at level {}",
                point.coverage,
                point.level
            );
        }
        let curve = fdr_curve(records, 0.3, &[0.1]).unwrap();
        assert!(curve[0].n_admitted > 300, "admitted {}", curve[0].n_admitted);
        let fdr = curve[0].fdr.unwrap();
        assert!((fdr - 0.1).abs() < 0.03, "fdr {}", fdr);
    }

    #[test]
    fn test_refit_flat_prior_is_calibrated() {
        let records = refit_study(&FittedPrior::flat(20.0, 60.0), PriorModel::Flat, 30_000, 6);
        assert_calibrated(&records);
    }

    #[test]
    fn test_refit_ab_dependent_prior_is_calibrated() {
        let truth = FittedPrior::ab_dependent(-1.9, 0.12, 0.01);
        let records = refit_study(&truth, PriorModel::AbDependent, 30_000, 7);
        assert_calibrated(&records);
    }

    #[test]
    fn test_summarise() {
        let records = study(2_000, 5);
        let summary = summarise(
            &records,
            &EstimationConfig::default(),
            &EvaluationConfig::default(),
        )
        .unwrap();
        assert_eq!(summary.n_players, 2_000);
        assert!(summary.mse_shrunken < summary.mse_raw);
        assert!(summary.coverage > 0.9);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"mse_shrunken\""));
    }

    #[test]
    fn test_evaluation_config_validation() {
        assert!(EvaluationConfig::default().validate().is_ok());
        let bad = EvaluationConfig {
            levels: vec![0.5, 1.0],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = EvaluationConfig {
            target_fdr: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
