use crate::beta::Beta;
use crate::optim::{hessian, standard_errors, Optimizer};
use crate::player::BattingCounts;
use anyhow::{anyhow, bail, Result};
use log::{debug, info};
use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};

/// Shape of the prior fitted to the batting counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PriorModel {
    /// One Beta(alpha, beta) shared by every player
    Flat,
    /// Beta mean is a logistic function of ln(at-bats), dispersion shared
    AbDependent,
}

/// Hyperparameters of a fitted prior and their standard errors.
///
/// The AB-dependent prior uses the mean/dispersion parametrization
/// `mu = logistic(intercept + slope * ln(AB))`, `alpha = mu / sigma`,
/// `beta = (1 - mu) / sigma`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum FittedPrior {
    Flat {
        alpha: f64,
        beta: f64,
        alpha_se: f64,
        beta_se: f64,
        log_likelihood: f64,
    },
    AbDependent {
        intercept: f64,
        slope: f64,
        sigma: f64,
        intercept_se: f64,
        slope_se: f64,
        log_sigma_se: f64,
        log_likelihood: f64,
    },
}

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn mean_dispersion_beta(mu: f64, sigma: f64) -> Beta {
    Beta::new(mu / sigma, (1.0 - mu) / sigma)
}

impl FittedPrior {
    /// A flat prior with known parameters and no fit attached.
    pub fn flat(alpha: f64, beta: f64) -> Self {
        FittedPrior::Flat {
            alpha,
            beta,
            alpha_se: f64::NAN,
            beta_se: f64::NAN,
            log_likelihood: f64::NAN,
        }
    }

    /// An AB-dependent prior with known parameters and no fit attached.
    pub fn ab_dependent(intercept: f64, slope: f64, sigma: f64) -> Self {
        FittedPrior::AbDependent {
            intercept,
            slope,
            sigma,
            intercept_se: f64::NAN,
            slope_se: f64::NAN,
            log_sigma_se: f64::NAN,
            log_likelihood: f64::NAN,
        }
    }

    pub fn model(&self) -> PriorModel {
        match self {
            FittedPrior::Flat { .. } => PriorModel::Flat,
            FittedPrior::AbDependent { .. } => PriorModel::AbDependent,
        }
    }

    /// The prior a player with `at_bats` at-bats is shrunk towards.
    pub fn beta_for(&self, at_bats: u64) -> Beta {
        match *self {
            FittedPrior::Flat { alpha, beta, .. } => Beta::new(alpha, beta),
            FittedPrior::AbDependent {
                intercept,
                slope,
                sigma,
                ..
            } => {
                let mu = logistic(intercept + slope * (at_bats as f64).ln());
                mean_dispersion_beta(mu, sigma)
            }
        }
    }

    pub fn log_likelihood(&self) -> f64 {
        match *self {
            FittedPrior::Flat { log_likelihood, .. } => log_likelihood,
            FittedPrior::AbDependent { log_likelihood, .. } => log_likelihood,
        }
    }

    /// (name, estimate, standard error) for every hyperparameter.
    pub fn parameters(&self) -> Vec<(&'static str, f64, f64)> {
        match *self {
            FittedPrior::Flat {
                alpha,
                beta,
                alpha_se,
                beta_se,
                ..
            } => vec![("alpha", alpha, alpha_se), ("beta", beta, beta_se)],
            FittedPrior::AbDependent {
                intercept,
                slope,
                sigma,
                intercept_se,
                slope_se,
                log_sigma_se,
                ..
            } => vec![
                ("intercept", intercept, intercept_se),
                ("slope", slope, slope_se),
                ("log_sigma", sigma.ln(), log_sigma_se),
            ],
        }
    }
}

/// Beta-binomial log-likelihood of every player under a mean/dispersion
/// prior, with its derivative per player linear predictor and in `ln sigma`.
struct LikelihoodTerms {
    value: f64,
    d_eta: Vec<f64>,
    d_log_sigma: f64,
}

/// `eta(i)` is the logit of the prior mean of player `i`. The value is `NaN`
/// if any player's prior is not a proper Beta.
fn likelihood_terms<T: BattingCounts>(
    records: &[T],
    eta: impl Fn(usize) -> f64,
    log_sigma: f64,
) -> LikelihoodTerms {
    let sigma = log_sigma.exp();
    let mut terms = LikelihoodTerms {
        value: 0.0,
        d_eta: Vec::with_capacity(records.len()),
        d_log_sigma: 0.0,
    };
    for (i, record) in records.iter().enumerate() {
        let mu = logistic(eta(i));
        let prior = mean_dispersion_beta(mu, sigma);
        if !prior.is_valid() {
            return LikelihoodTerms {
                value: f64::NAN,
                d_eta: vec![f64::NAN; records.len()],
                d_log_sigma: f64::NAN,
            };
        }
        let (hits, at_bats) = (record.hits(), record.at_bats());
        let (d_alpha, d_beta) = prior.log_marginal_gradient(hits, at_bats);
        terms.value += prior.log_marginal(hits, at_bats);
        terms.d_eta.push((d_alpha - d_beta) * mu * (1.0 - mu) / sigma);
        terms.d_log_sigma -= prior.alpha * d_alpha + prior.beta * d_beta;
    }
    terms
}

/// Negative log-likelihood of a flat prior at `(logit mu, ln sigma)` and its
/// gradient.
fn flat_objective<T: BattingCounts>(records: &[T], x: &[f64]) -> (f64, Vec<f64>) {
    let terms = likelihood_terms(records, |_| x[0], x[1]);
    let d_mu: f64 = terms.d_eta.iter().sum();
    (-terms.value, vec![-d_mu, -terms.d_log_sigma])
}

/// Negative log-likelihood of the AB-dependent prior at
/// `(intercept, slope, ln sigma)` and its gradient, with the covariate
/// `ln(at-bats) - center`.
fn ab_objective<T: BattingCounts>(
    records: &[T],
    log_at_bats: &[f64],
    center: f64,
    x: &[f64],
) -> (f64, Vec<f64>) {
    let terms = likelihood_terms(records, |i| x[0] + x[1] * (log_at_bats[i] - center), x[2]);
    let d_intercept: f64 = terms.d_eta.iter().sum();
    let d_slope: f64 = terms
        .d_eta
        .iter()
        .zip(log_at_bats)
        .map(|(d, l)| d * (l - center))
        .sum();
    (-terms.value, vec![-d_intercept, -d_slope, -terms.d_log_sigma])
}

/// An objective and its gradient as per-player means.
fn per_player((value, gradient): (f64, Vec<f64>), count: f64) -> (f64, Vec<f64>) {
    (value / count, gradient.into_iter().map(|g| g / count).collect())
}

/// Reject inputs the beta-binomial likelihood cannot be maximized on.
fn check_fittable<T: BattingCounts>(records: &[T]) -> Result<()> {
    if records.len() < 2 {
        bail!("At least two players are needed to fit a prior, got {}", records.len());
    }
    let mut total_hits = 0;
    let mut total_at_bats = 0;
    for record in records {
        if record.at_bats() == 0 {
            bail!("Cannot fit a prior to a player with no at-bats");
        }
        if record.hits() > record.at_bats() {
            bail!(
                "Cannot fit a prior to a player with {} hits in {} at-bats",
                record.hits(),
                record.at_bats()
            );
        }
        total_hits += record.hits();
        total_at_bats += record.at_bats();
    }
    if total_hits == 0 {
        bail!("Every at-bat is a failure, the prior is degenerate");
    }
    if total_hits == total_at_bats {
        bail!("Every at-bat is a success, the prior is degenerate");
    }
    Ok(())
}

/// Method-of-moments starting point from the raw averages, falling back to
/// the pooled average with a weak concentration when the raw averages are
/// too dispersed for any Beta.
fn moment_start<T: BattingCounts>(records: &[T]) -> Beta {
    let ratios: Vec<f64> = records
        .iter()
        .map(|r| r.hits() as f64 / r.at_bats() as f64)
        .collect();
    match Beta::from_ratios(&ratios) {
        Some(beta) => beta,
        None => {
            let hits: u64 = records.iter().map(|r| r.hits()).sum();
            let at_bats: u64 = records.iter().map(|r| r.at_bats()).sum();
            let mean = hits as f64 / at_bats as f64;
            debug!("Method of moments failed, starting from pooled mean {:.4}", mean);
            Beta::new(10.0 * mean, 10.0 * (1.0 - mean))
        }
    }
}

pub fn fit_prior<T: BattingCounts>(records: &[T], model: PriorModel) -> Result<FittedPrior> {
    match model {
        PriorModel::Flat => fit_flat(records),
        PriorModel::AbDependent => fit_ab_dependent(records),
    }
}

/// Maximum-likelihood Beta(alpha, beta) shared by every player.
pub fn fit_flat<T: BattingCounts>(records: &[T]) -> Result<FittedPrior> {
    check_fittable(records)?;
    let start = moment_start(records);
    debug!("Flat prior start: α = {:.3}, β = {:.3}", start.alpha, start.beta);
    let count = records.len() as f64;

    // Optimize on (logit mu, ln sigma), which is unconstrained and far
    // better conditioned than (alpha, beta).
    let x0 = [logit(start.mean()), -(start.alpha + start.beta).ln()];
    let minimum = Optimizer::default()
        .minimize(|x| per_player(flat_objective(records, x), count), &x0)
        .map_err(|e| anyhow!("Flat prior fit failed: {}", e))?;
    let fitted = mean_dispersion_beta(logistic(minimum.point[0]), minimum.point[1].exp());
    if !fitted.is_valid() {
        bail!("Flat prior fit diverged to α = {}, β = {}", fitted.alpha, fitted.beta);
    }

    let natural_gradient = |x: &[f64]| {
        let prior = Beta::new(x[0], x[1]);
        let (mut d_alpha, mut d_beta) = (0.0, 0.0);
        for record in records {
            let (a, b) = prior.log_marginal_gradient(record.hits(), record.at_bats());
            d_alpha -= a;
            d_beta -= b;
        }
        vec![d_alpha, d_beta]
    };
    let se = standard_errors(&hessian(natural_gradient, &[fitted.alpha, fitted.beta]));
    info!(
        "Fitted flat prior: α = {:.3} ± {:.3}, β = {:.3} ± {:.3}, mean = {:.4} ({} iterations)",
        fitted.alpha,
        se[0],
        fitted.beta,
        se[1],
        fitted.mean(),
        minimum.iterations
    );
    Ok(FittedPrior::Flat {
        alpha: fitted.alpha,
        beta: fitted.beta,
        alpha_se: se[0],
        beta_se: se[1],
        log_likelihood: -minimum.value * count,
    })
}

/// Maximum-likelihood beta-binomial regression of the prior mean on
/// ln(at-bats) with a shared dispersion.
pub fn fit_ab_dependent<T: BattingCounts>(records: &[T]) -> Result<FittedPrior> {
    let flat = fit_flat(records)?;
    let start = flat.beta_for(1);
    let count = records.len() as f64;

    let log_at_bats: Vec<f64> = records.iter().map(|r| (r.at_bats() as f64).ln()).collect();
    let center = log_at_bats.iter().sum::<f64>() / count;
    let spread = log_at_bats.iter().map(|l| (l - center).abs()).fold(0.0, f64::max);
    if spread == 0.0 {
        bail!("Every player has the same number of at-bats, the AB-dependent prior is not identifiable");
    }

    // The covariate is centred while optimizing and the intercept shifted back afterwards
    let x0 = [
        logit(start.mean()),
        0.0,
        -(start.alpha + start.beta).ln(),
    ];
    let minimum = Optimizer::default()
        .minimize(
            |x| per_player(ab_objective(records, &log_at_bats, center, x), count),
            &x0,
        )
        .map_err(|e| anyhow!("AB-dependent prior fit failed: {}", e))?;
    let slope = minimum.point[1];
    let intercept = minimum.point[0] - slope * center;
    let sigma = minimum.point[2].exp();
    if !(intercept.is_finite() && slope.is_finite() && sigma > 0.0 && sigma.is_finite()) {
        bail!("AB-dependent prior fit diverged");
    }

    let uncentered_gradient = |x: &[f64]| ab_objective(records, &log_at_bats, 0.0, x).1;
    let se = standard_errors(&hessian(uncentered_gradient, &[intercept, slope, sigma.ln()]));
    info!(
        "Fitted AB-dependent prior: intercept = {:.4} ± {:.4}, slope = {:.4} ± {:.4}, σ = {:.5} ({} iterations)",
        intercept, se[0], slope, se[1], sigma, minimum.iterations
    );
    Ok(FittedPrior::AbDependent {
        intercept,
        slope,
        sigma,
        intercept_se: se[0],
        slope_se: se[1],
        log_sigma_se: se[2],
        log_likelihood: -minimum.value * count,
    })
}
