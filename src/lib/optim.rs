use anyhow::{anyhow, bail, Result};
use log::{debug, warn};
use nalgebra::DMatrix;
use ndarray::Array1;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// Cost handed to the line search in place of a non-finite value.
const INFEASIBLE_COST: f64 = 1e10;

/// Settings of the BFGS minimizer used for maximum-likelihood fits.
#[derive(Clone, Debug)]
pub struct Optimizer {
    /// Convergence threshold on the gradient norm
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 1000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
}

impl Optimizer {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Default::default()
        }
    }

    /// Minimize `cost_and_grad`, which returns the objective and its
    /// gradient at a point. Non-finite costs act as a wall for the line
    /// search.
    pub fn minimize<F>(&self, cost_and_grad: F, start: &[f64]) -> Result<Minimum>
    where
        F: Fn(&[f64]) -> (f64, Vec<f64>),
    {
        if start.is_empty() {
            bail!("Cannot minimize over zero parameters");
        }
        let (initial_cost, _) = cost_and_grad(start);
        if !initial_cost.is_finite() {
            bail!("Initial cost is not finite: {}", initial_cost);
        }
        debug!("Initial cost {:.6} at {:?}", initial_cost, start);

        let objective = |x: &Array1<f64>| -> (f64, Array1<f64>) {
            let (cost, grad) = cost_and_grad(&x.to_vec());
            if cost.is_finite() && grad.iter().all(|g| g.is_finite()) {
                (cost, Array1::from(grad))
            } else {
                (INFEASIBLE_COST, Array1::zeros(x.len()))
            }
        };
        let BfgsSolution {
            final_point,
            final_value,
            iterations,
            ..
        } = Bfgs::new(Array1::from(start.to_vec()), objective)
            .with_tolerance(self.tolerance)
            .with_max_iterations(self.max_iterations)
            .run()
            .map_err(|e| anyhow!("BFGS failed: {:?}", e))?;

        if !(final_value.is_finite() && final_value < INFEASIBLE_COST) {
            bail!("BFGS ended outside the feasible region");
        }
        debug!("BFGS converged to {:.6} in {} iterations", final_value, iterations);
        Ok(Minimum {
            point: final_point.to_vec(),
            value: final_value,
            iterations,
        })
    }
}

/// Hessian as the central-difference Jacobian of an analytic gradient,
/// symmetrized.
pub fn hessian<G: Fn(&[f64]) -> Vec<f64>>(gradient: G, x: &[f64]) -> DMatrix<f64> {
    let n = x.len();
    let mut h = DMatrix::zeros(n, n);
    for j in 0..n {
        let step = 1e-5 * x[j].abs().max(1.0);
        let mut forward = x.to_vec();
        forward[j] += step;
        let mut backward = x.to_vec();
        backward[j] -= step;
        let (upper, lower) = (gradient(&forward), gradient(&backward));
        for i in 0..n {
            h[(i, j)] = (upper[i] - lower[i]) / (2.0 * step);
        }
    }
    (h.clone() + h.transpose()) * 0.5
}

/// Standard errors from the Hessian of a negative log-likelihood.
pub fn standard_errors(hessian: &DMatrix<f64>) -> Vec<f64> {
    match hessian.clone().try_inverse() {
        Some(covariance) => (0..covariance.nrows())
            .map(|i| {
                let variance = covariance[(i, i)];
                if variance > 0.0 && variance.is_finite() {
                    variance.sqrt()
                } else {
                    warn!("Non-positive variance {} for parameter {}", variance, i);
                    f64::NAN
                }
            })
            .collect(),
        None => {
            warn!("Hessian is singular, standard errors are unavailable");
            vec![f64::NAN; hessian.nrows()]
        }
    }
}
