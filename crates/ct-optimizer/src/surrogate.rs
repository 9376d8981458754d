//! Surrogate models: Gaussian-process regression with an RBF kernel.
//!
//! Inputs are expected in the unit cube (see [`ct_types::Bounds::normalize`]);
//! targets are standardized internally and predictions are reported back in
//! the caller's units.

use ct_types::{CtError, CtResult};
use nalgebra::{linalg::Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest variance ever reported by a prediction.
pub const VARIANCE_FLOOR: f64 = 1e-9;

/// Lengthscales tried when refitting hyperparameters.
const LENGTHSCALE_GRID: [f64; 7] = [0.05, 0.1, 0.2, 0.35, 0.5, 1.0, 2.0];
/// Observation noise variances tried when refitting hyperparameters.
const NOISE_GRID: [f64; 3] = [1e-6, 1e-4, 1e-2];
/// Diagonal jitter added on successive Cholesky retries.
const JITTER: [f64; 4] = [0.0, 1e-8, 1e-6, 1e-4];

/// Predictive distribution at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean: f64,
    pub variance: f64,
}

impl Prediction {
    pub fn std(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Regression model fit to observed `(x, y)` pairs.
pub trait SurrogateModel {
    /// Replace the training set and refit hyperparameters.
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> CtResult<()>;

    /// Mean and strictly positive variance for every row of `x`.
    fn predict(&self, x: &[Vec<f64>]) -> Vec<Prediction>;
}

/// Kernel hyperparameters chosen by the last fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub lengthscale: f64,
    pub signal_variance: f64,
    pub noise_variance: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            lengthscale: 1.0,
            signal_variance: 1.0,
            noise_variance: 1e-6,
        }
    }
}

struct FittedGp {
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    hyper: Hyperparameters,
    y_mean: f64,
    y_std: f64,
}

/// Gaussian-process regression with an isotropic RBF kernel.
#[derive(Default)]
pub struct GaussianProcess {
    fitted: Option<FittedGp>,
}

impl GaussianProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hyperparameters of the current fit, if any.
    pub fn hyperparameters(&self) -> Option<Hyperparameters> {
        self.fitted.as_ref().map(|f| f.hyper)
    }

    pub fn training_size(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.x_train.len())
    }
}

impl std::fmt::Debug for GaussianProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianProcess")
            .field("training_size", &self.training_size())
            .field("hyperparameters", &self.hyperparameters())
            .finish()
    }
}

fn rbf(a: &[f64], b: &[f64], hyper: &Hyperparameters) -> f64 {
    let sq_dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    hyper.signal_variance * (-0.5 * sq_dist / (hyper.lengthscale * hyper.lengthscale)).exp()
}

fn kernel_matrix(x: &[Vec<f64>], hyper: &Hyperparameters, jitter: f64) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = rbf(&x[i], &x[j], hyper);
        if i == j {
            k + hyper.noise_variance + jitter
        } else {
            k
        }
    })
}

fn decompose(x: &[Vec<f64>], hyper: &Hyperparameters) -> Option<Cholesky<f64, Dyn>> {
    JITTER
        .iter()
        .find_map(|&jitter| Cholesky::new(kernel_matrix(x, hyper, jitter)))
}

/// `log p(y | X) = -1/2 y^T alpha - sum(log L_ii) - n/2 log(2 pi)`
fn log_marginal_likelihood(cholesky: &Cholesky<f64, Dyn>, y: &DVector<f64>) -> f64 {
    let alpha = cholesky.solve(y);
    let l = cholesky.l_dirty();
    let log_det: f64 = (0..y.len()).map(|i| l[(i, i)].ln()).sum();
    -0.5 * y.dot(&alpha) - log_det - 0.5 * y.len() as f64 * (2.0 * std::f64::consts::PI).ln()
}

/// Replace non-finite labels with the worst finite one so a failed
/// evaluation still counts as a (bad) data point.
fn sanitize_labels(y: &[f64]) -> Vec<f64> {
    let worst = y
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    let fill = if worst.is_finite() { worst } else { 0.0 };
    y.iter()
        .map(|&v| if v.is_finite() { v } else { fill })
        .collect()
}

impl SurrogateModel for GaussianProcess {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> CtResult<()> {
        if x.len() != y.len() {
            return Err(CtError::DimensionMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        if x.is_empty() {
            return Err(CtError::Numeric("cannot fit a surrogate on zero points".to_string()));
        }

        let labels = sanitize_labels(y);
        let n = labels.len() as f64;
        let y_mean = labels.iter().sum::<f64>() / n;
        let y_var = labels.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = y_var.sqrt().max(1e-12);
        let standardized =
            DVector::from_iterator(labels.len(), labels.iter().map(|v| (v - y_mean) / y_std));

        let mut best: Option<(f64, Hyperparameters, Cholesky<f64, Dyn>)> = None;
        for &lengthscale in &LENGTHSCALE_GRID {
            for &noise_variance in &NOISE_GRID {
                let hyper = Hyperparameters {
                    lengthscale,
                    signal_variance: 1.0,
                    noise_variance,
                };
                let Some(cholesky) = decompose(x, &hyper) else {
                    continue;
                };
                let lml = log_marginal_likelihood(&cholesky, &standardized);
                if !lml.is_finite() {
                    continue;
                }
                if best.as_ref().map_or(true, |(b, _, _)| lml > *b) {
                    best = Some((lml, hyper, cholesky));
                }
            }
        }

        let (lml, hyper, cholesky) = best.ok_or_else(|| {
            CtError::Numeric("kernel matrix is not positive definite".to_string())
        })?;
        debug!(
            points = x.len(),
            lengthscale = hyper.lengthscale,
            noise = hyper.noise_variance,
            lml,
            "surrogate refit"
        );

        let alpha = cholesky.solve(&standardized);
        self.fitted = Some(FittedGp {
            cholesky,
            alpha,
            x_train: x.to_vec(),
            hyper,
            y_mean,
            y_std,
        });
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<Prediction> {
        let Some(gp) = &self.fitted else {
            return x
                .iter()
                .map(|_| Prediction {
                    mean: 0.0,
                    variance: 1.0,
                })
                .collect();
        };

        x.iter()
            .map(|point| {
                let k_star = DVector::from_iterator(
                    gp.x_train.len(),
                    gp.x_train.iter().map(|xi| rbf(point, xi, &gp.hyper)),
                );
                let mean = k_star.dot(&gp.alpha);
                let v = gp.cholesky.solve(&k_star);
                let variance = (gp.hyper.signal_variance - k_star.dot(&v)).max(0.0);
                Prediction {
                    mean: mean * gp.y_std + gp.y_mean,
                    variance: (variance * gp.y_std * gp.y_std).max(VARIANCE_FLOOR),
                }
            })
            .collect()
    }
}
