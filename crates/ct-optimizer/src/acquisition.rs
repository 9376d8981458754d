//! Expected Improvement acquisition.

use serde::{Deserialize, Serialize};

use crate::surrogate::Prediction;

/// Default exploration margin.
pub const DEFAULT_XI: f64 = 0.01;

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Standard normal PDF.
pub fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Complementary error function, fractional error below 1.2e-7 everywhere
/// (Chebyshev fit, Numerical Recipes `erfcc`).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Expected Improvement over `y_best` for a maximized objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedImprovement {
    pub xi: f64,
}

impl ExpectedImprovement {
    pub fn new(xi: f64) -> Self {
        Self { xi: xi.max(0.0) }
    }

    /// `EI = imp * Phi(z) + sigma * phi(z)` with `imp = mu - y_best - xi`.
    pub fn score(&self, mean: f64, std: f64, y_best: f64) -> f64 {
        let improvement = mean - y_best - self.xi;
        if std <= 0.0 {
            return improvement.max(0.0);
        }
        let z = improvement / std;
        let ei = improvement * norm_cdf(z) + std * norm_pdf(z);
        ei.max(0.0)
    }

    pub fn score_batch(&self, predictions: &[Prediction], y_best: f64) -> Vec<f64> {
        predictions
            .iter()
            .map(|p| self.score(p.mean, p.std(), y_best))
            .collect()
    }
}

impl Default for ExpectedImprovement {
    fn default() -> Self {
        Self::new(DEFAULT_XI)
    }
}

/// Index of the largest score. NaN never wins.
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}
