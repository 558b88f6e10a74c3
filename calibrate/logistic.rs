//! # Stochastic-Gradient Logistic Regression
//!
//! The iterative linear classifier behind the `lr` model type: log loss with an
//! L2 penalty, fitted by plain SGD under the "optimal" learning-rate schedule
//! `eta_t = 1 / (alpha * (t0 + t))`. Sample order is reshuffled every epoch from
//! a fixed seed, so repeated fits on the same data are bit-for-bit identical.

use super::model::{ModelError, ProbabilityModel};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Default L2 regularization strength.
pub const DEFAULT_ALPHA: f64 = 1e-4;

const SHUFFLE_SEED: u64 = 0x5EED_1A7E;

/// Margin beyond which the logistic gradient is replaced by its asymptote.
const MARGIN_CUTOFF: f64 = 18.0;

#[derive(Clone, Debug)]
pub struct SgdLogisticRegression {
    alpha: f64,
    n_iter: usize,
    seed: u64,
    intercept_init: Option<f64>,
    coef: Option<Array1<f64>>,
    intercept: f64,
}

impl SgdLogisticRegression {
    pub fn new(n_iter: usize) -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            n_iter: n_iter.max(1),
            seed: SHUFFLE_SEED,
            intercept_init: None,
            coef: None,
            intercept: 0.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn coefficients(&self) -> Option<ArrayView1<'_, f64>> {
        self.coef.as_ref().map(|c| c.view())
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn decision(coef: &Array1<f64>, intercept: f64, row: ArrayView1<'_, f64>) -> f64 {
        coef.dot(&row) + intercept
    }
}

/// Derivative of the log loss with respect to the decision value, for `y` in {-1, +1}.
fn log_loss_gradient(decision: f64, y: f64) -> f64 {
    let z = decision * y;
    if z > MARGIN_CUTOFF {
        -y * (-z).exp()
    } else if z < -MARGIN_CUTOFF {
        -y
    } else {
        -y / (z.exp() + 1.0)
    }
}

fn sigmoid(v: f64) -> f64 {
    if v >= 0.0 {
        1.0 / (1.0 + (-v).exp())
    } else {
        let e = v.exp();
        e / (1.0 + e)
    }
}

impl ProbabilityModel for SgdLogisticRegression {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        if y.len() != x.nrows() {
            return Err(ModelError::LabelCountMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        if x.nrows() == 0 {
            return Err(ModelError::EmptyInput);
        }

        // t0 follows the heuristic of Bottou's SGD: the initial step equals the
        // typical weight magnitude 1 / sqrt(sqrt(alpha)).
        let typical_weight = (1.0 / self.alpha.sqrt()).sqrt();
        let initial_eta = typical_weight / log_loss_gradient(-typical_weight, 1.0).max(1.0);
        let t0 = 1.0 / (initial_eta * self.alpha);

        let mut coef = Array1::<f64>::zeros(x.ncols());
        let mut intercept = self.intercept_init.unwrap_or(0.0);
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut t = 1.0;

        for _ in 0..self.n_iter {
            order.shuffle(&mut rng);
            for &i in &order {
                let eta = 1.0 / (self.alpha * (t0 + t - 1.0));
                let target = if y[i] == 1.0 { 1.0 } else { -1.0 };
                let row = x.row(i);
                let dloss = log_loss_gradient(Self::decision(&coef, intercept, row), target);

                coef *= 1.0 - eta * self.alpha;
                coef.scaled_add(-eta * dloss, &row);
                intercept -= eta * dloss;
                t += 1.0;
            }
        }

        log::trace!(
            "SGD logistic fit finished after {} epochs: intercept={intercept:.4}, coef={coef}",
            self.n_iter
        );
        self.coef = Some(coef);
        self.intercept = intercept;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        let coef = self.coef.as_ref().ok_or(ModelError::NotFitted)?;
        if x.ncols() != coef.len() {
            return Err(ModelError::InvalidShape {
                expected: coef.len(),
                found: x.ncols(),
            });
        }

        let mut probs = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.rows().into_iter().enumerate() {
            let p = sigmoid(Self::decision(coef, self.intercept, row));
            probs[[i, 0]] = 1.0 - p;
            probs[[i, 1]] = p;
        }
        Ok(probs)
    }

    fn warm_start_intercept(&mut self, intercept: f64) {
        self.intercept_init = Some(intercept);
    }
}
