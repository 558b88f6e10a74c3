use super::genotype::GenotypeProbabilityEstimator;
use super::logistic::SgdLogisticRegression;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while fitting or querying a probability model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Feature input has {found} columns, but the model requires exactly {expected}.")]
    InvalidShape { expected: usize, found: usize },
    #[error(
        "Row {row} has genotype encoding ({first}, {second}), which is not one of the six supported dosage pairs."
    )]
    UnknownGenotype { row: usize, first: f64, second: f64 },
    #[error("Unsupported model type '{0}'. Expected one of: lr, prob-solver.")]
    UnsupportedModelType(String),
    #[error("Feature input has {rows} rows but {labels} class labels were provided.")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("Cannot fit a model on zero samples.")]
    EmptyInput,
    #[error("The model must be fitted before probabilities can be predicted.")]
    NotFitted,
}

/// A binary classifier that yields per-sample class probabilities.
///
/// `predict_proba` returns an `[n_samples, 2]` matrix whose rows are
/// `[P(y = 0), P(y = 1)]`.
pub trait ProbabilityModel: Send {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError>;

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError>;

    /// Seeds the intercept for the next `fit`. Models without an intercept ignore it.
    fn warm_start_intercept(&mut self, intercept: f64) {
        let _ = intercept;
    }
}

/// Which alternative model the likelihood ratio test drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    /// Stochastic-gradient logistic regression.
    Lr,
    /// Closed-form pooled genotype probability estimator.
    ProbSolver,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lr => "lr",
            Self::ProbSolver => "prob-solver",
        }
    }

    /// Column count the model demands per variant, if it constrains it.
    pub fn required_columns(self) -> Option<usize> {
        match self {
            Self::Lr => None,
            Self::ProbSolver => Some(GenotypeProbabilityEstimator::REQUIRED_COLUMNS),
        }
    }

    /// Builds a fresh, unfitted model. `n_iter` sizes iterative models only.
    pub fn build(self, n_iter: usize) -> Box<dyn ProbabilityModel> {
        match self {
            Self::Lr => Box::new(SgdLogisticRegression::new(n_iter)),
            Self::ProbSolver => Box::new(GenotypeProbabilityEstimator::new()),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lr" => Ok(Self::Lr),
            "prob-solver" => Ok(Self::ProbSolver),
            other => Err(ModelError::UnsupportedModelType(other.to_string())),
        }
    }
}
