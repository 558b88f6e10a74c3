//! # Likelihood Ratio Test
//!
//! Compares a null model, which predicts the sample-wide case rate for everyone,
//! against an alternative model fitted on one variant's feature columns. Twice the
//! log-likelihood gain is referred to a chi-square distribution whose degrees of
//! freedom equal the number of feature columns; both models carry an intercept, so
//! the intercept term cancels.

use super::model::{ModelError, ProbabilityModel};
use ndarray::{Array1, ArrayView1, ArrayView2};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use thiserror::Error;

/// Probabilities are clamped to `[eps, 1 - eps]` before taking logarithms.
pub const DEFAULT_PROBABILITY_EPSILON: f64 = 1e-15;

#[derive(Error, Debug)]
pub enum LrtError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Class label {value} at row {row} is not binary; labels must be 0 or 1.")]
    NonBinaryLabel { row: usize, value: f64 },
    #[error("Could not construct chi-square distribution: {0}")]
    Distribution(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrtOptions {
    pub probability_epsilon: f64,
    /// Start the alternative model's intercept at the null model's log-odds.
    pub warm_start_intercept: bool,
}

impl Default for LrtOptions {
    fn default() -> Self {
        Self {
            probability_epsilon: DEFAULT_PROBABILITY_EPSILON,
            warm_start_intercept: true,
        }
    }
}

/// Everything computed while testing one variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrtOutcome {
    pub null_log_likelihood: f64,
    pub alternative_log_likelihood: f64,
    /// `2 * (alternative - null)`, clamped at zero.
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

/// Rejects labels other than exactly `0.0` or `1.0`.
pub fn validate_binary_labels(labels: ArrayView1<'_, f64>) -> Result<(), LrtError> {
    match labels
        .iter()
        .enumerate()
        .find(|&(_, &v)| v != 0.0 && v != 1.0)
    {
        Some((row, &value)) => Err(LrtError::NonBinaryLabel { row, value }),
        None => Ok(()),
    }
}

/// Bernoulli log-likelihood of `labels` given positive-class probabilities.
pub fn log_likelihood(
    labels: ArrayView1<'_, f64>,
    positive_probs: ArrayView1<'_, f64>,
    epsilon: f64,
) -> f64 {
    labels
        .iter()
        .zip(positive_probs.iter())
        .map(|(&y, &p)| {
            let p = p.clamp(epsilon, 1.0 - epsilon);
            y * p.ln() + (1.0 - y) * (1.0 - p).ln()
        })
        .sum()
}

/// Right-tail probability of a chi-square statistic. Non-positive statistics map to 1.
pub fn chi_square_p_value(statistic: f64, degrees_of_freedom: usize) -> Result<f64, LrtError> {
    if statistic.is_nan() {
        return Ok(f64::NAN);
    }
    if statistic <= 0.0 {
        return Ok(1.0);
    }
    let dist = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|e| LrtError::Distribution(e.to_string()))?;
    Ok(dist.sf(statistic))
}

/// Tests one variant and returns only its p-value.
pub fn likelihood_ratio_test(
    features: ArrayView2<'_, f64>,
    labels: ArrayView1<'_, f64>,
    model: &mut dyn ProbabilityModel,
) -> Result<f64, LrtError> {
    likelihood_ratio_test_with_options(features, labels, model, &LrtOptions::default())
        .map(|outcome| outcome.p_value)
}

/// Tests one variant, reporting both log-likelihoods and the statistic.
pub fn likelihood_ratio_test_with_options(
    features: ArrayView2<'_, f64>,
    labels: ArrayView1<'_, f64>,
    model: &mut dyn ProbabilityModel,
    options: &LrtOptions,
) -> Result<LrtOutcome, LrtError> {
    let n = labels.len();
    if n != features.nrows() {
        return Err(ModelError::LabelCountMismatch {
            rows: features.nrows(),
            labels: n,
        }
        .into());
    }
    if n == 0 {
        return Err(ModelError::EmptyInput.into());
    }
    validate_binary_labels(labels)?;

    let eps = options.probability_epsilon;
    let base_rate = labels.sum() / n as f64;
    let null_probs = Array1::from_elem(n, base_rate);
    let null_log_likelihood = log_likelihood(labels, null_probs.view(), eps);

    if options.warm_start_intercept {
        let clamped = base_rate.clamp(eps, 1.0 - eps);
        model.warm_start_intercept((clamped / (1.0 - clamped)).ln());
    }
    model.fit(features, labels)?;
    let alt_probs = model.predict_proba(features)?;
    let alternative_log_likelihood = log_likelihood(labels, alt_probs.column(1), eps);

    let degrees_of_freedom = features.ncols();
    let raw = 2.0 * (alternative_log_likelihood - null_log_likelihood);
    if raw.is_nan() {
        log::warn!("Likelihood ratio statistic is NaN; reporting an undefined p-value");
    }
    let statistic = if raw.is_nan() || raw > 0.0 { raw } else { 0.0 };
    let p_value = chi_square_p_value(statistic, degrees_of_freedom)?;

    Ok(LrtOutcome {
        null_log_likelihood,
        alternative_log_likelihood,
        statistic,
        degrees_of_freedom,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::genotype::GenotypeProbabilityEstimator;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    #[test]
    fn log_likelihood_clamps_impossible_predictions() {
        let labels = array![1.0, 0.0];
        let probs = array![0.0, 1.0];
        let ll = log_likelihood(labels.view(), probs.view(), 1e-15);
        assert!(ll.is_finite());
        assert_abs_diff_eq!(ll, 2.0 * 1e-15_f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn chi_square_tail_matches_known_values() {
        assert_eq!(chi_square_p_value(0.0, 2).unwrap(), 1.0);
        assert_eq!(chi_square_p_value(-3.0, 1).unwrap(), 1.0);
        // With two degrees of freedom the survival function is exp(-x / 2).
        assert_abs_diff_eq!(
            chi_square_p_value(4.0, 2).unwrap(),
            (-2.0_f64).exp(),
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(chi_square_p_value(3.841459, 1).unwrap(), 0.05, epsilon = 1e-6);
        assert!(chi_square_p_value(f64::NAN, 1).unwrap().is_nan());
    }

    #[test]
    fn constant_genotype_gives_p_value_one() {
        let features = Array2::from_elem((8, 2), 1.0);
        let labels = array![1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let mut model = GenotypeProbabilityEstimator::new();
        let outcome = likelihood_ratio_test_with_options(
            features.view(),
            labels.view(),
            &mut model,
            &LrtOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.statistic, 0.0);
        assert_eq!(outcome.p_value, 1.0);
        assert_eq!(outcome.degrees_of_freedom, 2);
    }

    #[test]
    fn perfectly_predictive_genotype_gives_tiny_p_value() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            if i % 2 == 0 {
                rows.extend_from_slice(&[2.0, 0.0]);
                labels.push(1.0);
            } else {
                rows.extend_from_slice(&[1.0, 1.0]);
                labels.push(0.0);
            }
        }
        let features = Array2::from_shape_vec((60, 2), rows).unwrap();
        let labels = Array1::from(labels);
        let mut model = GenotypeProbabilityEstimator::new();
        let p = likelihood_ratio_test(features.view(), labels.view(), &mut model).unwrap();
        assert!(p < 1e-12, "p={p}");
    }

    #[test]
    fn rejects_non_binary_and_misaligned_labels() {
        let features = array![[1.0, 1.0], [2.0, 0.0]];
        let mut model = GenotypeProbabilityEstimator::new();

        let err = likelihood_ratio_test(features.view(), array![1.0, 2.0].view(), &mut model)
            .unwrap_err();
        assert!(matches!(err, LrtError::NonBinaryLabel { row: 1, .. }));

        let err =
            likelihood_ratio_test(features.view(), array![1.0].view(), &mut model).unwrap_err();
        assert!(matches!(
            err,
            LrtError::Model(ModelError::LabelCountMismatch { rows: 2, labels: 1 })
        ));
    }

    #[test]
    fn model_errors_propagate() {
        let features = array![[1.0, 1.0, 0.0], [2.0, 0.0, 0.0]];
        let mut model = GenotypeProbabilityEstimator::new();
        let err = likelihood_ratio_test(features.view(), array![1.0, 0.0].view(), &mut model)
            .unwrap_err();
        assert!(matches!(
            err,
            LrtError::Model(ModelError::InvalidShape { expected: 2, found: 3 })
        ));
    }
}
