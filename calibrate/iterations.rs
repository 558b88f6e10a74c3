//! Training-effort heuristic for the iterative classifier.
//!
//! Stochastic gradient descent needs on the order of `10^5` sample updates to
//! converge, so the number of passes over the data shrinks as the cohort grows.

/// Fewest passes ever used, so tiny cohorts still converge.
pub const MIN_ITERATIONS: usize = 20;

/// Most passes ever used, capping per-variant compute.
pub const MAX_ITERATIONS: usize = 1_000;

/// Target number of individual sample updates per fit.
const TARGET_SAMPLE_UPDATES: f64 = 100_000.0;

/// Number of training passes for a cohort of `sample_count` samples.
///
/// Always within `[MIN_ITERATIONS, MAX_ITERATIONS]` and non-increasing in
/// `sample_count`. An empty cohort gets the maximum.
pub fn estimate_iterations(sample_count: usize) -> usize {
    if sample_count == 0 {
        return MAX_ITERATIONS;
    }
    let passes = (TARGET_SAMPLE_UPDATES / sample_count as f64).ceil() as usize;
    passes.clamp(MIN_ITERATIONS, MAX_ITERATIONS)
}
