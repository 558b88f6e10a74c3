// ========================================================================================
//
//                              The Variant Scan Pipeline
//
// ========================================================================================
//
// Drives one likelihood ratio test per variant. Structural problems (label count,
// non-binary labels, column indices, per-model column counts) are detected for every
// variant before the first test runs. Each test fits a model freshly built from the
// factory, so no fitted state is shared between variants. Results are gathered in
// scan order and only then handed to the report sink.

use crate::calibrate::iterations::estimate_iterations;
use crate::calibrate::lrt::{
    LrtError, LrtOptions, likelihood_ratio_test_with_options, validate_binary_labels,
};
use crate::calibrate::model::ModelType;
use crate::io::{REPORT_FILE, write_atomically, write_report};
use crate::progress::{ScanProgressObserver, ScanProgressStage};
use crate::types::{FeatureSet, PValueRecord, SnpLabel};
use ndarray::Axis;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUMMARY_FILE: &str = "scan_summary.toml";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("The feature matrix has {rows} sample rows but {labels} class labels were read.")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("Invalid class labels: {0}")]
    Labels(#[source] LrtError),
    #[error("Variant {label} maps to no feature columns.")]
    EmptyVariant { label: SnpLabel },
    #[error(
        "Variant {label} references feature column {column}, but the matrix has only {n_features} columns."
    )]
    ColumnOutOfRange {
        label: SnpLabel,
        column: usize,
        n_features: usize,
    },
    #[error(
        "Variant {label} is encoded by {found} feature columns, but model type '{model_type}' requires exactly {expected}."
    )]
    InvalidShape {
        label: SnpLabel,
        model_type: ModelType,
        expected: usize,
        found: usize,
    },
    #[error("Likelihood ratio test failed for variant {label}: {source}")]
    Variant {
        label: SnpLabel,
        #[source]
        source: LrtError,
    },
    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize scan summary: {0}")]
    Summary(#[from] toml::ser::Error),
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub model_type: ModelType,
    pub lrt: LrtOptions,
    /// Worker threads for the scan. `1` runs sequentially on the calling thread,
    /// `0` lets rayon pick one thread per core.
    pub threads: usize,
}

impl ScanOptions {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            lrt: LrtOptions::default(),
            threads: 1,
        }
    }
}

/// Result of scoring every variant, in scan order.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub records: Vec<PValueRecord>,
    pub iteration_budget: usize,
}

/// Reproducibility record written next to the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub model_type: ModelType,
    pub n_samples: usize,
    pub n_variants: usize,
    pub iteration_budget: usize,
    pub probability_epsilon: f64,
    /// Distinct chi-square degrees of freedom used, one per feature-column count.
    pub degrees_of_freedom: Vec<usize>,
    pub report_file: String,
}

impl ScanSummary {
    pub fn save(&self, path: &Path) -> Result<(), ScanError> {
        let toml_string = toml::to_string_pretty(self)?;
        write_atomically(path, |writer| writer.write_all(toml_string.as_bytes())).map_err(
            |source| ScanError::Io {
                path: path.to_path_buf(),
                source,
            },
        )
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }
}

/// Checks every structural precondition before any variant is tested.
fn validate(features: &FeatureSet, model_type: ModelType) -> Result<(), ScanError> {
    let rows = features.feature_matrix.nrows();
    let labels = features.class_labels.len();
    if rows != labels {
        return Err(ScanError::LabelCountMismatch { rows, labels });
    }
    validate_binary_labels(features.class_labels.view()).map_err(ScanError::Labels)?;

    let n_features = features.feature_matrix.ncols();
    for (label, columns) in features.snp_feature_map.iter() {
        if columns.is_empty() {
            return Err(ScanError::EmptyVariant {
                label: label.clone(),
            });
        }
        if let Some(&column) = columns.iter().find(|&&c| c >= n_features) {
            return Err(ScanError::ColumnOutOfRange {
                label: label.clone(),
                column,
                n_features,
            });
        }
        if let Some(expected) = model_type.required_columns() {
            if columns.len() != expected {
                return Err(ScanError::InvalidShape {
                    label: label.clone(),
                    model_type,
                    expected,
                    found: columns.len(),
                });
            }
        }
    }
    Ok(())
}

fn test_variant(
    features: &FeatureSet,
    options: &ScanOptions,
    iteration_budget: usize,
    label: &SnpLabel,
    columns: &[usize],
) -> Result<PValueRecord, ScanError> {
    let snp_features = features.feature_matrix.select(Axis(1), columns);
    let mut model = options.model_type.build(iteration_budget);
    let outcome = likelihood_ratio_test_with_options(
        snp_features.view(),
        features.class_labels.view(),
        model.as_mut(),
        &options.lrt,
    )
    .map_err(|source| ScanError::Variant {
        label: label.clone(),
        source,
    })?;
    log::debug!(
        "{label}: null ll={:.4}, alt ll={:.4}, G={:.4}, df={}, p={}",
        outcome.null_log_likelihood,
        outcome.alternative_log_likelihood,
        outcome.statistic,
        outcome.degrees_of_freedom,
        outcome.p_value
    );
    Ok(PValueRecord {
        label: label.clone(),
        p_value: outcome.p_value,
    })
}

/// Tests every variant in the feature map and returns the p-values in scan order.
pub fn scan_variants(
    features: &FeatureSet,
    options: &ScanOptions,
    progress: &dyn ScanProgressObserver,
) -> Result<ScanOutcome, ScanError> {
    let n_variants = features.snp_feature_map.len();

    progress.on_stage_start(ScanProgressStage::Validation, n_variants);
    validate(features, options.model_type)?;
    progress.on_stage_finish(ScanProgressStage::Validation);

    let iteration_budget = estimate_iterations(features.n_samples());
    log::debug!(
        "Iteration budget for {} samples: {iteration_budget}",
        features.n_samples()
    );

    progress.on_stage_start(ScanProgressStage::Testing, n_variants);
    type Entry = (SnpLabel, Vec<usize>);
    let score = |(index, (label, columns)): (usize, &Entry)| -> Result<PValueRecord, ScanError> {
        let record = test_variant(features, options, iteration_budget, label, columns)?;
        progress.on_variant_tested(index, label, record.p_value);
        Ok(record)
    };

    let entries = features.snp_feature_map.entries();
    let records = if options.threads == 1 {
        entries
            .iter()
            .enumerate()
            .map(score)
            .collect::<Result<Vec<_>, ScanError>>()?
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()?;
        pool.install(|| {
            entries
                .par_iter()
                .enumerate()
                .map(score)
                .collect::<Result<Vec<_>, ScanError>>()
        })?
    };
    progress.on_stage_finish(ScanProgressStage::Testing);

    Ok(ScanOutcome {
        records,
        iteration_budget,
    })
}

/// Scans every variant, then writes the report and summary into `stats_dir`.
///
/// Nothing is written unless every variant was tested successfully.
pub fn run_likelihood_ratio_tests(
    features: &FeatureSet,
    options: &ScanOptions,
    stats_dir: &Path,
    progress: &dyn ScanProgressObserver,
) -> Result<ScanSummary, ScanError> {
    let outcome = scan_variants(features, options, progress)?;

    progress.on_stage_start(ScanProgressStage::Reporting, outcome.records.len());
    fs::create_dir_all(stats_dir).map_err(|source| ScanError::Io {
        path: stats_dir.to_path_buf(),
        source,
    })?;
    let report_path = stats_dir.join(REPORT_FILE);
    write_report(&report_path, &outcome.records).map_err(|source| ScanError::Io {
        path: report_path.clone(),
        source,
    })?;

    let mut degrees_of_freedom: Vec<usize> = features
        .snp_feature_map
        .iter()
        .map(|(_, columns)| columns.len())
        .collect();
    degrees_of_freedom.sort_unstable();
    degrees_of_freedom.dedup();

    let summary = ScanSummary {
        model_type: options.model_type,
        n_samples: features.n_samples(),
        n_variants: outcome.records.len(),
        iteration_budget: outcome.iteration_budget,
        probability_epsilon: options.lrt.probability_epsilon,
        degrees_of_freedom,
        report_file: REPORT_FILE.to_string(),
    };
    // A report without its summary is never left behind.
    summary
        .save(&stats_dir.join(SUMMARY_FILE))
        .inspect_err(|_| {
            if let Err(e) = fs::remove_file(&report_path) {
                log::warn!("Could not remove {}: {e}", report_path.display());
            }
        })?;
    progress.on_stage_finish(ScanProgressStage::Reporting);

    log::info!(
        "Wrote {} p-values to {}",
        summary.n_variants,
        report_path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::model::ModelError;
    use crate::progress::NoopScanProgress;
    use crate::types::SnpFeatureMap;
    use ndarray::{Array1, Array2, array};
    use std::sync::Mutex;

    /// Six samples, one per genotype key, followed by a second two-column variant.
    fn small_feature_set() -> FeatureSet {
        let feature_matrix = array![
            [2.0, 0.0, 1.0, 1.0],
            [0.0, 2.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
            [1.0, 0.0, 1.0, 1.0],
            [0.0, 1.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
        ];
        let snp_feature_map: SnpFeatureMap = vec![
            (SnpLabel::new("7", 300), vec![0, 1]),
            (SnpLabel::new("1", 100), vec![2, 3]),
            (SnpLabel::new("7", 200), vec![0, 1]),
        ]
        .into_iter()
        .collect();
        FeatureSet {
            feature_matrix,
            class_labels: array![1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
            snp_feature_map,
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        tested: Mutex<Vec<usize>>,
    }

    impl ScanProgressObserver for RecordingProgress {
        fn on_variant_tested(&self, index: usize, label: &SnpLabel, p_value: f64) {
            let _ = (label, p_value);
            self.tested.lock().unwrap().push(index);
        }
    }

    #[test]
    fn records_follow_map_order() {
        let features = small_feature_set();
        let options = ScanOptions::new(ModelType::ProbSolver);
        let outcome = scan_variants(&features, &options, &NoopScanProgress).unwrap();
        let labels: Vec<String> = outcome
            .records
            .iter()
            .map(|r| r.label.to_string())
            .collect();
        assert_eq!(labels, vec!["7:300", "1:100", "7:200"]);
        // The constant variant carries no information.
        assert_eq!(outcome.records[1].p_value, 1.0);
        assert!(outcome.records[0].p_value < 1.0);
        assert_eq!(outcome.records[0].p_value, outcome.records[2].p_value);
    }

    #[test]
    fn parallel_scan_matches_sequential_scan() {
        let features = small_feature_set();
        for model_type in [ModelType::ProbSolver, ModelType::Lr] {
            let sequential = ScanOptions::new(model_type);
            let parallel = ScanOptions {
                threads: 3,
                ..ScanOptions::new(model_type)
            };
            let progress = RecordingProgress::default();
            let a = scan_variants(&features, &sequential, &NoopScanProgress).unwrap();
            let b = scan_variants(&features, &parallel, &progress).unwrap();
            assert_eq!(a.records, b.records);

            let mut tested = progress.tested.into_inner().unwrap();
            tested.sort_unstable();
            assert_eq!(tested, vec![0, 1, 2]);
        }
    }

    #[test]
    fn structural_errors_abort_before_testing() {
        let mut features = small_feature_set();
        features.snp_feature_map.push(SnpLabel::new("9", 1), vec![0, 1, 2]);
        let progress = RecordingProgress::default();
        let err = scan_variants(&features, &ScanOptions::new(ModelType::ProbSolver), &progress)
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::InvalidShape {
                expected: 2,
                found: 3,
                ..
            }
        ));
        assert!(progress.tested.lock().unwrap().is_empty());

        // The logistic model accepts any column count.
        assert!(scan_variants(&features, &ScanOptions::new(ModelType::Lr), &NoopScanProgress).is_ok());

        let mut features = small_feature_set();
        features.snp_feature_map.push(SnpLabel::new("9", 1), vec![0, 12]);
        assert!(matches!(
            scan_variants(&features, &ScanOptions::new(ModelType::Lr), &NoopScanProgress),
            Err(ScanError::ColumnOutOfRange { column: 12, .. })
        ));

        let mut features = small_feature_set();
        features.class_labels = Array1::zeros(5);
        assert!(matches!(
            scan_variants(&features, &ScanOptions::new(ModelType::Lr), &NoopScanProgress),
            Err(ScanError::LabelCountMismatch { rows: 6, labels: 5 })
        ));

        let mut features = small_feature_set();
        features.class_labels[3] = 0.5;
        assert!(matches!(
            scan_variants(&features, &ScanOptions::new(ModelType::Lr), &NoopScanProgress),
            Err(ScanError::Labels(LrtError::NonBinaryLabel { row: 3, .. }))
        ));
    }

    #[test]
    fn unknown_genotype_aborts_the_scan() {
        let mut features = small_feature_set();
        features.feature_matrix = Array2::from_elem((6, 4), 1.0);
        features.feature_matrix[[4, 2]] = 2.0;
        features.feature_matrix[[4, 3]] = 2.0;
        let err = scan_variants(
            &features,
            &ScanOptions::new(ModelType::ProbSolver),
            &NoopScanProgress,
        )
        .unwrap_err();
        match err {
            ScanError::Variant { label, source } => {
                assert_eq!(label, SnpLabel::new("1", 100));
                assert!(matches!(
                    source,
                    LrtError::Model(ModelError::UnknownGenotype { row: 4, .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_scan_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stats_dir = dir.path().join("statistics");
        let mut features = small_feature_set();
        features.feature_matrix[[0, 0]] = 5.0;
        let result = run_likelihood_ratio_tests(
            &features,
            &ScanOptions::new(ModelType::ProbSolver),
            &stats_dir,
            &NoopScanProgress,
        );
        assert!(result.is_err());
        assert!(!stats_dir.join(REPORT_FILE).exists());
    }

    #[test]
    fn failed_summary_write_removes_report() {
        let dir = tempfile::tempdir().unwrap();
        let stats_dir = dir.path().join("statistics");
        // A non-empty directory where the summary belongs makes the final rename fail.
        let blocker = stats_dir.join(SUMMARY_FILE);
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), "x").unwrap();

        let err = run_likelihood_ratio_tests(
            &small_feature_set(),
            &ScanOptions::new(ModelType::ProbSolver),
            &stats_dir,
            &NoopScanProgress,
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Io { ref path, .. } if path == &blocker), "{err}");
        assert!(!stats_dir.join(REPORT_FILE).exists());
    }

    #[test]
    fn summary_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let features = small_feature_set();
        let summary = run_likelihood_ratio_tests(
            &features,
            &ScanOptions::new(ModelType::ProbSolver),
            dir.path(),
            &NoopScanProgress,
        )
        .unwrap();
        assert_eq!(summary.n_variants, 3);
        assert_eq!(summary.n_samples, 6);
        assert_eq!(summary.degrees_of_freedom, vec![2]);
        assert_eq!(summary.iteration_budget, estimate_iterations(6));

        let loaded = ScanSummary::load(&dir.path().join(SUMMARY_FILE)).unwrap();
        assert_eq!(loaded, summary);
        let text = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        assert!(text.contains("model_type = \"prob-solver\""), "{text}");
    }
}
