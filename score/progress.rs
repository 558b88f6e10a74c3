use crate::types::SnpLabel;
use std::fmt;

/// Stages reported during a variant scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanProgressStage {
    Validation,
    Testing,
    Reporting,
}

impl ScanProgressStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Validation => "input validation",
            Self::Testing => "likelihood ratio testing",
            Self::Reporting => "report writing",
        }
    }
}

impl fmt::Display for ScanProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while scanning variants.
///
/// Variants may be tested on several threads at once, so callbacks take `&self`
/// and can arrive out of scan order.
pub trait ScanProgressObserver: Sync {
    fn on_stage_start(&self, stage: ScanProgressStage, total_variants: usize) {
        let _ = (stage, total_variants);
    }
    fn on_variant_tested(&self, index: usize, label: &SnpLabel, p_value: f64) {
        let _ = (index, label, p_value);
    }
    fn on_stage_finish(&self, stage: ScanProgressStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopScanProgress;

impl ScanProgressObserver for NoopScanProgress {}

/// Logs stage boundaries, plus one line per tested variant at scan indices
/// 1, 2, 4, 8, and so on.
#[derive(Default)]
pub struct LogScanProgress;

impl LogScanProgress {
    pub fn is_milestone(index: usize) -> bool {
        index.is_power_of_two()
    }
}

impl ScanProgressObserver for LogScanProgress {
    fn on_stage_start(&self, stage: ScanProgressStage, total_variants: usize) {
        log::info!("Starting {stage} for {total_variants} variants");
    }

    fn on_variant_tested(&self, index: usize, label: &SnpLabel, p_value: f64) {
        if Self::is_milestone(index) {
            log::info!("{index} SNP {label} has p-value {p_value}");
        }
    }

    fn on_stage_finish(&self, stage: ScanProgressStage) {
        log::info!("Finished {stage}");
    }
}
