#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use snplrt::calibrate::model::ModelType;
use snplrt::io::{STATISTICS_DIR, read_features};
use snplrt::pipeline::{ScanOptions, run_likelihood_ratio_tests};
use snplrt::progress::LogScanProgress;

#[derive(Clone, Copy, ValueEnum)]
pub enum ModelTypeCli {
    /// Stochastic-gradient logistic regression
    Lr,
    /// Closed-form pooled genotype probability estimator
    ProbSolver,
}

impl From<ModelTypeCli> for ModelType {
    fn from(value: ModelTypeCli) -> Self {
        match value {
            ModelTypeCli::Lr => ModelType::Lr,
            ModelTypeCli::ProbSolver => ModelType::ProbSolver,
        }
    }
}

#[derive(Args)]
pub struct LrtArgs {
    /// Work directory holding features/ and receiving statistics/
    #[arg(long)]
    pub workdir: PathBuf,

    /// Alternative model fitted for every variant
    #[arg(long, value_enum)]
    pub model_type: ModelTypeCli,

    /// Worker threads for the scan (1 = sequential, 0 = one per core)
    #[arg(long, default_value = "1")]
    pub threads: usize,
}

#[derive(Parser)]
#[command(
    name = "snplrt",
    about = "Per-variant likelihood ratio tests against a binary phenotype",
    long_about = "Scores every variant in a feature store with a likelihood ratio test \
                 comparing a base-rate null model against a genotype-aware model, and \
                 writes one p-value per variant."
)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run likelihood ratio tests for every variant in the work directory
    Lrt(LrtArgs),
    /// Show version information
    Version,
}

fn init_logging(level: &str) {
    let log_level = level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Warning: Invalid log level '{level}' provided. Defaulting to Info.");
        log::LevelFilter::Info
    });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();
}

pub fn run_lrt(args: LrtArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.workdir.is_dir() {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Work directory '{}' does not exist.", args.workdir.display()),
        )));
    }

    let options = ScanOptions {
        threads: args.threads,
        ..ScanOptions::new(args.model_type.into())
    };
    log::info!(
        "Running likelihood ratio tests in {} with model type '{}'",
        args.workdir.display(),
        options.model_type
    );

    let features = read_features(&args.workdir)?;
    let shape = features.feature_matrix.dim();
    println!("Feature matrix shape: ({}, {})", shape.0, shape.1);

    let stats_dir = args.workdir.join(STATISTICS_DIR);
    let summary = run_likelihood_ratio_tests(&features, &options, &stats_dir, &LogScanProgress)?;
    println!(
        "Tested {} variants across {} samples; results in {}",
        summary.n_variants,
        summary.n_samples,
        stats_dir.join(&summary.report_file).display()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let Cli { log_level, command } = cli;
    init_logging(&log_level);

    let result = match command {
        Some(Commands::Lrt(args)) => run_lrt(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("SNPLRT_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("snplrt {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
