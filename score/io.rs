// ========================================================================================
//
//                          Feature Store and Report Sink
//
// ========================================================================================
//
// ### Purpose ###
//
// Reads the three tab-separated feature store files from a work directory into the
// in-memory `FeatureSet`, and writes the per-variant p-value report. Reports are
// staged in a hidden temporary file and renamed into place only after every line
// has been flushed, so a failed run never leaves a truncated report behind.

use crate::types::{FeatureSet, PValueRecord, SnpFeatureMap, SnpLabel};
use ndarray::{Array1, Array2};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const FEATURES_DIR: &str = "features";
pub const FEATURE_MATRIX_FILE: &str = "feature_matrix.tsv";
pub const CLASS_LABELS_FILE: &str = "class_labels.txt";
pub const SNP_FEATURE_MAP_FILE: &str = "snp_feature_map.tsv";
pub const STATISTICS_DIR: &str = "statistics";
pub const REPORT_FILE: &str = "snp_likelihood_ratio_tests.txt";

#[derive(Error, Debug)]
pub enum FeatureStoreError {
    #[error("Required input file '{0}' does not exist.")]
    MissingFile(PathBuf),
    #[error("Failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}, line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },
    #[error("Feature matrix row {line} has {found} columns, but the first row has {expected}.")]
    RaggedMatrix {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Paths of the feature store inside a work directory.
#[derive(Debug, Clone)]
pub struct FeatureStorePaths {
    pub feature_matrix: PathBuf,
    pub class_labels: PathBuf,
    pub snp_feature_map: PathBuf,
}

impl FeatureStorePaths {
    pub fn in_workdir(workdir: &Path) -> Self {
        let dir = workdir.join(FEATURES_DIR);
        Self {
            feature_matrix: dir.join(FEATURE_MATRIX_FILE),
            class_labels: dir.join(CLASS_LABELS_FILE),
            snp_feature_map: dir.join(SNP_FEATURE_MAP_FILE),
        }
    }
}

/// Loads the feature matrix, class labels, and variant map from `<workdir>/features/`.
pub fn read_features(workdir: &Path) -> Result<FeatureSet, FeatureStoreError> {
    let paths = FeatureStorePaths::in_workdir(workdir);
    let feature_matrix = read_feature_matrix(&paths.feature_matrix)?;
    let class_labels = read_class_labels(&paths.class_labels)?;
    let snp_feature_map = read_snp_feature_map(&paths.snp_feature_map)?;
    log::info!(
        "Loaded feature matrix with {} samples and {} features; {} variants mapped",
        feature_matrix.nrows(),
        feature_matrix.ncols(),
        snp_feature_map.len()
    );
    Ok(FeatureSet {
        feature_matrix,
        class_labels,
        snp_feature_map,
    })
}

fn open_tsv(path: &Path) -> Result<csv::Reader<File>, FeatureStoreError> {
    if !path.exists() {
        return Err(FeatureStoreError::MissingFile(path.to_path_buf()));
    }
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| FeatureStoreError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_field<T: std::str::FromStr>(
    path: &Path,
    line: u64,
    field: &str,
    what: &str,
) -> Result<T, FeatureStoreError> {
    field.trim().parse::<T>().map_err(|_| FeatureStoreError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("could not parse {what} from '{field}'"),
    })
}

/// Iterates records together with their 1-based line numbers.
fn records(
    reader: &mut csv::Reader<File>,
    path: &Path,
) -> impl Iterator<Item = Result<(u64, csv::StringRecord), FeatureStoreError>> {
    reader.records().map(move |record| {
        let record = record.map_err(|source| FeatureStoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record.position().map_or(0, |p| p.line());
        Ok((line, record))
    })
}

pub fn read_feature_matrix(path: &Path) -> Result<Array2<f64>, FeatureStoreError> {
    let mut reader = open_tsv(path)?;
    let mut values = Vec::new();
    let mut n_cols = None;
    let mut n_rows = 0;

    for item in records(&mut reader, path) {
        let (line, record) = item?;
        let expected = *n_cols.get_or_insert(record.len());
        if record.len() != expected {
            return Err(FeatureStoreError::RaggedMatrix {
                line,
                expected,
                found: record.len(),
            });
        }
        for field in record.iter() {
            values.push(parse_field::<f64>(path, line, field, "a feature value")?);
        }
        n_rows += 1;
    }

    Array2::from_shape_vec((n_rows, n_cols.unwrap_or(0)), values).map_err(|e| {
        FeatureStoreError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        }
    })
}

pub fn read_class_labels(path: &Path) -> Result<Array1<f64>, FeatureStoreError> {
    let mut reader = open_tsv(path)?;
    let mut labels = Vec::new();
    for item in records(&mut reader, path) {
        let (line, record) = item?;
        let field = record.get(0).unwrap_or("");
        let label = parse_field::<u8>(path, line, field, "a 0/1 class label")?;
        if label > 1 {
            return Err(FeatureStoreError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("class label must be 0 or 1, found {label}"),
            });
        }
        labels.push(f64::from(label));
    }
    Ok(Array1::from(labels))
}

pub fn read_snp_feature_map(path: &Path) -> Result<SnpFeatureMap, FeatureStoreError> {
    let mut reader = open_tsv(path)?;
    let mut map = SnpFeatureMap::new();
    for item in records(&mut reader, path) {
        let (line, record) = item?;
        if record.len() != 3 {
            return Err(FeatureStoreError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!(
                    "expected 3 fields (chromosome, position, columns), found {}",
                    record.len()
                ),
            });
        }
        let chromosome = record[0].trim().to_string();
        let position = parse_field::<u64>(path, line, &record[1], "a position")?;
        let columns = record[2]
            .split(',')
            .map(|c| parse_field::<usize>(path, line, c, "a feature column index"))
            .collect::<Result<Vec<_>, _>>()?;
        map.push(SnpLabel::new(chromosome, position), columns);
    }
    Ok(map)
}

/// Writes `contents` to a uniquely named temporary file next to `path`, then renames
/// it over `path`. The temporary file is removed on any failure.
pub fn write_atomically<F>(path: &Path, contents: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let output_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let output_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Output path '{}' has no file name.", path.display()),
        )
    })?;

    let pid = std::process::id();
    let ts_nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut staged = None;
    for attempt in 0..32u32 {
        let candidate = output_dir.join(format!(
            ".{}.{}.{}.tmp",
            output_name.to_string_lossy(),
            pid,
            ts_nanos + attempt as u128
        ));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => {
                staged = Some((candidate, file));
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    let (temp_path, temp_file) = staged.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "Failed to allocate a unique temporary output file in '{}'.",
                output_dir.display()
            ),
        )
    })?;

    let mut writer = BufWriter::new(temp_file);
    let write_result = contents(&mut writer).and_then(|()| {
        writer.flush()?;
        let file = writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()
    });

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

/// Writes one `chromosome<TAB>position<TAB>p_value` line per record, in order, with no
/// header. P-values use the shortest representation that round-trips.
pub fn write_report(path: &Path, records: &[PValueRecord]) -> io::Result<()> {
    write_atomically(path, |writer| {
        let mut ryu_buffer = ryu::Buffer::new();
        for record in records {
            writeln!(
                writer,
                "{}\t{}\t{}",
                record.label.chromosome,
                record.label.position,
                ryu_buffer.format(record.p_value)
            )?;
        }
        Ok(())
    })
}
