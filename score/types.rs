// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types shared between the feature store, the scan pipeline, and the report sink.

use ndarray::{Array1, Array2};
use std::fmt;

/// Identifies a variant by chromosome and position. The chromosome is kept verbatim
/// so the report reproduces the input labels exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnpLabel {
    pub chromosome: String,
    pub position: u64,
}

impl SnpLabel {
    pub fn new(chromosome: impl Into<String>, position: u64) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
        }
    }
}

impl fmt::Display for SnpLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chromosome, self.position)
    }
}

/// Ordered association from each variant to the feature-matrix columns encoding it.
/// Insertion order is scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnpFeatureMap {
    entries: Vec<(SnpLabel, Vec<usize>)>,
}

impl SnpFeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: SnpLabel, columns: Vec<usize>) {
        self.entries.push((label, columns));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SnpLabel, &[usize])> {
        self.entries
            .iter()
            .map(|(label, columns)| (label, columns.as_slice()))
    }

    pub fn entries(&self) -> &[(SnpLabel, Vec<usize>)] {
        &self.entries
    }
}

impl FromIterator<(SnpLabel, Vec<usize>)> for SnpFeatureMap {
    fn from_iter<I: IntoIterator<Item = (SnpLabel, Vec<usize>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Everything the scan reads: the sample-by-feature matrix, one binary label per
/// sample row, and the variant-to-column map.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Shape: `[n_samples, n_features]`.
    pub feature_matrix: Array2<f64>,
    pub class_labels: Array1<f64>,
    pub snp_feature_map: SnpFeatureMap,
}

impl FeatureSet {
    pub fn n_samples(&self) -> usize {
        self.feature_matrix.nrows()
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct PValueRecord {
    pub label: SnpLabel,
    pub p_value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_map_preserves_insertion_order() {
        let mut map = SnpFeatureMap::new();
        map.push(SnpLabel::new("2", 50), vec![4, 5]);
        map.push(SnpLabel::new("1", 900), vec![0, 1]);
        map.push(SnpLabel::new("1", 10), vec![2, 3]);

        let order: Vec<String> = map.iter().map(|(label, _)| label.to_string()).collect();
        assert_eq!(order, vec!["2:50", "1:900", "1:10"]);
        assert_eq!(map.len(), 3);
        assert!(!map.is_empty());
    }
}
