//! # Closed-Form Genotype Probability Estimator
//!
//! A non-iterative alternative to the logistic classifier. Samples are grouped by
//! their exact two-column genotype encoding, and the phenotype probability for each
//! genotype is the positive rate pooled over that genotype's similarity subset.
//! Pooling lets sparsely observed genotype classes borrow support from related ones.

use super::model::{ModelError, ProbabilityModel};
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::fmt;

/// The six valid dosage-pair encodings of a biallelic variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Genotype {
    /// `(2, 0)`
    TwoFirst,
    /// `(0, 2)`
    TwoSecond,
    /// `(1, 1)`
    OneEach,
    /// `(1, 0)`
    OneFirst,
    /// `(0, 1)`
    OneSecond,
    /// `(0, 0)`
    Neither,
}

/// Deterministic traversal order used whenever the full table is reported.
pub const GENOTYPE_ORDER: [Genotype; 6] = [
    Genotype::TwoFirst,
    Genotype::TwoSecond,
    Genotype::OneEach,
    Genotype::OneFirst,
    Genotype::OneSecond,
    Genotype::Neither,
];

/// Genotypes whose observations are pooled when estimating each genotype's
/// probability, indexed by [`Genotype::index`]. Every subset contains its own key.
static SIMILARITY_TABLE: [&[Genotype]; 6] = [
    // (2, 0)
    &[Genotype::TwoFirst, Genotype::TwoSecond],
    // (0, 2)
    &[Genotype::TwoSecond, Genotype::TwoFirst],
    // (1, 1)
    &[Genotype::OneEach],
    // (1, 0)
    &[Genotype::OneFirst, Genotype::TwoFirst, Genotype::OneEach],
    // (0, 1)
    &[Genotype::OneSecond, Genotype::TwoSecond, Genotype::OneEach],
    // (0, 0)
    &[
        Genotype::Neither,
        Genotype::OneSecond,
        Genotype::OneFirst,
        Genotype::OneEach,
        Genotype::TwoFirst,
    ],
];

impl Genotype {
    /// Position of this key in [`GENOTYPE_ORDER`].
    pub const fn index(self) -> usize {
        match self {
            Self::TwoFirst => 0,
            Self::TwoSecond => 1,
            Self::OneEach => 2,
            Self::OneFirst => 3,
            Self::OneSecond => 4,
            Self::Neither => 5,
        }
    }

    pub const fn dosages(self) -> (f64, f64) {
        match self {
            Self::TwoFirst => (2.0, 0.0),
            Self::TwoSecond => (0.0, 2.0),
            Self::OneEach => (1.0, 1.0),
            Self::OneFirst => (1.0, 0.0),
            Self::OneSecond => (0.0, 1.0),
            Self::Neither => (0.0, 0.0),
        }
    }

    /// Matches an exact dosage pair against the six valid encodings.
    pub fn from_dosages(first: f64, second: f64) -> Option<Self> {
        GENOTYPE_ORDER
            .into_iter()
            .find(|genotype| genotype.dosages() == (first, second))
    }

    /// The genotypes pooled with this one, starting with itself.
    pub fn similarity_subset(self) -> &'static [Genotype] {
        SIMILARITY_TABLE[self.index()]
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (first, second) = self.dosages();
        write!(f, "({first}, {second})")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct GenotypeCounts {
    total: f64,
    positive: f64,
}

/// Fitted phenotype probability for each of the six genotype keys.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpectedProbabilities([f64; 6]);

impl ExpectedProbabilities {
    pub fn get(&self, genotype: Genotype) -> f64 {
        self.0[genotype.index()]
    }

    /// Iterates the table in [`GENOTYPE_ORDER`].
    pub fn iter(&self) -> impl Iterator<Item = (Genotype, f64)> + '_ {
        GENOTYPE_ORDER
            .into_iter()
            .map(move |genotype| (genotype, self.get(genotype)))
    }
}

impl fmt::Display for ExpectedProbabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (genotype, prob)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{genotype}: {prob:.4}")?;
        }
        Ok(())
    }
}

/// Estimates phenotype probabilities per genotype by pooled counting.
#[derive(Clone, Debug, Default)]
pub struct GenotypeProbabilityEstimator {
    expected: Option<ExpectedProbabilities>,
}

impl GenotypeProbabilityEstimator {
    pub const REQUIRED_COLUMNS: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// The table produced by the last call to `fit`, if any.
    pub fn expected_probabilities(&self) -> Option<&ExpectedProbabilities> {
        self.expected.as_ref()
    }
}

fn check_columns(x: &ArrayView2<'_, f64>) -> Result<(), ModelError> {
    if x.ncols() != GenotypeProbabilityEstimator::REQUIRED_COLUMNS {
        return Err(ModelError::InvalidShape {
            expected: GenotypeProbabilityEstimator::REQUIRED_COLUMNS,
            found: x.ncols(),
        });
    }
    Ok(())
}

fn genotype_of_row(x: &ArrayView2<'_, f64>, row: usize) -> Result<Genotype, ModelError> {
    let (first, second) = (x[[row, 0]], x[[row, 1]]);
    Genotype::from_dosages(first, second).ok_or(ModelError::UnknownGenotype {
        row,
        first,
        second,
    })
}

impl ProbabilityModel for GenotypeProbabilityEstimator {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        check_columns(&x)?;
        if y.len() != x.nrows() {
            return Err(ModelError::LabelCountMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }

        let mut counts = [GenotypeCounts::default(); 6];
        for (row, &label) in y.iter().enumerate() {
            let slot = &mut counts[genotype_of_row(&x, row)?.index()];
            slot.total += 1.0;
            if label == 1.0 {
                slot.positive += 1.0;
            }
        }

        let mut table = [0.0; 6];
        for genotype in GENOTYPE_ORDER {
            let pooled = genotype
                .similarity_subset()
                .iter()
                .fold(GenotypeCounts::default(), |acc, related| {
                    let c = counts[related.index()];
                    GenotypeCounts {
                        total: acc.total + c.total,
                        positive: acc.positive + c.positive,
                    }
                });
            if pooled.total != 0.0 {
                table[genotype.index()] = pooled.positive / pooled.total;
            }
        }

        let expected = ExpectedProbabilities(table);
        log::trace!("Fitted genotype probabilities: {expected}");
        self.expected = Some(expected);
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        check_columns(&x)?;
        let expected = self.expected.as_ref().ok_or(ModelError::NotFitted)?;

        let mut probs = Array2::zeros((x.nrows(), 2));
        for row in 0..x.nrows() {
            let p = expected.get(genotype_of_row(&x, row)?);
            probs[[row, 0]] = 1.0 - p;
            probs[[row, 1]] = p;
        }
        Ok(probs)
    }
}
