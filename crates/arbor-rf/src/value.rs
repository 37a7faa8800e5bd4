//! Tagged feature values and per-column kinds.

use std::fmt;

use crate::error::ForestError;

/// How a column is compared at split nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColumnKind {
    /// Compared by equality.
    Categorical,
    /// Compared by order (`<=`).
    Numeric,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Categorical => f.write_str("categorical"),
            ColumnKind::Numeric => f.write_str("numeric"),
        }
    }
}

/// A single cell of a feature vector.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FeatureValue {
    /// A real-valued cell, split on `value <= threshold`.
    Numeric(f64),
    /// A discrete cell, split on `value == category`.
    Categorical(String),
}

impl FeatureValue {
    /// Return the kind of column this value belongs to.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            FeatureValue::Numeric(_) => ColumnKind::Numeric,
            FeatureValue::Categorical(_) => ColumnKind::Categorical,
        }
    }

    /// Return the numeric value, if this is a numeric cell.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Categorical(_) => None,
        }
    }

    /// Return the category, if this is a categorical cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Numeric(_) => None,
            FeatureValue::Categorical(s) => Some(s),
        }
    }

    /// Return `true` when a sample holding `self` goes to the left child of a
    /// node split on `split`.
    ///
    /// Numeric splits send `self <= split` left; categorical splits send
    /// `self == split` left. A value whose kind differs from the split's
    /// never goes left.
    #[must_use]
    pub fn goes_left(&self, split: &FeatureValue) -> bool {
        match (self, split) {
            (FeatureValue::Numeric(v), FeatureValue::Numeric(t)) => v <= t,
            (FeatureValue::Categorical(v), FeatureValue::Categorical(t)) => v == t,
            _ => false,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Numeric(v) => write!(f, "{v}"),
            FeatureValue::Categorical(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Numeric(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Categorical(value.to_owned())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Categorical(value)
    }
}

/// Build a row of numeric cells.
#[must_use]
pub fn numeric_row(values: &[f64]) -> Vec<FeatureValue> {
    values.iter().copied().map(FeatureValue::Numeric).collect()
}

/// Build a row of categorical cells.
#[must_use]
pub fn categorical_row<S: AsRef<str>>(values: &[S]) -> Vec<FeatureValue> {
    values
        .iter()
        .map(|s| FeatureValue::Categorical(s.as_ref().to_owned()))
        .collect()
}

/// Validate a sample bag and resolve the kind of every column.
///
/// Kinds are taken from the first sample; every other sample must have the
/// same arity and agree column by column. Numeric cells must be finite.
pub(crate) fn resolve_column_kinds(
    features: &[Vec<FeatureValue>],
    n_labels: usize,
) -> Result<Vec<ColumnKind>, ForestError> {
    if features.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    if features.len() != n_labels {
        return Err(ForestError::LabelCountMismatch {
            samples: features.len(),
            labels: n_labels,
        });
    }
    let kinds: Vec<ColumnKind> = features[0].iter().map(FeatureValue::kind).collect();
    if kinds.is_empty() {
        return Err(ForestError::ZeroFeatures);
    }
    check_rows(features, &kinds, 0)?;
    Ok(kinds)
}

/// Check that every row matches `kinds`; `offset` shifts reported sample indices.
pub(crate) fn check_rows(
    features: &[Vec<FeatureValue>],
    kinds: &[ColumnKind],
    offset: usize,
) -> Result<(), ForestError> {
    for (i, row) in features.iter().enumerate() {
        let sample_index = offset + i;
        if row.len() != kinds.len() {
            return Err(ForestError::FeatureCountMismatch {
                expected: kinds.len(),
                got: row.len(),
                sample_index,
            });
        }
        for (column, (cell, &expected)) in row.iter().zip(kinds).enumerate() {
            if cell.kind() != expected {
                return Err(ForestError::ColumnKindMismatch {
                    sample_index,
                    column,
                    expected,
                });
            }
            if let FeatureValue::Numeric(v) = cell
                && !v.is_finite()
            {
                return Err(ForestError::NonFiniteValue {
                    sample_index,
                    feature_index: column,
                });
            }
        }
    }
    Ok(())
}

/// Check a prediction input against the kinds the model was trained with.
pub(crate) fn check_input(input: &[FeatureValue], kinds: &[ColumnKind]) -> Result<(), ForestError> {
    if input.len() != kinds.len() {
        return Err(ForestError::PredictionFeatureMismatch {
            expected: kinds.len(),
            got: input.len(),
        });
    }
    for (column, (cell, &expected)) in input.iter().zip(kinds).enumerate() {
        if cell.kind() != expected {
            return Err(ForestError::PredictionKindMismatch { column, expected });
        }
    }
    Ok(())
}
