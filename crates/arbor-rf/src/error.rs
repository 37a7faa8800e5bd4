use std::path::PathBuf;

use crate::value::ColumnKind;

/// Broad failure category of a [`ForestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed samples, labels or prediction inputs, or an empty ensemble.
    InvalidInput,
    /// Configuration that cannot produce a forest for the retained data.
    InvalidConfiguration,
    /// A sample source failed to deliver a batch.
    SourceUnavailable,
    /// A model sink failed to store or fetch a model.
    SinkUnavailable,
    /// Persisted model state is malformed.
    CorruptModel,
    /// The query has no defined answer for this ensemble.
    UndefinedPrediction,
}

/// Errors from forest training, prediction and persistence.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when a sample bag has zero samples.
    #[error("sample bag has zero samples")]
    EmptyDataset,

    /// Returned when samples have zero feature columns.
    #[error("samples have zero feature columns")]
    ZeroFeatures,

    /// Returned when the number of labels differs from the number of samples.
    #[error("got {labels} labels for {samples} samples")]
    LabelCountMismatch {
        /// Number of feature vectors supplied.
        samples: usize,
        /// Number of labels supplied.
        labels: usize,
    },

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a cell's kind disagrees with the kind resolved for its column.
    #[error("sample {sample_index}, column {column}: expected a {expected} value")]
    ColumnKindMismatch {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based column index.
        column: usize,
        /// The kind resolved for the column.
        expected: ColumnKind,
    },

    /// Returned when a numeric value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a prediction input has the wrong number of features.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a prediction input cell has the wrong kind for its column.
    #[error("prediction input column {column}: expected a {expected} value")]
    PredictionKindMismatch {
        /// The zero-based column index.
        column: usize,
        /// The kind the forest was trained with for this column.
        expected: ColumnKind,
    },

    /// Returned when predicting or ranking features with no trained trees.
    #[error("the ensemble has no trees")]
    EmptyEnsemble,

    /// Returned when the sliding window capacity is zero.
    #[error("buffer_size must be at least 1, got {buffer_size}")]
    InvalidBufferSize {
        /// The invalid buffer size.
        buffer_size: usize,
    },

    /// Returned when a tree count is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid tree count.
        n_trees: usize,
    },

    /// Returned when the sample fraction is not a positive finite number, or
    /// when it would draw more than `u32::MAX` samples per tree.
    #[error(
        "sample_fraction must be positive, finite and draw at most {} samples per tree, \
         got {fraction}",
        u32::MAX
    )]
    InvalidSampleFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when the feature fraction is not in (0.0, 1.0].
    #[error("feature_fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidFeatureFraction {
        /// The invalid fraction.
        fraction: f64,
    },

    /// Returned when the per-split feature count is 0 or exceeds the column count.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved per-split feature count.
        max_features: usize,
        /// The number of feature columns.
        n_features: usize,
    },

    /// Returned when the per-tree bootstrap size rounds to zero.
    #[error("bootstrap size resolved to 0 for a window of {window_len} samples")]
    InvalidBootstrapSize {
        /// Number of samples in the retained window.
        window_len: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid depth bound.
        max_depth: usize,
    },

    /// Returned when the worker count is zero.
    #[error("n_workers must be at least 1, got {n_workers}")]
    InvalidWorkerCount {
        /// The invalid worker count.
        n_workers: usize,
    },

    /// Returned when the training thread pool cannot be created.
    #[error("failed to build the training thread pool")]
    ThreadPool {
        /// The underlying rayon error.
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when a single tree build fails during training.
    #[error("building tree in slot {slot} failed")]
    TreeBuildFailed {
        /// The slot the tree would have occupied in the ensemble.
        slot: usize,
        /// The failure inside the build.
        #[source]
        source: Box<ForestError>,
    },

    /// Returned when weighted prediction has no tree with a positive weight.
    #[error("weighted vote is undefined: none of the {n_trees} trees has a positive weight")]
    WeightedVoteUndefined {
        /// Number of trees in the ensemble.
        n_trees: usize,
    },

    /// Returned by a sample source that cannot deliver a batch.
    #[error("sample source unavailable")]
    SourceUnavailable {
        /// The collaborator's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Returned by a model sink that cannot store or fetch a model.
    #[error("model sink unavailable")]
    SinkUnavailable {
        /// The collaborator's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        #[source]
        source: bincode::Error,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        #[source]
        source: bincode::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },

    /// Returned when a loaded tree or forest violates a structural invariant.
    #[error("malformed model: tree {tree}: {reason}")]
    MalformedTree {
        /// Zero-based index of the tree in the ensemble.
        tree: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Returned when loaded forest state outside the trees is inconsistent.
    #[error("malformed model: {reason}")]
    MalformedModel {
        /// What is wrong with it.
        reason: String,
    },
}

impl ForestError {
    /// Return the broad category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForestError::EmptyDataset
            | ForestError::ZeroFeatures
            | ForestError::LabelCountMismatch { .. }
            | ForestError::FeatureCountMismatch { .. }
            | ForestError::ColumnKindMismatch { .. }
            | ForestError::NonFiniteValue { .. }
            | ForestError::PredictionFeatureMismatch { .. }
            | ForestError::PredictionKindMismatch { .. }
            | ForestError::EmptyEnsemble => ErrorKind::InvalidInput,

            ForestError::InvalidBufferSize { .. }
            | ForestError::InvalidTreeCount { .. }
            | ForestError::InvalidSampleFraction { .. }
            | ForestError::InvalidFeatureFraction { .. }
            | ForestError::InvalidMaxFeatures { .. }
            | ForestError::InvalidBootstrapSize { .. }
            | ForestError::InvalidMaxDepth { .. }
            | ForestError::InvalidWorkerCount { .. }
            | ForestError::ThreadPool { .. } => ErrorKind::InvalidConfiguration,

            ForestError::TreeBuildFailed { source, .. } => source.kind(),

            ForestError::WeightedVoteUndefined { .. } => ErrorKind::UndefinedPrediction,

            ForestError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,

            ForestError::SinkUnavailable { .. }
            | ForestError::SerializeModel { .. }
            | ForestError::WriteModel { .. }
            | ForestError::ReadModel { .. } => ErrorKind::SinkUnavailable,

            ForestError::DeserializeModel { .. }
            | ForestError::IncompatibleModelVersion { .. }
            | ForestError::MalformedTree { .. }
            | ForestError::MalformedModel { .. } => ErrorKind::CorruptModel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ForestError};

    #[test]
    fn build_failure_reports_inner_kind() {
        let err = ForestError::TreeBuildFailed {
            slot: 3,
            source: Box::new(ForestError::EmptyDataset),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.to_string(), "building tree in slot 3 failed");
    }

    #[test]
    fn display_carries_fields() {
        let err = ForestError::InvalidMaxFeatures {
            max_features: 5,
            n_features: 2,
        };
        assert_eq!(
            err.to_string(),
            "max_features resolved to 5, but must be in [1, 2]"
        );
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn collaborator_errors_keep_their_category() {
        let io = std::io::Error::other("disk gone");
        let err = ForestError::SinkUnavailable {
            source: Box::new(io),
        };
        assert_eq!(err.kind(), ErrorKind::SinkUnavailable);

        let io = std::io::Error::other("socket closed");
        let err = ForestError::SourceUnavailable {
            source: Box::new(io),
        };
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }
}
