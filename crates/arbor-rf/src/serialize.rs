//! Model serialization and deserialization via bincode.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::forest::Forest;
use crate::node::Node;
use crate::source::ModelSink;
use crate::task::Task;
use crate::value::check_rows;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope written to disk.
///
/// `format_version` is the first field so it can be decoded on its own.
#[derive(serde::Serialize)]
#[serde(bound(serialize = "Forest<T>: Serialize"))]
struct EnvelopeRef<'a, T: Task> {
    format_version: u32,
    n_trees: usize,
    n_features: usize,
    forest: &'a Forest<T>,
}

#[derive(serde::Deserialize)]
#[serde(bound(deserialize = "Forest<T>: DeserializeOwned"))]
struct Envelope<T: Task> {
    format_version: u32,
    n_trees: usize,
    n_features: usize,
    forest: Forest<T>,
}

/// A [`ModelSink`] backed by a single file.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Create a sink writing to and reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the model file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> ModelSink<T> for FileSink
where
    T: Task + Serialize + DeserializeOwned,
    T::Label: Serialize + DeserializeOwned,
    T::Summary: Serialize + DeserializeOwned,
{
    fn save(&mut self, forest: &Forest<T>) -> Result<(), ForestError> {
        forest.save(&self.path)
    }

    fn load(&self) -> Result<Forest<T>, ForestError> {
        Forest::load(&self.path)
    }
}

impl<T> Forest<T>
where
    T: Task + Serialize + DeserializeOwned,
    T::Label: Serialize + DeserializeOwned,
    T::Summary: Serialize + DeserializeOwned,
{
    /// Save the model to a binary file.
    ///
    /// Uses bincode encoding wrapped in a versioned envelope. The window,
    /// validation scores and label statistics are kept, so both weighted
    /// prediction and incremental training resume after [`Forest::load`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();

        let envelope = EnvelopeRef {
            format_version: FORMAT_VERSION,
            n_trees: self.trees.len(),
            n_features: self.n_features(),
            forest: self,
        };

        let bytes = bincode::serialize(&envelope)
            .map_err(|e| ForestError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| ForestError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.trees.len(),
            window_len = self.window.len(),
            "model saved"
        );

        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// Checks the format version before decoding the rest, then re-checks
    /// the structural invariants of the decoded forest.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadModel`] | file read failed |
    /// | [`ForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`ForestError::MalformedTree`] | a tree disagrees with the forest |
    /// | [`ForestError::MalformedModel`] | config, window or header is inconsistent |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForestError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| ForestError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let format_version: u32 =
            bincode::deserialize(&bytes).map_err(|e| ForestError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;
        if format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: format_version,
                path: path.to_path_buf(),
            });
        }

        let envelope: Envelope<T> =
            bincode::deserialize(&bytes).map_err(|e| ForestError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;
        let forest = envelope.forest;

        if envelope.n_trees != forest.trees.len() || envelope.n_features != forest.n_features() {
            return Err(ForestError::MalformedModel {
                reason: "envelope header disagrees with its forest".to_owned(),
            });
        }
        forest.check_loaded()?;

        debug!(
            format_version = envelope.format_version,
            n_trees = envelope.n_trees,
            n_features = envelope.n_features,
            "model loaded"
        );

        Ok(forest)
    }
}

impl<T: Task> Forest<T> {
    /// Re-check invariants that bincode decoding alone does not enforce.
    fn check_loaded(&self) -> Result<(), ForestError> {
        let malformed = |reason: String| ForestError::MalformedModel { reason };

        self.config
            .validate()
            .map_err(|e| malformed(format!("invalid configuration: {e}")))?;
        if self.window.capacity() != self.config.buffer_size
            || self.window.len() > self.window.capacity()
            || self.window.features().len() != self.window.labels().len()
        {
            return Err(malformed("window does not match its capacity".to_owned()));
        }
        if !self.window.is_empty() {
            check_rows(self.window.features(), &self.kinds, 0)
                .map_err(|e| malformed(format!("retained window: {e}")))?;
        }
        if !self.trees.is_empty() && (self.kinds.is_empty() || self.label_stats.is_none()) {
            return Err(malformed("trees without training statistics".to_owned()));
        }

        for (tree_index, tree) in self.trees.iter().enumerate() {
            let tree_err = |reason: String| ForestError::MalformedTree {
                tree: tree_index,
                reason,
            };
            if tree.n_features() != self.kinds.len() {
                return Err(tree_err(format!(
                    "trained on {} features, forest has {}",
                    tree.n_features(),
                    self.kinds.len()
                )));
            }
            for (node_index, node) in tree.nodes().iter().enumerate() {
                if let Node::Split { feature, value, .. } = node
                    && value.kind() != self.kinds[feature.index()]
                {
                    return Err(tree_err(format!(
                        "node {node_index} compares a {} value on a {} column",
                        value.kind(),
                        self.kinds[feature.index()]
                    )));
                }
            }
        }
        Ok(())
    }
}
