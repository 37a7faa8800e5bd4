//! Collaborator seams: where samples come from and where models go.

use crate::error::ForestError;
use crate::forest::Forest;
use crate::task::Task;
use crate::value::FeatureValue;

/// A batch of samples and their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch<L> {
    /// Feature vectors, one per sample.
    pub features: Vec<Vec<FeatureValue>>,
    /// Labels, paired 1:1 with `features`.
    pub labels: Vec<L>,
}

impl<L> SampleBatch<L> {
    /// Return the number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Return `true` if the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Supplies training batches.
///
/// Implementations report transport failures as
/// [`ForestError::SourceUnavailable`].
pub trait SampleSource<L> {
    /// Return up to `count` samples. An exhausted source returns an empty batch.
    ///
    /// # Errors
    ///
    /// [`ForestError::SourceUnavailable`] when the batch cannot be delivered.
    fn next_batch(&mut self, count: usize) -> Result<SampleBatch<L>, ForestError>;
}

/// Stores and fetches whole forests.
///
/// Implementations report transport failures as
/// [`ForestError::SinkUnavailable`] and undecodable state as a
/// `CorruptModel`-kind error.
pub trait ModelSink<T: Task> {
    /// Persist `forest`, replacing any previously stored model.
    ///
    /// # Errors
    ///
    /// A `SinkUnavailable`-kind error when the model cannot be stored.
    fn save(&mut self, forest: &Forest<T>) -> Result<(), ForestError>;

    /// Fetch the stored forest.
    ///
    /// # Errors
    ///
    /// A `SinkUnavailable`-kind error when nothing can be read, a
    /// `CorruptModel`-kind error when the stored bytes are not a valid model.
    fn load(&self) -> Result<Forest<T>, ForestError>;
}

/// In-memory source handing out an owned dataset front to back.
#[derive(Debug, Clone)]
pub struct VecSource<L> {
    features: Vec<Vec<FeatureValue>>,
    labels: Vec<L>,
    cursor: usize,
}

impl<L: Clone> VecSource<L> {
    /// Create a source over `features` and `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::LabelCountMismatch`] when the lengths differ.
    pub fn new(features: Vec<Vec<FeatureValue>>, labels: Vec<L>) -> Result<Self, ForestError> {
        if features.len() != labels.len() {
            return Err(ForestError::LabelCountMismatch {
                samples: features.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            features,
            labels,
            cursor: 0,
        })
    }

    /// Return the number of samples not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.features.len() - self.cursor
    }
}

impl<L: Clone> SampleSource<L> for VecSource<L> {
    fn next_batch(&mut self, count: usize) -> Result<SampleBatch<L>, ForestError> {
        let end = self.cursor.saturating_add(count).min(self.features.len());
        let batch = SampleBatch {
            features: self.features[self.cursor..end].to_vec(),
            labels: self.labels[self.cursor..end].to_vec(),
        };
        self.cursor = end;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;
    use crate::error::ErrorKind;
    use crate::task::Regression;
    use crate::value::numeric_row;

    struct OfflineSource;

    impl SampleSource<f64> for OfflineSource {
        fn next_batch(&mut self, _count: usize) -> Result<SampleBatch<f64>, ForestError> {
            Err(ForestError::SourceUnavailable {
                source: Box::new(std::io::Error::other("connection refused")),
            })
        }
    }

    fn ramp(n: u32) -> VecSource<f64> {
        let features = (0..n).map(|i| numeric_row(&[f64::from(i)])).collect();
        let labels = (0..n).map(f64::from).collect();
        VecSource::new(features, labels).unwrap()
    }

    #[test]
    fn batches_advance_and_exhaust() {
        let mut source = ramp(5);
        assert_eq!(source.next_batch(3).unwrap().len(), 3);
        let tail = source.next_batch(3).unwrap();
        assert_eq!(tail.labels, vec![3.0, 4.0]);
        assert!(source.next_batch(3).unwrap().is_empty());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let err = VecSource::new(vec![numeric_row(&[1.0])], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ForestError::LabelCountMismatch { .. }));
    }

    #[test]
    fn train_from_source_consumes_one_batch() {
        let mut source = ramp(30);
        let mut forest = Forest::new(Regression, ForestConfig::new(100, 2).unwrap()).unwrap();
        let report = forest.train_from_source(&mut source, 20, 2).unwrap();
        assert_eq!(report.window_len, 20);
        assert_eq!(source.remaining(), 10);
    }

    #[test]
    fn source_failure_propagates_unchanged() {
        let mut forest = Forest::new(Regression, ForestConfig::new(100, 2).unwrap()).unwrap();
        let err = forest
            .train_from_source(&mut OfflineSource, 10, 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
        assert_eq!(forest.n_trees(), 0);
    }
}
