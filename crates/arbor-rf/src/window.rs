//! Bounded FIFO buffer of retained training samples.

use crate::value::FeatureValue;

/// The most recent `capacity` samples and their labels.
///
/// Features and labels are evicted in lockstep, oldest first.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SampleWindow<L> {
    capacity: usize,
    features: Vec<Vec<FeatureValue>>,
    labels: Vec<L>,
}

impl<L: Clone> SampleWindow<L> {
    /// Create an empty window holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            features: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Append a batch, then evict the oldest samples beyond capacity.
    ///
    /// Returns the number of evicted samples. Callers validate that
    /// `features.len() == labels.len()`.
    pub fn extend(&mut self, features: &[Vec<FeatureValue>], labels: &[L]) -> usize {
        debug_assert_eq!(features.len(), labels.len());
        self.features.extend(features.iter().cloned());
        self.labels.extend(labels.iter().cloned());
        let excess = self.features.len().saturating_sub(self.capacity);
        self.features.drain(..excess);
        self.labels.drain(..excess);
        excess
    }

    /// Return the number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Return `true` if no samples are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Return the maximum number of retained samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the retained feature vectors, oldest first.
    #[must_use]
    pub fn features(&self) -> &[Vec<FeatureValue>] {
        &self.features
    }

    /// Return the retained labels, oldest first.
    #[must_use]
    pub fn labels(&self) -> &[L] {
        &self.labels
    }

    /// Iterate over retained samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&[FeatureValue], &L)> {
        self.features
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter())
    }
}
