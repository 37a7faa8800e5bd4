//! Training result types.

/// Summary of one train call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrainReport {
    /// Number of trees requested.
    pub requested: usize,
    /// Number of trees built and appended.
    pub built: usize,
    /// Number of builds skipped because the deadline had passed.
    pub skipped: usize,
    /// Number of trees in the ensemble after the call.
    pub total_trees: usize,
    /// Number of retained samples after the call.
    pub window_len: usize,
    /// Number of samples evicted from the window by this call.
    pub evicted: usize,
    /// Columns drawn per split (`M`).
    pub max_features: usize,
    /// Bootstrap draws per tree (`N`).
    pub bootstrap_size: usize,
    /// Mean OOB score of the new trees that had out-of-bag samples.
    pub mean_validation: Option<f64>,
}

impl TrainReport {
    /// Return `true` if every requested tree was built.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.built == self.requested
    }
}
