//! Configuration builder for forest training.

use crate::error::ForestError;

/// Configuration for an incrementally trained forest.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods. Setters
/// do not validate; [`ForestConfig::validate`] runs when a forest is created
/// and again on every train call.
///
/// # Defaults
///
/// | Parameter          | Default                         |
/// |--------------------|---------------------------------|
/// | `sample_fraction`  | 1.0                             |
/// | `feature_fraction` | 1.0                             |
/// | `max_depth`        | `None`                          |
/// | `seed`             | 42                              |
/// | `n_workers`        | `None` (available parallelism)  |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForestConfig {
    pub(crate) buffer_size: usize,
    pub(crate) n_trees: usize,
    pub(crate) sample_fraction: f64,
    pub(crate) feature_fraction: f64,
    pub(crate) max_depth: Option<usize>,
    pub(crate) seed: u64,
    pub(crate) n_workers: Option<usize>,
}

impl ForestConfig {
    /// Create a new config retaining at most `buffer_size` samples and
    /// targeting `n_trees` trees per [`fit`](crate::Forest::fit).
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                 |
    /// |-----------------------------------------|----------------------|
    /// | [`ForestError::InvalidBufferSize`]      | `buffer_size` is 0   |
    /// | [`ForestError::InvalidTreeCount`]       | `n_trees` is 0       |
    pub fn new(buffer_size: usize, n_trees: usize) -> Result<Self, ForestError> {
        if buffer_size == 0 {
            return Err(ForestError::InvalidBufferSize { buffer_size });
        }
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            buffer_size,
            n_trees,
            sample_fraction: 1.0,
            feature_fraction: 1.0,
            max_depth: None,
            seed: 42,
            n_workers: None,
        })
    }

    // --- Setters ---

    /// Set the bootstrap size as a multiple of the window length.
    ///
    /// `N = round(window_len × sample_fraction)`. Values above 1.0 draw more
    /// samples than the window holds.
    #[must_use]
    pub fn with_sample_fraction(mut self, sample_fraction: f64) -> Self {
        self.sample_fraction = sample_fraction;
        self
    }

    /// Set the share of columns considered at each split.
    ///
    /// `M = round(n_features × feature_fraction)`, which must land in
    /// `[1, n_features]`.
    #[must_use]
    pub fn with_feature_fraction(mut self, feature_fraction: f64) -> Self {
        self.feature_fraction = feature_fraction;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of concurrent tree builds. `None` uses the available
    /// parallelism.
    #[must_use]
    pub fn with_n_workers(mut self, n_workers: Option<usize>) -> Self {
        self.n_workers = n_workers;
        self
    }

    // --- Getters ---

    /// Return the sliding window capacity.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Return the tree-count target used by [`fit`](crate::Forest::fit).
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the bootstrap sample fraction.
    #[must_use]
    pub fn sample_fraction(&self) -> f64 {
        self.sample_fraction
    }

    /// Return the per-split feature fraction.
    #[must_use]
    pub fn feature_fraction(&self) -> f64 {
        self.feature_fraction
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the configured worker count, if set.
    #[must_use]
    pub fn n_workers(&self) -> Option<usize> {
        self.n_workers
    }

    /// Check every parameter that does not depend on the data.
    ///
    /// # Errors
    ///
    /// | Variant                                   | When                                      |
    /// |-------------------------------------------|-------------------------------------------|
    /// | [`ForestError::InvalidBufferSize`]        | `buffer_size` is 0                        |
    /// | [`ForestError::InvalidTreeCount`]         | `n_trees` is 0                            |
    /// | [`ForestError::InvalidSampleFraction`]    | `sample_fraction` is not positive finite, |
    /// |                                           | or a full window exceeds `u32::MAX` draws |
    /// | [`ForestError::InvalidFeatureFraction`]   | `feature_fraction` is not in (0.0, 1.0]   |
    /// | [`ForestError::InvalidMaxDepth`]          | `max_depth` is `Some(0)`                  |
    /// | [`ForestError::InvalidWorkerCount`]       | `n_workers` is `Some(0)`                  |
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.buffer_size == 0 {
            return Err(ForestError::InvalidBufferSize {
                buffer_size: self.buffer_size,
            });
        }
        if self.n_trees == 0 {
            return Err(ForestError::InvalidTreeCount {
                n_trees: self.n_trees,
            });
        }
        if !(self.sample_fraction.is_finite() && self.sample_fraction > 0.0)
            || bootstrap_draws(self.buffer_size, self.sample_fraction) > MAX_BOOTSTRAP_SIZE as f64
        {
            return Err(ForestError::InvalidSampleFraction {
                fraction: self.sample_fraction,
            });
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(ForestError::InvalidFeatureFraction {
                fraction: self.feature_fraction,
            });
        }
        if let Some(max_depth) = self.max_depth
            && max_depth == 0
        {
            return Err(ForestError::InvalidMaxDepth { max_depth });
        }
        if let Some(n_workers) = self.n_workers
            && n_workers == 0
        {
            return Err(ForestError::InvalidWorkerCount { n_workers });
        }
        Ok(())
    }

    /// Resolve `M`, the number of columns drawn at each split.
    pub(crate) fn resolve_max_features(&self, n_features: usize) -> Result<usize, ForestError> {
        let resolved = (n_features as f64 * self.feature_fraction).round() as usize;
        if resolved == 0 || resolved > n_features {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: resolved,
                n_features,
            });
        }
        Ok(resolved)
    }

    /// Resolve `N`, the number of bootstrap draws per tree.
    pub(crate) fn resolve_bootstrap_size(&self, window_len: usize) -> Result<usize, ForestError> {
        let draws = bootstrap_draws(window_len, self.sample_fraction);
        if draws > MAX_BOOTSTRAP_SIZE as f64 {
            return Err(ForestError::InvalidSampleFraction {
                fraction: self.sample_fraction,
            });
        }
        let resolved = draws as usize;
        if resolved == 0 {
            return Err(ForestError::InvalidBootstrapSize { window_len });
        }
        Ok(resolved)
    }

    /// Return the worker count to size the training pool with.
    pub(crate) fn resolve_workers(&self) -> usize {
        self.n_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}

/// Upper bound on bootstrap draws per tree.
const MAX_BOOTSTRAP_SIZE: usize = u32::MAX as usize;

/// `round(window_len × sample_fraction)`, kept as `f64` so an oversized
/// fraction cannot saturate the conversion.
fn bootstrap_draws(window_len: usize, sample_fraction: f64) -> f64 {
    (window_len as f64 * sample_fraction).round()
}
