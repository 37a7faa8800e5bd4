//! Incremental forest training with parallel tree construction.

use std::time::Instant;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::ForestConfig;
use crate::error::ForestError;
use crate::oob::{bootstrap_sample, oob_validation, vote_weight};
use crate::result::TrainReport;
use crate::source::SampleSource;
use crate::split::SampleBag;
use crate::task::{LabelStats, Task};
use crate::tree::{DecisionTree, grow_tree};
use crate::value::{ColumnKind, FeatureValue, check_input, resolve_column_kinds};
use crate::window::SampleWindow;

/// A random forest that grows as batches arrive.
///
/// Each train call appends samples to a bounded window, recomputes the
/// derived statistics and appends new trees built on the whole window.
/// Trees are never removed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound(
    serialize = "T: serde::Serialize, T::Label: serde::Serialize, T::Summary: serde::Serialize",
    deserialize = "T: serde::de::DeserializeOwned, T::Label: serde::de::DeserializeOwned, \
                   T::Summary: serde::de::DeserializeOwned"
))]
pub struct Forest<T: Task> {
    pub(crate) task: T,
    pub(crate) config: ForestConfig,
    pub(crate) window: SampleWindow<T::Label>,
    pub(crate) kinds: Vec<ColumnKind>,
    pub(crate) max_features: usize,
    pub(crate) bootstrap_size: usize,
    pub(crate) label_stats: Option<LabelStats>,
    pub(crate) trees: Vec<DecisionTree<T::Summary>>,
}

/// Shared state of one training call, guarded by a single mutex.
struct Progress<S> {
    built: Vec<(usize, DecisionTree<S>)>,
    skipped: usize,
    done: usize,
}

impl<T: Task> Forest<T> {
    /// Create an empty forest.
    ///
    /// # Errors
    ///
    /// Any error of [`ForestConfig::validate`].
    pub fn new(task: T, config: ForestConfig) -> Result<Self, ForestError> {
        config.validate()?;
        let window = SampleWindow::new(config.buffer_size);
        Ok(Self {
            task,
            config,
            window,
            kinds: Vec::new(),
            max_features: 0,
            bootstrap_size: 0,
            label_stats: None,
            trees: Vec::new(),
        })
    }

    /// Append a batch to the window and build `n_trees` new trees on it.
    ///
    /// The batch may be empty when the window already holds samples.
    /// On error nothing changes: the window, derived statistics and trees
    /// are committed only once every build has succeeded.
    ///
    /// # Errors
    ///
    /// | Variant                                   | When                                            |
    /// |-------------------------------------------|-------------------------------------------------|
    /// | [`ForestError::InvalidTreeCount`]         | `n_trees` is 0                                  |
    /// | [`ForestError::LabelCountMismatch`]       | `features.len() != labels.len()`                |
    /// | [`ForestError::EmptyDataset`]             | the window would be empty                       |
    /// | [`ForestError::ZeroFeatures`]             | samples have zero columns                       |
    /// | [`ForestError::FeatureCountMismatch`]     | rows have inconsistent lengths                  |
    /// | [`ForestError::ColumnKindMismatch`]       | a cell disagrees with its column's kind         |
    /// | [`ForestError::NonFiniteValue`]           | a numeric cell is NaN or infinite               |
    /// | [`ForestError::InvalidMaxFeatures`]       | `M` resolves outside `[1, n_features]`          |
    /// | [`ForestError::InvalidBootstrapSize`]     | `N` resolves to 0                               |
    /// | [`ForestError::ThreadPool`]               | the worker pool cannot be created               |
    /// | [`ForestError::TreeBuildFailed`]          | a build failed                                  |
    pub fn train(
        &mut self,
        features: &[Vec<FeatureValue>],
        labels: &[T::Label],
        n_trees: usize,
    ) -> Result<TrainReport, ForestError> {
        self.train_inner(features, labels, n_trees, None)
    }

    /// Like [`Forest::train`], but builds not yet started once `deadline`
    /// has passed are skipped. Builds already running finish.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::train`].
    pub fn train_with_deadline(
        &mut self,
        features: &[Vec<FeatureValue>],
        labels: &[T::Label],
        n_trees: usize,
        deadline: Instant,
    ) -> Result<TrainReport, ForestError> {
        self.train_inner(features, labels, n_trees, Some(deadline))
    }

    /// Train on a batch with the configured tree-count target.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::train`].
    pub fn fit(
        &mut self,
        features: &[Vec<FeatureValue>],
        labels: &[T::Label],
    ) -> Result<TrainReport, ForestError> {
        self.train_inner(features, labels, self.config.n_trees, None)
    }

    /// Pull up to `batch_size` samples from `source` and train on them.
    ///
    /// # Errors
    ///
    /// [`ForestError::SourceUnavailable`] from the source, otherwise the
    /// same as [`Forest::train`].
    pub fn train_from_source<S>(
        &mut self,
        source: &mut S,
        batch_size: usize,
        n_trees: usize,
    ) -> Result<TrainReport, ForestError>
    where
        S: SampleSource<T::Label> + ?Sized,
    {
        let batch = source.next_batch(batch_size)?;
        debug!(n_samples = batch.features.len(), "batch pulled from source");
        self.train_inner(&batch.features, &batch.labels, n_trees, None)
    }

    #[instrument(skip_all, fields(n_new = features.len(), n_trees = n_trees))]
    fn train_inner(
        &mut self,
        features: &[Vec<FeatureValue>],
        labels: &[T::Label],
        n_trees: usize,
        deadline: Option<Instant>,
    ) -> Result<TrainReport, ForestError> {
        // --- Validate inputs ---
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        self.config.validate()?;
        if features.len() != labels.len() {
            return Err(ForestError::LabelCountMismatch {
                samples: features.len(),
                labels: labels.len(),
            });
        }
        if !features.is_empty() {
            resolve_column_kinds(features, labels.len())?;
        }

        // --- Stage the window and derived statistics ---
        let mut window = self.window.clone();
        let evicted = window.extend(features, labels);
        let kinds = resolve_column_kinds(window.features(), window.len())?;
        let n_features = kinds.len();
        let max_features = self.config.resolve_max_features(n_features)?;
        let bootstrap_size = self.config.resolve_bootstrap_size(window.len())?;
        let label_stats = self.task.label_stats(window.labels());
        let n_workers = self.config.resolve_workers();

        info!(
            window_len = window.len(),
            evicted,
            n_features,
            max_features,
            bootstrap_size,
            n_workers,
            "training forest"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .build()
            .map_err(|source| ForestError::ThreadPool { source })?;

        let first_slot = self.trees.len();
        let progress = Mutex::new(Progress {
            built: Vec::with_capacity(n_trees),
            skipped: 0,
            done: 0,
        });
        let bag = SampleBag {
            features: window.features(),
            labels: window.labels(),
            kinds: &kinds,
        };
        let task = &self.task;
        let seed = self.config.seed;
        let max_depth = self.config.max_depth;

        pool.install(|| {
            (0..n_trees).into_par_iter().try_for_each(|i| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    progress.lock().skipped += 1;
                    return Ok(());
                }
                let slot = first_slot + i;
                let tree = build_tree(
                    task,
                    &bag,
                    slot,
                    seed,
                    max_features,
                    bootstrap_size,
                    max_depth,
                )
                .map_err(|e| ForestError::TreeBuildFailed {
                    slot,
                    source: Box::new(e),
                })?;

                let mut progress = progress.lock();
                progress.done += 1;
                debug!(
                    slot,
                    done = progress.done,
                    total = n_trees,
                    validation = ?tree.validation,
                    "tree built"
                );
                progress.built.push((slot, tree));
                Ok::<(), ForestError>(())
            })
        })?;

        let Progress { mut built, skipped, .. } = progress.into_inner();
        built.sort_unstable_by_key(|(slot, _)| *slot);

        let scores: Vec<f64> = built.iter().filter_map(|(_, t)| t.validation).collect();
        let mean_validation =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);
        let n_built = built.len();

        // --- Commit ---
        let window_len = window.len();
        self.window = window;
        self.kinds = kinds;
        self.max_features = max_features;
        self.bootstrap_size = bootstrap_size;
        self.label_stats = Some(label_stats);
        self.trees.extend(built.into_iter().map(|(_, tree)| tree));

        info!(
            n_built,
            skipped,
            total_trees = self.trees.len(),
            mean_validation = ?mean_validation,
            "forest training complete"
        );

        Ok(TrainReport {
            requested: n_trees,
            built: n_built,
            skipped,
            total_trees: self.trees.len(),
            window_len,
            evicted,
            max_features,
            bootstrap_size,
            mean_validation,
        })
    }

    // --- Accessors ---

    /// Return the task this forest learns.
    #[must_use]
    pub fn task(&self) -> &T {
        &self.task
    }

    /// Return the configuration.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Return the trees in build order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree<T::Summary>] {
        &self.trees
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of feature columns, 0 before the first train call.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.kinds.len()
    }

    /// Return the column kinds resolved from the retained window.
    #[must_use]
    pub fn column_kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    /// Return `M`, the columns drawn per split in the latest train call.
    #[must_use]
    pub fn max_features(&self) -> usize {
        self.max_features
    }

    /// Return `N`, the bootstrap draws per tree in the latest train call.
    #[must_use]
    pub fn bootstrap_size(&self) -> usize {
        self.bootstrap_size
    }

    /// Return the label statistics of the retained window, if trained.
    #[must_use]
    pub fn label_stats(&self) -> Option<LabelStats> {
        self.label_stats
    }

    /// Return the retained training window.
    #[must_use]
    pub fn window(&self) -> &SampleWindow<T::Label> {
        &self.window
    }

    /// Fail unless the ensemble can answer a query on `input`.
    pub(crate) fn check_query(&self, input: &[FeatureValue]) -> Result<(), ForestError> {
        if self.trees.is_empty() {
            return Err(ForestError::EmptyEnsemble);
        }
        check_input(input, &self.kinds)
    }

    /// Trees with a positive vote weight, paired with that weight.
    pub(crate) fn weighted_members(
        &self,
    ) -> Result<Vec<(&DecisionTree<T::Summary>, f64)>, ForestError> {
        let members: Vec<_> = match self.label_stats {
            Some(stats) => self
                .trees
                .iter()
                .filter_map(|tree| {
                    let w = vote_weight(tree.validation?, &stats)?;
                    Some((tree, w))
                })
                .collect(),
            None => Vec::new(),
        };
        if members.is_empty() {
            return Err(ForestError::WeightedVoteUndefined {
                n_trees: self.trees.len(),
            });
        }
        Ok(members)
    }
}

/// Build the tree for `slot`: bootstrap, grow, then score out of bag.
fn build_tree<T: Task>(
    task: &T,
    bag: &SampleBag<'_, T::Label>,
    slot: usize,
    seed: u64,
    max_features: usize,
    bootstrap_size: usize,
    max_depth: Option<usize>,
) -> Result<DecisionTree<T::Summary>, ForestError> {
    let window_len = bag.features.len();
    if bootstrap_size == 0 || window_len == 0 {
        return Err(ForestError::InvalidBootstrapSize { window_len });
    }
    if max_features == 0 || max_features > bag.kinds.len() {
        return Err(ForestError::InvalidMaxFeatures {
            max_features,
            n_features: bag.kinds.len(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(slot as u64);

    let (in_bag, oob_indices) = bootstrap_sample(window_len, bootstrap_size, &mut rng);
    let mut tree = grow_tree(task, bag, &in_bag, max_features, max_depth, &mut rng);
    tree.validation = oob_validation(task, &tree, bag.features, bag.labels, &oob_indices);
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::task::{Classification, Regression};
    use crate::value::numeric_row;

    /// Generate a simple 3-class separable dataset.
    fn make_separable_data() -> (Vec<Vec<FeatureValue>>, Vec<u8>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3u8 {
            for i in 0..20 {
                let x = f64::from(class) * 10.0 + f64::from(i) * 0.15;
                features.push(numeric_row(&[x, 0.5]));
                labels.push(class);
            }
        }
        (features, labels)
    }

    fn classifier(n_trees: usize) -> Forest<Classification<u8>> {
        let config = ForestConfig::new(1000, n_trees).unwrap().with_seed(42);
        Forest::new(Classification::default(), config).unwrap()
    }

    #[test]
    fn three_class_separable_accuracy() {
        let (features, labels) = make_separable_data();
        let mut forest = classifier(30);
        let report = forest.fit(&features, &labels).unwrap();
        assert_eq!(report.built, 30);
        assert_eq!(forest.n_trees(), 30);

        let predictions = forest.predict_batch(&features).unwrap();
        let correct = predictions
            .iter()
            .zip(&labels)
            .filter(|&(p, l)| p == l)
            .count();
        let accuracy = correct as f64 / labels.len() as f64;
        assert!(accuracy > 0.9, "accuracy = {accuracy}");
    }

    #[test]
    fn oob_scores_recorded() {
        let (features, labels) = make_separable_data();
        let mut forest = classifier(10);
        let report = forest.fit(&features, &labels).unwrap();
        let mean = report.mean_validation.expect("some sample is out of bag");
        assert!(mean > 0.8, "mean OOB score = {mean}");
        assert!(forest.trees().iter().all(|t| t.validation().is_some()));
    }

    #[test]
    fn derived_statistics() {
        let (features, labels) = make_separable_data();
        let config = ForestConfig::new(1000, 2)
            .unwrap()
            .with_feature_fraction(0.5)
            .with_sample_fraction(0.5);
        let mut forest = Forest::new(Classification::default(), config).unwrap();
        let report = forest.fit(&features, &labels).unwrap();
        assert_eq!(report.max_features, 1);
        assert_eq!(report.bootstrap_size, 30);
        assert_eq!(forest.label_stats(), Some(LabelStats::Classes { n_classes: 3 }));
        assert_eq!(forest.column_kinds(), &[ColumnKind::Numeric, ColumnKind::Numeric]);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, labels) = make_separable_data();
        let mut a = classifier(8);
        let mut b = classifier(8);
        a.fit(&features, &labels).unwrap();
        b.fit(&features, &labels).unwrap();
        for (ta, tb) in a.trees().iter().zip(b.trees()) {
            assert_eq!(ta.n_nodes(), tb.n_nodes());
            assert_eq!(ta.validation(), tb.validation());
        }
        assert_eq!(
            a.predict_proba_batch(&features).unwrap(),
            b.predict_proba_batch(&features).unwrap()
        );
    }

    #[test]
    fn worker_count_does_not_change_result() {
        let (features, labels) = make_separable_data();
        let mut one = Forest::new(
            Classification::default(),
            ForestConfig::new(1000, 6).unwrap().with_n_workers(Some(1)),
        )
        .unwrap();
        let mut four = Forest::new(
            Classification::default(),
            ForestConfig::new(1000, 6).unwrap().with_n_workers(Some(4)),
        )
        .unwrap();
        one.fit(&features, &labels).unwrap();
        four.fit(&features, &labels).unwrap();
        let v1: Vec<_> = one.trees().iter().map(DecisionTree::validation).collect();
        let v4: Vec<_> = four.trees().iter().map(DecisionTree::validation).collect();
        assert_eq!(v1, v4);
    }

    #[test]
    fn failed_train_leaves_forest_untouched() {
        let (features, labels) = make_separable_data();
        let mut forest = classifier(3);
        forest.fit(&features, &labels).unwrap();

        let bad = vec![vec![FeatureValue::from("x"), FeatureValue::Numeric(1.0)]];
        let err = forest.train(&bad, &[0], 3).unwrap_err();
        assert!(matches!(err, ForestError::ColumnKindMismatch { .. }));
        assert_eq!(forest.n_trees(), 3);
        assert_eq!(forest.window().len(), 60);
    }

    #[test]
    fn zero_tree_count_rejected() {
        let (features, labels) = make_separable_data();
        let err = classifier(3).train(&features, &labels, 0).unwrap_err();
        assert!(matches!(err, ForestError::InvalidTreeCount { n_trees: 0 }));
    }

    #[test]
    fn oversized_sample_fraction_is_a_config_error() {
        let config = ForestConfig::new(10, 1).unwrap().with_sample_fraction(1e30);
        let err = Forest::new(Regression, config).unwrap_err();
        assert!(matches!(err, ForestError::InvalidSampleFraction { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn empty_dataset_error() {
        let err = classifier(3).fit(&[], &[]).unwrap_err();
        assert!(matches!(err, ForestError::EmptyDataset));
    }

    #[test]
    fn empty_batch_retrains_on_window() {
        let (features, labels) = make_separable_data();
        let mut forest = classifier(2);
        forest.fit(&features, &labels).unwrap();
        let report = forest.train(&[], &[], 2).unwrap();
        assert_eq!(report.total_trees, 4);
        assert_eq!(report.window_len, 60);
    }

    #[test]
    fn past_deadline_builds_nothing() {
        let (features, labels) = make_separable_data();
        let mut forest = classifier(5);
        let past = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        let report = forest.train_with_deadline(&features, &labels, 5, past).unwrap();
        assert_eq!(report.built, 0);
        assert_eq!(report.skipped, 5);
        assert_eq!(forest.n_trees(), 0);
        assert_eq!(forest.window().len(), 60);
    }

    #[test]
    fn predict_before_training_is_empty_ensemble() {
        let forest = classifier(3);
        let err = forest.predict(&numeric_row(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, ForestError::EmptyEnsemble));
    }

    #[test]
    fn regression_tracks_label_range() {
        let features: Vec<_> = (0..40).map(|i| numeric_row(&[f64::from(i)])).collect();
        let labels: Vec<f64> = (0..40).map(|i| f64::from(i) * 0.5).collect();
        let config = ForestConfig::new(100, 5).unwrap();
        let mut forest = Forest::new(Regression, config).unwrap();
        forest.fit(&features, &labels).unwrap();
        assert_eq!(
            forest.label_stats(),
            Some(LabelStats::Range {
                min: 0.0,
                max: 19.5
            })
        );
        let y = forest.predict(&numeric_row(&[10.0])).unwrap();
        assert!((y - 5.0).abs() < 1.5, "y = {y}");
    }
}
