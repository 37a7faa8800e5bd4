use std::collections::VecDeque;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    ForestError,
    impurity::LabelCounts,
    node::{FeatureIndex, Node, NodeIndex},
    split::{SampleBag, SplitCandidate, best_split_for_column, partition},
    task::Task,
    value::{FeatureValue, resolve_column_kinds},
};

/// Configuration for a single decision tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter      | Default               |
/// |----------------|-----------------------|
/// | `max_features` | `None` (all features) |
/// | `max_depth`    | `None` (unlimited)    |
/// | `seed`         | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) max_features: Option<usize>,
    pub(crate) max_depth: Option<usize>,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_features: None,
            max_depth: None,
            seed: 42,
        }
    }

    /// Set the number of columns drawn as split candidates at each node.
    ///
    /// `None` means consider all columns.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth.
    ///
    /// `None` grows until leaves are pure or no split gains. `Some(d)` limits
    /// depth to `d` levels (root is depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the random seed for column subsampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the per-node column count, if set.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
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

    /// Train a decision tree on a whole sample bag.
    ///
    /// # Errors
    ///
    /// | Variant                                | When                                         |
    /// |----------------------------------------|----------------------------------------------|
    /// | [`ForestError::EmptyDataset`]          | `features` is empty                          |
    /// | [`ForestError::LabelCountMismatch`]    | `features.len() != labels.len()`             |
    /// | [`ForestError::ZeroFeatures`]          | rows have zero columns                       |
    /// | [`ForestError::FeatureCountMismatch`]  | rows have inconsistent lengths               |
    /// | [`ForestError::ColumnKindMismatch`]    | a cell's kind disagrees with the first row's |
    /// | [`ForestError::NonFiniteValue`]        | a numeric cell is NaN or infinite            |
    /// | [`ForestError::InvalidMaxFeatures`]    | `max_features` outside `[1, n_features]`     |
    /// | [`ForestError::InvalidMaxDepth`]       | `max_depth` is `Some(0)`                     |
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn fit<T: Task>(
        &self,
        task: &T,
        features: &[Vec<FeatureValue>],
        labels: &[T::Label],
    ) -> Result<DecisionTree<T::Summary>, ForestError> {
        let kinds = resolve_column_kinds(features, labels.len())?;
        let n_features = kinds.len();

        if self.max_depth == Some(0) {
            return Err(ForestError::InvalidMaxDepth { max_depth: 0 });
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(ForestError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        let bag = SampleBag {
            features,
            labels,
            kinds: &kinds,
        };
        let sample_indices: Vec<usize> = (0..features.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        Ok(grow_tree(
            task,
            &bag,
            &sample_indices,
            max_features,
            self.max_depth,
            &mut rng,
        ))
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Grow a tree over `sample_indices` of a validated bag.
///
/// Indices may repeat (bootstrap draws).
pub(crate) fn grow_tree<T: Task>(
    task: &T,
    bag: &SampleBag<'_, T::Label>,
    sample_indices: &[usize],
    max_features: usize,
    max_depth: Option<usize>,
    rng: &mut ChaCha8Rng,
) -> DecisionTree<T::Summary> {
    let mut grower = Grower {
        task,
        bag,
        max_features,
        rng,
        arena: Vec::new(),
    };
    let root = grower.grow(sample_indices, max_depth);
    let nodes = grower.arena;

    debug!(
        root_index = root.index(),
        n_nodes = nodes.len(),
        "decision tree built"
    );

    DecisionTree {
        nodes,
        n_features: bag.kinds.len(),
        validation: None,
    }
}

struct Grower<'a, 'b, T: Task> {
    task: &'a T,
    bag: &'a SampleBag<'b, T::Label>,
    max_features: usize,
    rng: &'a mut ChaCha8Rng,
    arena: Vec<Node<T::Summary>>,
}

impl<T: Task> Grower<'_, '_, T> {
    /// Recursively build the subtree for `sample_indices`, returning its root.
    ///
    /// `depth_budget` is the number of further levels allowed below this node.
    fn grow(&mut self, sample_indices: &[usize], depth_budget: Option<usize>) -> NodeIndex {
        let labels = self.bag.labels;
        let n_samples = sample_indices.len();

        let mut counts = T::Counts::empty();
        for &si in sample_indices {
            counts.add(&labels[si]);
        }
        let impurity = self.task.impurity(&counts);
        let summary = self.task.summarize(&counts);

        let pure = sample_indices
            .windows(2)
            .all(|w| labels[w[0]] == labels[w[1]]);
        let depth_exhausted = depth_budget == Some(0);

        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            summary,
            impurity,
            n_samples,
        });
        if pure || depth_exhausted {
            return NodeIndex::new(idx);
        }

        let Some(best) = self.best_split(sample_indices, &counts) else {
            return NodeIndex::new(idx);
        };
        if best.gain <= 0.0 {
            return NodeIndex::new(idx);
        }

        let column = best.feature.index();
        let (left_indices, right_indices) =
            partition(self.bag.features, sample_indices, column, &best.value);
        if left_indices.is_empty() || right_indices.is_empty() {
            return NodeIndex::new(idx);
        }
        debug_assert_eq!(left_indices.len(), best.n_left);
        debug_assert_eq!(right_indices.len(), best.n_right);

        // The leaf pushed above is the placeholder; children land after it.
        let child_budget = depth_budget.map(|d| d - 1);
        let left = self.grow(&left_indices, child_budget);
        let right = self.grow(&right_indices, child_budget);

        self.arena[idx] = Node::Split {
            feature: best.feature,
            value: best.value,
            left,
            right,
            impurity,
            n_samples,
            gain: best.gain,
        };
        NodeIndex::new(idx)
    }

    /// Draw `max_features` distinct columns and return the best candidate
    /// across them; later columns win ties.
    fn best_split(
        &mut self,
        sample_indices: &[usize],
        counts: &T::Counts,
    ) -> Option<SplitCandidate> {
        let n_features = self.bag.kinds.len();
        let impurity = self.task.impurity(counts);

        // Partial Fisher-Yates: shuffle only the first `max_features` positions.
        let mut order: Vec<usize> = (0..n_features).collect();
        let take = self.max_features.min(n_features);
        for i in 0..take {
            let j = self.rng.gen_range(i..n_features);
            order.swap(i, j);
        }

        let mut best: Option<SplitCandidate> = None;
        for &column in &order[..take] {
            let Some(candidate) =
                best_split_for_column(self.task, self.bag, sample_indices, column, counts, impurity)
            else {
                continue;
            };
            if best.as_ref().is_none_or(|b| candidate.gain >= b.gain) {
                best = Some(candidate);
            }
        }
        best
    }
}

/// A trained binary decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references. `S` is the
/// leaf summary type. Deserialization re-checks the arena invariants, so a
/// tree obtained either way always traverses to a leaf.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "TreeRepr<S>", bound(deserialize = "S: serde::Deserialize<'de>"))]
pub struct DecisionTree<S> {
    pub(crate) nodes: Vec<Node<S>>,
    pub(crate) n_features: usize,
    pub(crate) validation: Option<f64>,
}

#[derive(serde::Deserialize)]
struct TreeRepr<S> {
    nodes: Vec<Node<S>>,
    n_features: usize,
    validation: Option<f64>,
}

impl<S> TryFrom<TreeRepr<S>> for DecisionTree<S> {
    type Error = String;

    fn try_from(repr: TreeRepr<S>) -> Result<Self, Self::Error> {
        if repr.nodes.is_empty() {
            return Err("tree has no nodes".to_owned());
        }
        let n_nodes = repr.nodes.len();
        for (i, node) in repr.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                for child in [left, right] {
                    if child.index() <= i || child.index() >= n_nodes {
                        return Err(format!("node {i} has out-of-order child {child}"));
                    }
                }
                if left == right {
                    return Err(format!("node {i} has identical children"));
                }
                if feature.index() >= repr.n_features {
                    return Err(format!(
                        "node {i} splits on feature {feature} of {}",
                        repr.n_features
                    ));
                }
            }
        }
        Ok(Self {
            nodes: repr.nodes,
            n_features: repr.n_features,
            validation: repr.validation,
        })
    }
}

impl<S> DecisionTree<S> {
    /// Return the leaf summary reached by `input`.
    ///
    /// Traverses from the root (index 0): at each split, goes left when the
    /// input cell matches the split value (`==` categorical, `<=` numeric).
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when
    /// `input.len() != n_features`.
    pub fn predict(&self, input: &[FeatureValue]) -> Result<&S, ForestError> {
        if input.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: input.len(),
            });
        }
        Ok(self.traverse(input))
    }

    /// Traverse from the root and return the summary of the leaf reached.
    pub(crate) fn traverse(&self, input: &[FeatureValue]) -> &S {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { summary, .. } => return summary,
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                    ..
                } => {
                    idx = if input[feature.index()].goes_left(value) {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Return the out-of-bag validation score, if any sample was out of bag.
    ///
    /// Classification: mean probability assigned to the true label (higher
    /// is better). Regression: mean absolute error (lower is better).
    #[must_use]
    pub fn validation(&self) -> Option<f64> {
        self.validation
    }

    /// Return the node arena; index 0 is the root.
    #[must_use]
    pub fn nodes(&self) -> &[Node<S>] {
        &self.nodes
    }

    /// Return the number of feature columns the tree was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Add every split node's `n_samples × (impurity + gain)` to `totals`
    /// at its column.
    pub(crate) fn accumulate_importance(&self, totals: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, .. } = node
                && let Some(slot) = totals.get_mut(feature.index())
            {
                *slot += node.importance_weight();
            }
        }
    }

    /// Compute this tree's feature importances, normalized to sum to 1.0.
    ///
    /// All zeros when the tree is a single leaf.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        self.accumulate_importance(&mut totals);
        normalize(&mut totals);
        totals
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree.
    ///
    /// A single-node tree (just a root leaf) has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }

    /// Return the split columns used anywhere in the tree.
    pub fn split_features(&self) -> impl Iterator<Item = FeatureIndex> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            Node::Split { feature, .. } => Some(*feature),
            Node::Leaf { .. } => None,
        })
    }
}

/// Scale `values` to sum to 1.0; leave them untouched when the sum is 0.
pub(crate) fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}
