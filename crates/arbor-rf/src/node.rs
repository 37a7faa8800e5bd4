use std::fmt;

use crate::value::FeatureValue;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena, identifying a specific node in a decision tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Criterion-agnostic impurity value (entropy, Gini or MSE).
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    /// Create a new impurity value.
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A node in a decision tree arena.
///
/// `S` is the leaf summary: a class distribution for classification trees,
/// the mean label for regression trees. Children are referenced by
/// [`NodeIndex`] and always sit after their parent in the arena.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node<S> {
    /// An interior split node.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Split value; its tag decides between `==` and `<=`.
        value: FeatureValue,
        /// Index of the left child node (samples matching the split).
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Impurity at this node before splitting.
        impurity: Impurity,
        /// Number of training samples that reached this node.
        n_samples: usize,
        /// Impurity gain realized by this split.
        gain: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Label summary of the training samples that reached this leaf.
        summary: S,
        /// Impurity of the leaf's own labels.
        impurity: Impurity,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl<S> Node<S> {
    /// Return the impurity at this node (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Return the leaf summary, or `None` for split nodes.
    #[must_use]
    pub fn summary(&self) -> Option<&S> {
        match self {
            Node::Leaf { summary, .. } => Some(summary),
            Node::Split { .. } => None,
        }
    }

    /// Importance contribution of this node: `n_samples × (impurity + gain)`
    /// for split nodes, zero for leaves.
    #[must_use]
    pub fn importance_weight(&self) -> f64 {
        match self {
            Node::Split {
                impurity,
                n_samples,
                gain,
                ..
            } => *n_samples as f64 * (impurity.value() + gain),
            Node::Leaf { .. } => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Impurity, Node, NodeIndex};
    use crate::value::FeatureValue;

    #[test]
    fn feature_index_roundtrip() {
        let fi = FeatureIndex::new(7);
        assert_eq!(fi.index(), 7);
        assert_eq!(format!("{fi}"), "7");
    }

    #[test]
    fn node_index_ordering() {
        let a = NodeIndex::new(10);
        let b = NodeIndex::new(20);
        assert!(a < b);
        assert_eq!(format!("{a}"), "10");
    }

    #[test]
    fn impurity_display() {
        let imp = Impurity::new(0.333333);
        assert_eq!(format!("{imp}"), "0.333333");
        assert_eq!(format!("{}", Impurity::new(0.0)), "0.000000");
    }

    fn make_leaf() -> Node<f64> {
        Node::Leaf {
            summary: 1.5,
            impurity: Impurity::new(0.32),
            n_samples: 10,
        }
    }

    fn make_split() -> Node<f64> {
        Node::Split {
            feature: FeatureIndex::new(2),
            value: FeatureValue::Numeric(3.5),
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            impurity: Impurity::new(0.48),
            n_samples: 20,
            gain: 0.16,
        }
    }

    #[test]
    fn leaf_accessors() {
        let leaf = make_leaf();
        assert!(leaf.is_leaf());
        assert_eq!(leaf.n_samples(), 10);
        assert_eq!(leaf.summary(), Some(&1.5));
        assert!((leaf.impurity().value() - 0.32).abs() < f64::EPSILON);
    }

    #[test]
    fn split_accessors() {
        let split = make_split();
        assert!(!split.is_leaf());
        assert_eq!(split.n_samples(), 20);
        assert!(split.summary().is_none());
        assert!((split.impurity().value() - 0.48).abs() < f64::EPSILON);
    }

    #[test]
    fn importance_weight_uses_impurity_plus_gain() {
        assert!((make_split().importance_weight() - 20.0 * 0.64).abs() < 1e-12);
        assert_eq!(make_leaf().importance_weight(), 0.0);
    }
}
