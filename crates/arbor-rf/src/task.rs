//! Learning tasks: what a label is, how its disorder is measured, and what a
//! leaf remembers about the labels that reached it.

use std::fmt;
use std::marker::PhantomData;

use crate::impurity::{ClassCounts, LabelCounts, Moments, SplitCriterion};
use crate::node::Impurity;
use crate::predict::ClassDistribution;

/// Bound for discrete class identifiers.
///
/// Implemented for every type that is cloneable, totally ordered, debuggable
/// and thread-safe, e.g. `u8`, `i64`, `String`, `&'static str`.
pub trait ClassLabel: Clone + Ord + fmt::Debug + Send + Sync + 'static {}

impl<T> ClassLabel for T where T: Clone + Ord + fmt::Debug + Send + Sync + 'static {}

/// Label statistics derived from the retained training window.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LabelStats {
    /// Classification: number of distinct classes.
    Classes {
        /// Distinct class count.
        n_classes: usize,
    },
    /// Regression: observed label range.
    Range {
        /// Smallest label.
        min: f64,
        /// Largest label.
        max: f64,
    },
}

impl LabelStats {
    /// Scale factor of the ensemble weight formula: `n_classes − 1` for
    /// classification, `max − min` for regression.
    #[must_use]
    pub fn weight_scale(&self) -> f64 {
        match *self {
            LabelStats::Classes { n_classes } => n_classes.saturating_sub(1) as f64,
            LabelStats::Range { min, max } => max - min,
        }
    }
}

/// A supervised learning task a forest can be trained for.
pub trait Task: Clone + fmt::Debug + Send + Sync + 'static {
    /// Training label type.
    type Label: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    /// What a leaf stores about the labels that reached it.
    type Summary: Clone + fmt::Debug + Send + Sync + 'static;
    /// Accumulator used while sweeping split candidates.
    type Counts: LabelCounts<Self::Label>;

    /// Impurity of an accumulated label multiset.
    fn impurity(&self, counts: &Self::Counts) -> Impurity;

    /// Leaf summary of an accumulated label multiset.
    fn summarize(&self, counts: &Self::Counts) -> Self::Summary;

    /// Per-sample out-of-bag score of a prediction against the true label.
    ///
    /// The tree's validation score is the mean over its OOB samples.
    fn oob_score(&self, prediction: &Self::Summary, truth: &Self::Label) -> f64;

    /// Statistics of the retained labels used by weighted voting.
    fn label_stats(&self, labels: &[Self::Label]) -> LabelStats;
}

/// Classification over labels of type `L`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct Classification<L> {
    criterion: SplitCriterion,
    #[serde(skip)]
    label: PhantomData<fn() -> L>,
}

impl<L> Classification<L> {
    /// Classification with the given impurity criterion.
    #[must_use]
    pub fn new(criterion: SplitCriterion) -> Self {
        Self {
            criterion,
            label: PhantomData,
        }
    }

    /// Return the impurity criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }
}

impl<L> Default for Classification<L> {
    fn default() -> Self {
        Self::new(SplitCriterion::Entropy)
    }
}

impl<L> Clone for Classification<L> {
    fn clone(&self) -> Self {
        Self::new(self.criterion)
    }
}

impl<L: ClassLabel> Task for Classification<L> {
    type Label = L;
    type Summary = ClassDistribution<L>;
    type Counts = ClassCounts<L>;

    fn impurity(&self, counts: &ClassCounts<L>) -> Impurity {
        self.criterion.impurity(counts.counts(), counts.total())
    }

    fn summarize(&self, counts: &ClassCounts<L>) -> ClassDistribution<L> {
        let total = counts.total() as f64;
        ClassDistribution::from_weights(
            counts
                .iter()
                .map(|(label, c)| (label.clone(), c as f64 / total)),
        )
    }

    fn oob_score(&self, prediction: &ClassDistribution<L>, truth: &L) -> f64 {
        prediction.probability(truth)
    }

    fn label_stats(&self, labels: &[L]) -> LabelStats {
        let mut distinct: Vec<&L> = labels.iter().collect();
        distinct.sort_unstable();
        distinct.dedup();
        LabelStats::Classes {
            n_classes: distinct.len(),
        }
    }
}

/// Regression over `f64` labels, split by mean squared error.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Regression;

impl Task for Regression {
    type Label = f64;
    type Summary = f64;
    type Counts = Moments;

    fn impurity(&self, counts: &Moments) -> Impurity {
        Impurity::new(counts.variance())
    }

    fn summarize(&self, counts: &Moments) -> f64 {
        counts.mean()
    }

    fn oob_score(&self, prediction: &f64, truth: &f64) -> f64 {
        (prediction - truth).abs()
    }

    fn label_stats(&self, labels: &[f64]) -> LabelStats {
        let (min, max) = labels
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if labels.is_empty() {
            LabelStats::Range { min: 0.0, max: 0.0 }
        } else {
            LabelStats::Range { min, max }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_summary_is_normalized() {
        let task = Classification::<u8>::default();
        let mut counts = ClassCounts::empty();
        for l in [0u8, 1, 1, 2] {
            counts.add(&l);
        }
        let dist = task.summarize(&counts);
        let total: f64 = dist.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((dist.probability(&1) - 0.5).abs() < 1e-12);
        assert_eq!(dist.probability(&9), 0.0);
    }

    #[test]
    fn classification_oob_is_mass_on_truth() {
        let task = Classification::<&str>::default();
        let dist = ClassDistribution::from_weights([("a", 0.25), ("b", 0.75)]);
        assert!((task.oob_score(&dist, &"b") - 0.75).abs() < 1e-12);
        assert_eq!(task.oob_score(&dist, &"z"), 0.0);
    }

    #[test]
    fn class_count_stats() {
        let task = Classification::<&str>::default();
        let stats = task.label_stats(&["x", "y", "x", "z"]);
        assert_eq!(stats, LabelStats::Classes { n_classes: 3 });
        assert!((stats.weight_scale() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn regression_summary_is_mean() {
        let mut counts = Moments::empty();
        for l in [1.0, 2.0, 6.0] {
            counts.add(&l);
        }
        assert!((Regression.summarize(&counts) - 3.0).abs() < 1e-12);
        assert!(Regression.impurity(&counts).value() > 0.0);
    }

    #[test]
    fn regression_oob_is_absolute_error() {
        assert!((Regression.oob_score(&1.5, &2.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn range_stats() {
        let stats = Regression.label_stats(&[-1.0, 3.0, 0.5]);
        assert_eq!(
            stats,
            LabelStats::Range {
                min: -1.0,
                max: 3.0
            }
        );
        assert!((stats.weight_scale() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn gini_criterion_carried() {
        let task = Classification::<u8>::new(SplitCriterion::Gini);
        let mut counts = ClassCounts::empty();
        counts.add(&0);
        counts.add(&1);
        assert!((task.impurity(&counts).value() - 0.5).abs() < 1e-12);
    }
}
