//! Impurity measures and the label accumulators split search sweeps with.

use std::collections::BTreeMap;

use crate::node::Impurity;

/// Criterion for measuring the disorder of a set of class labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Information entropy: `Σ p_i · ln(1/p_i)`
    #[default]
    Entropy,
    /// Gini impurity: `Σ_{i≠j} p_i · p_j = 1 - Σ p_i²`
    Gini,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its class counts.
    ///
    /// Returns [`Impurity::new(0.0)`] when `n_samples` is zero.
    #[must_use]
    pub fn impurity<I>(&self, class_counts: I, n_samples: usize) -> Impurity
    where
        I: IntoIterator<Item = usize>,
    {
        match self {
            SplitCriterion::Entropy => Impurity::new(entropy(class_counts, n_samples)),
            SplitCriterion::Gini => Impurity::new(gini(class_counts, n_samples)),
        }
    }
}

/// Entropy of a label multiset given per-label counts summing to `n_samples`.
///
/// Zero counts contribute nothing; a single-outcome set has entropy 0.
#[must_use]
pub fn entropy<I>(class_counts: I, n_samples: usize) -> f64
where
    I: IntoIterator<Item = usize>,
{
    if n_samples == 0 {
        return 0.0;
    }
    let n = n_samples as f64;
    class_counts
        .into_iter()
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / n;
            p * (1.0 / p).ln()
        })
        .sum()
}

/// Gini impurity of a label multiset given per-label counts summing to `n_samples`.
#[must_use]
pub fn gini<I>(class_counts: I, n_samples: usize) -> f64
where
    I: IntoIterator<Item = usize>,
{
    if n_samples == 0 {
        return 0.0;
    }
    let n = n_samples as f64;
    let sum_sq: f64 = class_counts
        .into_iter()
        .map(|c| {
            let p = c as f64 / n;
            p * p
        })
        .sum();
    (1.0 - sum_sq).max(0.0)
}

/// Mean squared deviation of `labels` from their mean.
///
/// Zero for empty and single-element slices.
#[must_use]
pub fn mse(labels: &[f64]) -> f64 {
    if labels.len() < 2 {
        return 0.0;
    }
    let n = labels.len() as f64;
    let mean = labels.iter().sum::<f64>() / n;
    labels.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / n
}

/// Running summary of a label multiset that supports set difference.
///
/// Split search grows one side of a partition sample by sample and derives
/// the other side as `total.difference(&side)`.
pub trait LabelCounts<L>: Clone + Send {
    /// Create an accumulator with no labels.
    fn empty() -> Self;

    /// Add one label.
    fn add(&mut self, label: &L);

    /// Return the multiset `self − other`, where `other ⊆ self`.
    #[must_use]
    fn difference(&self, other: &Self) -> Self;

    /// Return the number of labels accumulated.
    fn total(&self) -> usize;
}

/// Per-class label counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCounts<L> {
    counts: BTreeMap<L, usize>,
    total: usize,
}

impl<L: Ord> ClassCounts<L> {
    /// Iterate over `(label, count)` pairs in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (&L, usize)> {
        self.counts.iter().map(|(l, &c)| (l, c))
    }

    /// Return the per-class counts in ascending label order.
    pub fn counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.counts.values().copied()
    }
}

impl<L: Ord + Clone + Send> LabelCounts<L> for ClassCounts<L> {
    fn empty() -> Self {
        Self {
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    fn add(&mut self, label: &L) {
        *self.counts.entry(label.clone()).or_insert(0) += 1;
        self.total += 1;
    }

    fn difference(&self, other: &Self) -> Self {
        let mut counts = BTreeMap::new();
        for (label, &count) in &self.counts {
            let rest = count.saturating_sub(other.counts.get(label).copied().unwrap_or(0));
            if rest > 0 {
                counts.insert(label.clone(), rest);
            }
        }
        Self {
            counts,
            total: self.total.saturating_sub(other.total),
        }
    }

    fn total(&self) -> usize {
        self.total
    }
}

/// Count, mean and centered second moment of a set of real labels.
///
/// Stored in Welford form, so labels sharing a large offset keep their
/// spread instead of cancelling against it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    n: usize,
    mean: f64,
    m2: f64,
}

impl Moments {
    /// Return the arithmetic mean, or 0 for an empty set.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Return the population variance (the MSE around the mean), clamped at 0.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.m2 / self.n as f64).max(0.0)
    }
}

impl LabelCounts<f64> for Moments {
    fn empty() -> Self {
        Self::default()
    }

    fn add(&mut self, label: &f64) {
        self.n += 1;
        let delta = label - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (label - self.mean);
    }

    /// Inverse of the pairwise merge: with `self = other ∪ rest`,
    /// `m2(self) = m2(other) + m2(rest) + δ²·|other|·|rest| / |self|`
    /// where `δ` is the gap between the two means.
    fn difference(&self, other: &Self) -> Self {
        let n = self.n.saturating_sub(other.n);
        if n == 0 {
            return Self::default();
        }
        if other.n == 0 {
            return *self;
        }
        let (n_all, n_other, n_rest) = (self.n as f64, other.n as f64, n as f64);
        let mean = self.mean + (self.mean - other.mean) * n_other / n_rest;
        let delta = other.mean - mean;
        let m2 = self.m2 - other.m2 - delta * delta * n_other * n_rest / n_all;
        Self {
            n,
            mean,
            m2: m2.max(0.0),
        }
    }

    fn total(&self) -> usize {
        self.n
    }
}
