use std::collections::BTreeMap;

use crate::impurity::LabelCounts;
use crate::node::{FeatureIndex, Impurity};
use crate::task::Task;
use crate::value::{ColumnKind, FeatureValue};

/// Borrowed view of a sample bag with resolved column kinds.
///
/// Nodes address samples through index lists into `features`/`labels`, so
/// bootstrap duplicates are just repeated indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleBag<'a, L> {
    pub(crate) features: &'a [Vec<FeatureValue>],
    pub(crate) labels: &'a [L],
    pub(crate) kinds: &'a [ColumnKind],
}

/// Best split value found for one column.
#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    /// Column the candidate splits on.
    pub(crate) feature: FeatureIndex,
    /// Split value; samples matching it go left.
    pub(crate) value: FeatureValue,
    /// Impurity gain of the split.
    pub(crate) gain: f64,
    /// Number of samples going left.
    pub(crate) n_left: usize,
    /// Number of samples going right.
    pub(crate) n_right: usize,
}

/// `parent − (|right|/n)·impurity(right) − (|left|/n)·impurity(left)`.
fn gain_of<T: Task>(task: &T, parent: Impurity, left: &T::Counts, right: &T::Counts) -> f64 {
    let n = (left.total() + right.total()) as f64;
    let p_left = left.total() as f64 / n;
    let p_right = right.total() as f64 / n;
    parent.value() - p_right * task.impurity(right).value() - p_left * task.impurity(left).value()
}

/// Find the best split value of `column` among its distinct observed values.
///
/// Numeric candidates are visited in ascending order and send `<= v` left;
/// categorical candidates are visited in lexicographic order and send `== v`
/// left. The candidate with the greatest-or-equal gain wins, so ties go to
/// the later candidate. Candidates leaving a side empty are skipped.
///
/// Returns `None` when every candidate leaves a side empty (constant column).
pub(crate) fn best_split_for_column<T: Task>(
    task: &T,
    bag: &SampleBag<'_, T::Label>,
    sample_indices: &[usize],
    column: usize,
    parent_counts: &T::Counts,
    parent_impurity: Impurity,
) -> Option<SplitCandidate> {
    match bag.kinds[column] {
        ColumnKind::Numeric => {
            numeric_sweep(task, bag, sample_indices, column, parent_counts, parent_impurity)
        }
        ColumnKind::Categorical => {
            categorical_scan(task, bag, sample_indices, column, parent_counts, parent_impurity)
        }
    }
}

fn numeric_sweep<T: Task>(
    task: &T,
    bag: &SampleBag<'_, T::Label>,
    sample_indices: &[usize],
    column: usize,
    parent_counts: &T::Counts,
    parent_impurity: Impurity,
) -> Option<SplitCandidate> {
    let mut sorted: Vec<(f64, usize)> = sample_indices
        .iter()
        .filter_map(|&si| bag.features[si][column].as_f64().map(|v| (v, si)))
        .collect();
    sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let n = sorted.len();
    let mut left = T::Counts::empty();
    let mut best_gain = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for i in 0..n {
        let (value, si) = sorted[i];
        left.add(&bag.labels[si]);

        // Only the last sample of a run of equal values closes a candidate.
        // IEEE equality keeps -0.0 and 0.0 in one run, matching `<=`.
        if i + 1 < n && sorted[i + 1].0 == value {
            continue;
        }
        let n_left = i + 1;
        let n_right = n - n_left;
        if n_right == 0 {
            continue;
        }

        let right = parent_counts.difference(&left);
        let gain = gain_of(task, parent_impurity, &left, &right);
        if gain >= best_gain {
            best_gain = gain;
            best = Some(SplitCandidate {
                feature: FeatureIndex::new(column),
                value: FeatureValue::Numeric(value),
                gain,
                n_left,
                n_right,
            });
        }
    }
    best
}

fn categorical_scan<T: Task>(
    task: &T,
    bag: &SampleBag<'_, T::Label>,
    sample_indices: &[usize],
    column: usize,
    parent_counts: &T::Counts,
    parent_impurity: Impurity,
) -> Option<SplitCandidate> {
    let mut groups: BTreeMap<&str, T::Counts> = BTreeMap::new();
    for &si in sample_indices {
        if let Some(category) = bag.features[si][column].as_str() {
            groups
                .entry(category)
                .or_insert_with(T::Counts::empty)
                .add(&bag.labels[si]);
        }
    }

    let n = parent_counts.total();
    let mut best_gain = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for (category, left) in &groups {
        let n_left = left.total();
        if n_left == n {
            continue;
        }
        let right = parent_counts.difference(left);
        let gain = gain_of(task, parent_impurity, left, &right);
        if gain >= best_gain {
            best_gain = gain;
            best = Some(SplitCandidate {
                feature: FeatureIndex::new(column),
                value: FeatureValue::Categorical((*category).to_owned()),
                gain,
                n_left,
                n_right: n - n_left,
            });
        }
    }
    best
}

/// Partition `sample_indices` by the split rule of `value` on `column`.
pub(crate) fn partition(
    features: &[Vec<FeatureValue>],
    sample_indices: &[usize],
    column: usize,
    value: &FeatureValue,
) -> (Vec<usize>, Vec<usize>) {
    sample_indices
        .iter()
        .partition(|&&si| features[si][column].goes_left(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impurity::{ClassCounts, Moments};
    use crate::task::{Classification, Regression};
    use crate::value::{categorical_row, numeric_row};

    fn class_parent(labels: &[u8], indices: &[usize]) -> (ClassCounts<u8>, Impurity) {
        let task = Classification::<u8>::default();
        let mut counts = ClassCounts::empty();
        for &i in indices {
            counts.add(&labels[i]);
        }
        let imp = task.impurity(&counts);
        (counts, imp)
    }

    #[test]
    fn numeric_finds_separating_threshold() {
        let features: Vec<_> = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0]
            .iter()
            .map(|&v| numeric_row(&[v]))
            .collect();
        let labels = vec![0u8, 0, 0, 1, 1, 1];
        let kinds = vec![ColumnKind::Numeric];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices: Vec<usize> = (0..6).collect();
        let (counts, imp) = class_parent(&labels, &indices);

        let task = Classification::<u8>::default();
        let split = best_split_for_column(&task, &bag, &indices, 0, &counts, imp)
            .expect("should find a split");
        assert_eq!(split.value, FeatureValue::Numeric(3.0));
        assert_eq!((split.n_left, split.n_right), (3, 3));
        assert!((split.gain - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn categorical_uses_equality() {
        let features: Vec<_> = ["red", "blue", "red", "green"]
            .iter()
            .map(|c| categorical_row(&[c]))
            .collect();
        let labels = vec![1u8, 0, 1, 0];
        let kinds = vec![ColumnKind::Categorical];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices: Vec<usize> = (0..4).collect();
        let (counts, imp) = class_parent(&labels, &indices);

        let task = Classification::<u8>::default();
        let split = best_split_for_column(&task, &bag, &indices, 0, &counts, imp).unwrap();
        assert_eq!(split.value, FeatureValue::from("red"));
        assert_eq!((split.n_left, split.n_right), (2, 2));

        let (left, right) = partition(&features, &indices, 0, &split.value);
        assert_eq!(left, vec![0, 2]);
        assert_eq!(right, vec![1, 3]);
    }

    #[test]
    fn ties_favor_later_candidate() {
        // Splitting at 1.0 or at 2.0 isolates one pure sample either way.
        let features: Vec<_> = [1.0, 2.0, 3.0].iter().map(|&v| numeric_row(&[v])).collect();
        let labels = vec![0u8, 1, 0];
        let kinds = vec![ColumnKind::Numeric];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices: Vec<usize> = (0..3).collect();
        let (counts, imp) = class_parent(&labels, &indices);

        let task = Classification::<u8>::default();
        let split = best_split_for_column(&task, &bag, &indices, 0, &counts, imp).unwrap();
        assert_eq!(split.value, FeatureValue::Numeric(2.0));
    }

    #[test]
    fn constant_column_has_no_candidate() {
        let features: Vec<_> = (0..4).map(|_| numeric_row(&[5.0])).collect();
        let labels = vec![0u8, 0, 1, 1];
        let kinds = vec![ColumnKind::Numeric];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices: Vec<usize> = (0..4).collect();
        let (counts, imp) = class_parent(&labels, &indices);

        let task = Classification::<u8>::default();
        assert!(best_split_for_column(&task, &bag, &indices, 0, &counts, imp).is_none());
    }

    #[test]
    fn duplicate_indices_count_twice() {
        let features: Vec<_> = [0.0, 1.0].iter().map(|&v| numeric_row(&[v])).collect();
        let labels = vec![0u8, 1];
        let kinds = vec![ColumnKind::Numeric];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices = vec![0, 0, 0, 1];
        let (counts, imp) = class_parent(&labels, &indices);

        let task = Classification::<u8>::default();
        let split = best_split_for_column(&task, &bag, &indices, 0, &counts, imp).unwrap();
        assert_eq!((split.n_left, split.n_right), (3, 1));
        let (left, right) = partition(&features, &indices, 0, &split.value);
        assert_eq!(left.len() + right.len(), indices.len());
    }

    #[test]
    fn regression_split_reduces_mse() {
        let features: Vec<_> = [0.0, 1.0, 2.0, 3.0].iter().map(|&v| numeric_row(&[v])).collect();
        let labels = vec![0.0, 0.0, 10.0, 10.0];
        let kinds = vec![ColumnKind::Numeric];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices: Vec<usize> = (0..4).collect();
        let mut counts = Moments::empty();
        for l in &labels {
            counts.add(l);
        }
        let imp = Regression.impurity(&counts);

        let split = best_split_for_column(&Regression, &bag, &indices, 0, &counts, imp).unwrap();
        assert_eq!(split.value, FeatureValue::Numeric(1.0));
        assert!((split.gain - 25.0).abs() < 1e-9);
    }

    #[test]
    fn regression_split_survives_label_offset() {
        let features: Vec<_> = (0..8).map(|i| numeric_row(&[f64::from(i)])).collect();
        let labels: Vec<f64> = (0..8).map(|i| 1e9 + f64::from(u8::from(i >= 4))).collect();
        let kinds = vec![ColumnKind::Numeric];
        let bag = SampleBag {
            features: &features,
            labels: &labels,
            kinds: &kinds,
        };
        let indices: Vec<usize> = (0..8).collect();
        let mut counts = Moments::empty();
        for l in &labels {
            counts.add(l);
        }
        let imp = Regression.impurity(&counts);
        assert!((imp.value() - 0.25).abs() < 1e-6, "parent impurity {imp}");

        let split = best_split_for_column(&Regression, &bag, &indices, 0, &counts, imp).unwrap();
        assert_eq!(split.value, FeatureValue::Numeric(3.0));
        assert!((split.gain - 0.25).abs() < 1e-6, "gain = {}", split.gain);
    }
}
