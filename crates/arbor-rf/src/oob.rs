//! Bootstrap resampling, out-of-bag scoring and the vote weights derived
//! from it.

use rand::Rng;

use crate::task::{LabelStats, Task};
use crate::tree::DecisionTree;
use crate::value::FeatureValue;

/// Offset that keeps the weight formula finite for a perfect OOB score.
const WEIGHT_EPSILON: f64 = 1.0001;

/// Draw `draw_count` indices from `0..n_samples` with replacement.
///
/// Returns the in-bag draws and the sorted indices that were never drawn.
pub(crate) fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Mean per-sample OOB score of `tree` over `oob_indices`.
///
/// `None` when there is no OOB sample.
pub(crate) fn oob_validation<T: Task>(
    task: &T,
    tree: &DecisionTree<T::Summary>,
    features: &[Vec<FeatureValue>],
    labels: &[T::Label],
    oob_indices: &[usize],
) -> Option<f64> {
    if oob_indices.is_empty() {
        return None;
    }
    let total: f64 = oob_indices
        .iter()
        .map(|&i| task.oob_score(tree.traverse(&features[i]), &labels[i]))
        .sum();
    Some(total / oob_indices.len() as f64)
}

/// Confidence weight of a tree in weighted voting.
///
/// `e = 1.0001 − validation`, `w = 0.5 · ln(scale · (1 − e) / e)` where
/// `scale` is `n_classes − 1` or the label range. Returns `None` unless the
/// weight is finite and strictly positive.
#[must_use]
pub fn vote_weight(validation: f64, stats: &LabelStats) -> Option<f64> {
    let e = WEIGHT_EPSILON - validation;
    let w = 0.5 * (stats.weight_scale() * (1.0 - e) / e).ln();
    (w.is_finite() && w > 0.0).then_some(w)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::task::{Classification, Regression};
    use crate::tree::DecisionTreeConfig;
    use crate::value::numeric_row;

    #[test]
    fn bootstrap_partitions_the_window() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (in_bag, oob) = bootstrap_sample(50, 30, &mut rng);
        assert_eq!(in_bag.len(), 30);
        for i in 0..50 {
            assert_ne!(in_bag.contains(&i), oob.contains(&i), "index {i}");
        }
        assert!(oob.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn oversampling_draws_more_than_window() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (in_bag, oob) = bootstrap_sample(4, 100, &mut rng);
        assert_eq!(in_bag.len(), 100);
        assert!(oob.is_empty());
    }

    #[test]
    fn classification_validation_is_mass_on_truth() {
        let features: Vec<_> = [1.0, 2.0, 10.0, 11.0].iter().map(|&x| numeric_row(&[x])).collect();
        let labels = vec![0u8, 0, 1, 1];
        let task = Classification::default();
        let tree = DecisionTreeConfig::new().fit(&task, &features, &labels).unwrap();

        let oob_features = vec![numeric_row(&[1.5]), numeric_row(&[10.5])];
        assert_eq!(oob_validation(&task, &tree, &oob_features, &[0, 0], &[0, 1]), Some(0.5));
        assert_eq!(oob_validation(&task, &tree, &oob_features, &[0, 1], &[0, 1]), Some(1.0));
        assert_eq!(oob_validation(&task, &tree, &oob_features, &[0, 1], &[]), None);
    }

    #[test]
    fn regression_validation_is_mean_absolute_error() {
        let features: Vec<_> = [0.0, 1.0].iter().map(|&x| numeric_row(&[x])).collect();
        let labels = vec![2.0, 4.0];
        let tree = DecisionTreeConfig::new().fit(&Regression, &features, &labels).unwrap();

        let score = oob_validation(&Regression, &tree, &features, &[3.0, 3.0], &[0, 1]).unwrap();
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn accurate_classifier_gets_positive_weight() {
        let stats = LabelStats::Classes { n_classes: 2 };
        let w = vote_weight(0.9, &stats).unwrap();
        assert!((w - 0.5 * (0.8999 / 0.1001_f64).ln()).abs() < 1e-12);
        assert!(vote_weight(1.0, &stats).is_some());
    }

    #[test]
    fn coin_flip_or_single_class_gets_no_weight() {
        assert!(vote_weight(0.5, &LabelStats::Classes { n_classes: 2 }).is_none());
        assert!(vote_weight(0.9, &LabelStats::Classes { n_classes: 1 }).is_none());
    }

    #[test]
    fn regression_weight_follows_formula() {
        // e = 1.0001 - 0.9 = 0.1001; scale 10 gives ln(10 * 0.8999 / 0.1001) / 2.
        let stats = LabelStats::Range {
            min: 0.0,
            max: 10.0,
        };
        let w = vote_weight(0.9, &stats).unwrap();
        assert!((w - 0.5 * (10.0 * 0.8999 / 0.1001_f64).ln()).abs() < 1e-9);
        // An error above 1.0001 makes `e` negative.
        assert!(vote_weight(2.0, &stats).is_none());
    }
}
