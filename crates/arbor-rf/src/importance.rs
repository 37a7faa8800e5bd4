//! Feature importance aggregation across trees.

use crate::error::ForestError;
use crate::forest::Forest;
use crate::task::Task;
use crate::tree::normalize;

/// A ranked feature with name, importance score, and rank.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RankedFeature {
    /// Feature name.
    pub name: String,
    /// Zero-based column index.
    pub column: usize,
    /// Normalized importance score (sums to 1.0 across all features).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

impl<T: Task> Forest<T> {
    /// Compute per-column importances over the whole ensemble.
    ///
    /// Every split node of every tree adds `n_samples × (impurity + gain)`
    /// to its column; the totals are normalized to sum to 1.0, or left at
    /// zero when no tree has a split.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::EmptyEnsemble`] when no tree has been trained.
    pub fn feature_importances(&self) -> Result<Vec<f64>, ForestError> {
        if self.trees.is_empty() {
            return Err(ForestError::EmptyEnsemble);
        }
        let mut totals = vec![0.0f64; self.n_features()];
        for tree in &self.trees {
            tree.accumulate_importance(&mut totals);
        }
        normalize(&mut totals);
        Ok(totals)
    }

    /// Return importances sorted descending with 1-based ranks.
    ///
    /// Columns without an entry in `names` are named by their index.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::EmptyEnsemble`] when no tree has been trained.
    pub fn ranked_importances<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<RankedFeature>, ForestError> {
        let totals = self.feature_importances()?;
        Ok(rank_importances(&totals, names))
    }
}

/// Sort importances descending and assign 1-based ranks.
///
/// Equal importances keep column order.
pub(crate) fn rank_importances<S: AsRef<str>>(totals: &[f64], names: &[S]) -> Vec<RankedFeature> {
    let mut features: Vec<RankedFeature> = totals
        .iter()
        .enumerate()
        .map(|(column, &importance)| RankedFeature {
            name: names
                .get(column)
                .map_or_else(|| column.to_string(), |n| n.as_ref().to_owned()),
            column,
            importance,
            rank: 0, // will be set after sorting
        })
        .collect();

    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    for (i, feat) in features.iter_mut().enumerate() {
        feat.rank = i + 1;
    }

    features
}
