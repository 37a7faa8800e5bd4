//! Prediction methods for the forest ensemble.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::ForestError;
use crate::forest::Forest;
use crate::task::{ClassLabel, Classification, Regression};
use crate::value::FeatureValue;

/// Class probability distribution from a prediction.
///
/// Labels iterate in ascending order; absent labels have probability 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(bound(
    serialize = "L: serde::Serialize",
    deserialize = "L: Ord + serde::Deserialize<'de>"
))]
pub struct ClassDistribution<L> {
    probs: BTreeMap<L, f64>,
}

impl<L: Ord> ClassDistribution<L> {
    /// Build a distribution from `(label, weight)` pairs, summing repeats.
    ///
    /// Weights are stored as given; see [`ClassDistribution::normalized`].
    pub fn from_weights<I>(weights: I) -> Self
    where
        I: IntoIterator<Item = (L, f64)>,
    {
        let mut probs = BTreeMap::new();
        for (label, w) in weights {
            *probs.entry(label).or_insert(0.0) += w;
        }
        Self { probs }
    }

    /// Return the probability of `label`, 0 if absent.
    #[must_use]
    pub fn probability(&self, label: &L) -> f64 {
        self.probs.get(label).copied().unwrap_or(0.0)
    }

    /// Iterate over `(label, probability)` pairs in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = (&L, f64)> {
        self.probs.iter().map(|(l, &p)| (l, p))
    }

    /// Return the predicted class (argmax of probabilities).
    ///
    /// Ties go to the smallest label. `None` for an empty distribution.
    #[must_use]
    pub fn predicted_class(&self) -> Option<&L> {
        let mut best: Option<(&L, f64)> = None;
        for (label, p) in self.iter() {
            if best.is_none_or(|(_, bp)| p > bp) {
                best = Some((label, p));
            }
        }
        best.map(|(label, _)| label)
    }

    /// Return the top-k classes sorted by descending probability.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(&L, f64)> {
        let mut ranked: Vec<(&L, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);
        ranked
    }

    /// Return the number of labels with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probs.len()
    }

    /// Return `true` if no label has an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    fn total(&self) -> f64 {
        self.probs.values().sum()
    }
}

impl<L: Ord + Clone> ClassDistribution<L> {
    /// Return a copy scaled to sum to 1.0; unchanged when the sum is 0.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return self.clone();
        }
        Self::from_weights(self.iter().map(|(l, p)| (l.clone(), p / total)))
    }

    fn accumulate(&mut self, other: &Self, scale: f64) {
        for (label, p) in other.normalized().iter() {
            *self.probs.entry(label.clone()).or_insert(0.0) += scale * p;
        }
    }

    fn divide(mut self, denominator: f64) -> Self {
        self.probs.values_mut().for_each(|p| *p /= denominator);
        self
    }
}

impl<L: ClassLabel> Forest<Classification<L>> {
    /// Return the averaged class probability distribution for one input.
    ///
    /// Each tree's leaf distribution is re-normalized, summed per label and
    /// divided by the tree count.
    ///
    /// # Errors
    ///
    /// | Variant                                       | When                              |
    /// |-----------------------------------------------|-----------------------------------|
    /// | [`ForestError::EmptyEnsemble`]                | no tree has been trained          |
    /// | [`ForestError::PredictionFeatureMismatch`]    | `input.len() != n_features`       |
    /// | [`ForestError::PredictionKindMismatch`]       | a cell has the wrong column kind  |
    pub fn predict_proba(
        &self,
        input: &[FeatureValue],
    ) -> Result<ClassDistribution<L>, ForestError> {
        self.check_query(input)?;
        let mut sum = ClassDistribution::from_weights(std::iter::empty());
        for tree in &self.trees {
            sum.accumulate(tree.traverse(input), 1.0);
        }
        Ok(sum.divide(self.trees.len() as f64))
    }

    /// Predict the class label for one input by unweighted vote.
    ///
    /// Ties go to the smallest label.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::predict_proba`].
    pub fn predict(&self, input: &[FeatureValue]) -> Result<L, ForestError> {
        let dist = self.predict_proba(input)?;
        dist.predicted_class()
            .cloned()
            .ok_or(ForestError::EmptyEnsemble)
    }

    /// Return the confidence-weighted class distribution for one input.
    ///
    /// Only trees with a finite positive [vote weight](crate::vote_weight)
    /// contribute; the sum is divided by the total contributing weight.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::predict_proba`], plus
    /// [`ForestError::WeightedVoteUndefined`] when no tree contributes.
    pub fn predict_weighted_proba(
        &self,
        input: &[FeatureValue],
    ) -> Result<ClassDistribution<L>, ForestError> {
        self.check_query(input)?;
        let members = self.weighted_members()?;
        let mut sum = ClassDistribution::from_weights(std::iter::empty());
        let mut total_weight = 0.0;
        for (tree, w) in members {
            sum.accumulate(tree.traverse(input), w);
            total_weight += w;
        }
        Ok(sum.divide(total_weight))
    }

    /// Predict the class label for one input by weighted vote.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::predict_weighted_proba`].
    pub fn predict_weighted(&self, input: &[FeatureValue]) -> Result<L, ForestError> {
        let dist = self.predict_weighted_proba(input)?;
        dist.predicted_class()
            .cloned()
            .ok_or(ForestError::WeightedVoteUndefined {
                n_trees: self.trees.len(),
            })
    }

    /// Predict class labels for a batch of inputs in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error any input produces.
    pub fn predict_batch(&self, inputs: &[Vec<FeatureValue>]) -> Result<Vec<L>, ForestError> {
        inputs
            .into_par_iter()
            .map(|input| self.predict(input))
            .collect()
    }

    /// Return probability distributions for a batch of inputs in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error any input produces.
    pub fn predict_proba_batch(
        &self,
        inputs: &[Vec<FeatureValue>],
    ) -> Result<Vec<ClassDistribution<L>>, ForestError> {
        inputs
            .into_par_iter()
            .map(|input| self.predict_proba(input))
            .collect()
    }

    /// Predict class labels by weighted vote for a batch of inputs in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error any input produces.
    pub fn predict_weighted_batch(
        &self,
        inputs: &[Vec<FeatureValue>],
    ) -> Result<Vec<L>, ForestError> {
        inputs
            .into_par_iter()
            .map(|input| self.predict_weighted(input))
            .collect()
    }
}

impl Forest<Regression> {
    /// Predict the mean of the per-tree predictions for one input.
    ///
    /// # Errors
    ///
    /// | Variant                                       | When                              |
    /// |-----------------------------------------------|-----------------------------------|
    /// | [`ForestError::EmptyEnsemble`]                | no tree has been trained          |
    /// | [`ForestError::PredictionFeatureMismatch`]    | `input.len() != n_features`       |
    /// | [`ForestError::PredictionKindMismatch`]       | a cell has the wrong column kind  |
    pub fn predict(&self, input: &[FeatureValue]) -> Result<f64, ForestError> {
        self.check_query(input)?;
        let sum: f64 = self.trees.iter().map(|t| *t.traverse(input)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    /// Predict the confidence-weighted mean for one input.
    ///
    /// # Errors
    ///
    /// Same as `predict`, plus
    /// [`ForestError::WeightedVoteUndefined`] when no tree contributes.
    pub fn predict_weighted(&self, input: &[FeatureValue]) -> Result<f64, ForestError> {
        self.check_query(input)?;
        let members = self.weighted_members()?;
        let (sum, total_weight) = members
            .iter()
            .fold((0.0, 0.0), |(sum, total), (tree, w)| {
                (sum + w * tree.traverse(input), total + w)
            });
        Ok(sum / total_weight)
    }

    /// Predict a batch of inputs in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error any input produces.
    pub fn predict_batch(&self, inputs: &[Vec<FeatureValue>]) -> Result<Vec<f64>, ForestError> {
        inputs
            .into_par_iter()
            .map(|input| self.predict(input))
            .collect()
    }

    /// Predict a batch of inputs by weighted mean in parallel.
    ///
    /// # Errors
    ///
    /// Returns the first error any input produces.
    pub fn predict_weighted_batch(
        &self,
        inputs: &[Vec<FeatureValue>],
    ) -> Result<Vec<f64>, ForestError> {
        inputs
            .into_par_iter()
            .map(|input| self.predict_weighted(input))
            .collect()
    }
}
