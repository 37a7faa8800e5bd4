//! Incrementally trained random forests over mixed categorical and numeric
//! columns.
//!
//! Provides CART-style binary trees split by entropy, Gini or mean squared
//! error, a forest that keeps a bounded window of recent samples and grows
//! new trees on it in parallel via rayon, out-of-bag validation, weighted
//! voting, feature importance, and model persistence.
//!
//! ```no_run
//! use arbor_rf::{Classification, Forest, ForestConfig, categorical_row};
//!
//! # fn main() -> Result<(), arbor_rf::ForestError> {
//! let features = vec![categorical_row(&["0", "1"]), categorical_row(&["1", "1"])];
//! let labels = vec![1u8, 0];
//! let config = ForestConfig::new(1_000, 10)?.with_sample_fraction(25.0);
//! let mut forest = Forest::new(Classification::default(), config)?;
//! forest.fit(&features, &labels)?;
//! let label = forest.predict(&categorical_row(&["0", "1"]))?;
//! # let _ = label;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod forest;
mod importance;
mod impurity;
mod node;
mod oob;
mod predict;
mod result;
mod serialize;
mod source;
mod split;
mod task;
mod tree;
mod value;
mod window;

pub use config::ForestConfig;
pub use error::{ErrorKind, ForestError};
pub use forest::Forest;
pub use importance::RankedFeature;
pub use impurity::{ClassCounts, LabelCounts, Moments, SplitCriterion, entropy, gini, mse};
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::vote_weight;
pub use predict::ClassDistribution;
pub use result::TrainReport;
pub use serialize::FileSink;
pub use source::{ModelSink, SampleBatch, SampleSource, VecSource};
pub use task::{ClassLabel, Classification, LabelStats, Regression, Task};
pub use tree::{DecisionTree, DecisionTreeConfig};
pub use value::{ColumnKind, FeatureValue, categorical_row, numeric_row};
pub use window::SampleWindow;
