use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use arbor_rf::{
    Classification, FeatureValue, Forest, ForestConfig, RankedFeature, Regression, TrainReport,
    categorical_row, numeric_row,
};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Incrementally trained random forests on synthetic benchmark tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of worker threads (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Forest parameters shared by every subcommand.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Trees grown per training round
    #[arg(long, default_value_t = 20)]
    trees: usize,

    /// Number of training rounds over the same data
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Maximum number of retained samples
    #[arg(long, default_value_t = 1000)]
    buffer_size: usize,

    /// Bootstrap draws per tree as a fraction of the window (may exceed 1)
    #[arg(long, default_value_t = 1.0)]
    sample_fraction: f64,

    /// Fraction of columns drawn at each split, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    feature_fraction: f64,

    /// Maximum tree depth (unbounded if omitted)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Save the trained model to this path
    #[arg(long)]
    model: Option<PathBuf>,

    /// Continue training the model stored at --model instead of starting fresh
    #[arg(long, default_value_t = false, requires = "model")]
    resume: bool,
}

impl ForestArgs {
    fn config(&self, seed: u64, threads: Option<usize>) -> Result<ForestConfig> {
        let config = ForestConfig::new(self.buffer_size, self.trees)?
            .with_sample_fraction(self.sample_fraction)
            .with_feature_fraction(self.feature_fraction)
            .with_max_depth(self.max_depth)
            .with_seed(seed)
            .with_n_workers(threads);
        config.validate().context("invalid forest configuration")?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Learn the XOR truth table from categorical "0"/"1" columns
    Xor {
        #[command(flatten)]
        forest: ForestArgs,
    },

    /// Fit sin(x) on [0, 5) and report the error on a dense grid
    Sin {
        /// Number of training points
        #[arg(long, default_value_t = 100)]
        points: u32,

        /// Number of evaluation grid points
        #[arg(long, default_value_t = 2000)]
        grid: u32,

        #[command(flatten)]
        forest: ForestArgs,
    },
}

// ---------------------------------------------------------------------------
// stdout summaries
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct XorRow {
    input: [String; 2],
    expected: String,
    predicted: String,
    probability: f64,
    weighted: Option<String>,
}

#[derive(Serialize)]
struct XorOutput {
    rounds: Vec<TrainReport>,
    n_trees: usize,
    correct: usize,
    rows: Vec<XorRow>,
    importances: Vec<RankedFeature>,
    model: Option<PathBuf>,
}

#[derive(Serialize)]
struct SinOutput {
    rounds: Vec<TrainReport>,
    n_trees: usize,
    n_points: u32,
    n_grid: u32,
    mean_absolute_error: f64,
    weighted_mean_absolute_error: Option<f64>,
    model: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Synthetic datasets
// ---------------------------------------------------------------------------

const XOR_TABLE: [(&str, &str, &str); 4] =
    [("0", "0", "0"), ("0", "1", "1"), ("1", "0", "1"), ("1", "1", "0")];

fn xor_dataset() -> (Vec<Vec<FeatureValue>>, Vec<String>) {
    XOR_TABLE
        .iter()
        .map(|(a, b, y)| (categorical_row(&[a, b]), (*y).to_owned()))
        .unzip()
}

fn sin_dataset(points: u32, upper: f64) -> (Vec<Vec<FeatureValue>>, Vec<f64>) {
    (0..points)
        .map(|i| {
            let x = upper * f64::from(i) / f64::from(points);
            (numeric_row(&[x]), x.sin())
        })
        .unzip()
}

/// Load the model at `args.model` when resuming, otherwise start a new one.
fn open_forest<T>(task: T, args: &ForestArgs, config: ForestConfig) -> Result<Forest<T>>
where
    T: arbor_rf::Task + Serialize + serde::de::DeserializeOwned,
    T::Label: Serialize + serde::de::DeserializeOwned,
    T::Summary: Serialize + serde::de::DeserializeOwned,
{
    match (&args.model, args.resume) {
        (Some(path), true) => {
            let forest = Forest::load(path)
                .with_context(|| format!("failed to load model {}", path.display()))?;
            info!(
                n_trees = forest.n_trees(),
                window_len = forest.window().len(),
                "model loaded"
            );
            Ok(forest)
        }
        _ => Ok(Forest::new(task, config)?),
    }
}

fn save_forest<T>(forest: &Forest<T>, path: Option<&Path>) -> Result<()>
where
    T: arbor_rf::Task + Serialize + serde::de::DeserializeOwned,
    T::Label: Serialize + serde::de::DeserializeOwned,
    T::Summary: Serialize + serde::de::DeserializeOwned,
{
    if let Some(path) = path {
        forest
            .save(path)
            .with_context(|| format!("failed to save model {}", path.display()))?;
        info!(path = %path.display(), "model saved");
    }
    Ok(())
}

fn mean_absolute_error(truth: &[f64], predictions: &[f64]) -> f64 {
    let total: f64 = truth
        .iter()
        .zip(predictions)
        .map(|(t, p)| (t - p).abs())
        .sum();
    total / truth.len().max(1) as f64
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Batch prediction runs on the global pool; training builds its own.
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Xor { forest: args } => {
            if args.rounds == 0 {
                bail!("--rounds must be at least 1");
            }
            let config = args.config(cli.seed, cli.threads)?;
            let mut forest = open_forest(Classification::<String>::default(), &args, config)?;

            let (features, labels) = xor_dataset();
            let mut rounds = Vec::with_capacity(args.rounds);
            for round in 0..args.rounds {
                // Later rounds regrow on the retained window only.
                let (batch_x, batch_y) = if round == 0 {
                    (features.as_slice(), labels.as_slice())
                } else {
                    (&[][..], &[][..])
                };
                let report = forest
                    .train(batch_x, batch_y, args.trees)
                    .context("training failed")?;
                rounds.push(report);
            }

            let probabilities = forest
                .predict_proba_batch(&features)
                .context("prediction failed")?;
            let mut rows = Vec::with_capacity(features.len());
            for ((a, b, expected), dist) in XOR_TABLE.iter().zip(&probabilities) {
                let input = categorical_row(&[a, b]);
                let predicted = dist
                    .predicted_class()
                    .cloned()
                    .context("empty class distribution")?;
                rows.push(XorRow {
                    input: [(*a).to_owned(), (*b).to_owned()],
                    expected: (*expected).to_owned(),
                    probability: dist.probability(&predicted),
                    predicted,
                    weighted: forest.predict_weighted(&input).ok(),
                });
            }
            let correct = rows.iter().filter(|r| r.predicted == r.expected).count();
            info!(correct, total = rows.len(), "xor evaluated");

            save_forest(&forest, args.model.as_deref())?;

            let output = XorOutput {
                rounds,
                n_trees: forest.n_trees(),
                correct,
                rows,
                importances: forest.ranked_importances(&["a", "b"])?,
                model: args.model,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Sin {
            points,
            grid,
            forest: args,
        } => {
            if args.rounds == 0 || points == 0 || grid == 0 {
                bail!("--rounds, --points and --grid must be at least 1");
            }
            let config = args.config(cli.seed, cli.threads)?;
            let mut forest = open_forest(Regression, &args, config)?;

            let (features, labels) = sin_dataset(points, 5.0);
            let mut rounds = Vec::with_capacity(args.rounds);
            for round in 0..args.rounds {
                let (batch_x, batch_y) = if round == 0 {
                    (features.as_slice(), labels.as_slice())
                } else {
                    (&[][..], &[][..])
                };
                let report = forest
                    .train(batch_x, batch_y, args.trees)
                    .context("training failed")?;
                rounds.push(report);
            }

            let (grid_x, grid_y) = sin_dataset(grid, 5.0);
            let predictions = forest
                .predict_batch(&grid_x)
                .context("prediction failed")?;
            let mae = mean_absolute_error(&grid_y, &predictions);
            let weighted_mae = forest
                .predict_weighted_batch(&grid_x)
                .ok()
                .map(|weighted| mean_absolute_error(&grid_y, &weighted));
            info!(mae, weighted_mae = ?weighted_mae, "sin evaluated");

            save_forest(&forest, args.model.as_deref())?;

            let output = SinOutput {
                rounds,
                n_trees: forest.n_trees(),
                n_points: points,
                n_grid: grid,
                mean_absolute_error: mae,
                weighted_mean_absolute_error: weighted_mae,
                model: args.model,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
