//! Criterion benchmarks for arbor-rf: forest training and prediction.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use arbor_rf::{
    Classification, DecisionTreeConfig, FeatureValue, Forest, ForestConfig, Regression,
    categorical_row, numeric_row,
};

fn make_classification(
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    seed: u64,
) -> (Vec<Vec<FeatureValue>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        features.push(numeric_row(&row));
    }
    (features, labels)
}

fn make_categorical(n_samples: usize, seed: u64) -> (Vec<Vec<FeatureValue>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let levels = ["a", "b", "c", "d", "e"];
    (0..n_samples)
        .map(|_| {
            let cells: Vec<&str> = (0..6).map(|_| levels[rng.gen_range(0..levels.len())]).collect();
            let label = usize::from(cells[0] == cells[1]);
            (categorical_row(&cells), label)
        })
        .unzip()
}

fn bench_forest_train(c: &mut Criterion) {
    let (features, labels) = make_classification(500, 20, 5, 42);
    let config = ForestConfig::new(1000, 50)
        .unwrap()
        .with_feature_fraction(0.25)
        .with_seed(42);

    c.bench_function("forest_train_500x20_5class_50trees", |b| {
        b.iter(|| {
            let mut forest = Forest::new(Classification::default(), config.clone()).unwrap();
            forest.fit(&features, &labels).unwrap()
        });
    });
}

fn bench_forest_predict_batch(c: &mut Criterion) {
    let (features, labels) = make_classification(500, 20, 5, 42);
    let config = ForestConfig::new(1000, 50).unwrap().with_seed(42);
    let mut forest = Forest::new(Classification::default(), config).unwrap();
    forest.fit(&features, &labels).unwrap();

    c.bench_function("forest_predict_batch_500x20_50trees", |b| {
        b.iter(|| forest.predict_batch(&features).unwrap());
    });
}

fn bench_single_tree(c: &mut Criterion) {
    let (features, labels) = make_classification(500, 20, 5, 42);
    let task = Classification::default();
    let config = DecisionTreeConfig::new().with_seed(42);

    c.bench_function("tree_fit_500x20_5class", |b| {
        b.iter(|| config.fit(&task, &features, &labels).unwrap());
    });
}

fn bench_categorical_tree(c: &mut Criterion) {
    let (features, labels) = make_categorical(500, 42);
    let task = Classification::default();
    let config = DecisionTreeConfig::new().with_seed(42);

    c.bench_function("tree_fit_500x6_categorical", |b| {
        b.iter(|| config.fit(&task, &features, &labels).unwrap());
    });
}

fn bench_regression_train(c: &mut Criterion) {
    let features: Vec<_> = (0..1000)
        .map(|i| numeric_row(&[f64::from(i) / 200.0]))
        .collect();
    let labels: Vec<f64> = (0..1000).map(|i| (f64::from(i) / 200.0).sin()).collect();
    let config = ForestConfig::new(1000, 20).unwrap().with_seed(42);

    c.bench_function("forest_train_sin_1000_20trees", |b| {
        b.iter(|| {
            let mut forest = Forest::new(Regression, config.clone()).unwrap();
            forest.fit(&features, &labels).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_forest_train,
    bench_forest_predict_batch,
    bench_single_tree,
    bench_categorical_tree,
    bench_regression_train
);
criterion_main!(benches);
