use criterion::{black_box, criterion_group, criterion_main, Criterion};
use histgbm::binning::bin_matrix;
use histgbm::booster::{FitOptions, GradientBooster, TreeMethod};
use histgbm::data::{Matrix, RowMajorMatrix};
use histgbm::device::{Device, ExecutionContext};
use histgbm::gradient::GradientPairs;
use histgbm::grower::GrowPolicy;
use histgbm::histogram::NodeHistogram;
use histgbm::objective::{LogLoss, ObjectiveFunction};
use histgbm::splitter::HistogramSplitter;
use histgbm::tree::{GrowthLimits, Tree};
use histgbm::utils::{fast_f64_sum, fast_sum};
use histgbm::BuiltinObjective;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

const ROWS: usize = 100_000;
const COLS: usize = 5;

fn synthetic_binary(seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<f64> = (0..(ROWS * COLS)).map(|_| rng.gen::<f64>()).collect();
    let y = (0..ROWS)
        .map(|i| if x[i] + x[ROWS + i] > 1.0 { 1.0 } else { 0.0 })
        .collect();
    (x, y)
}

pub fn tree_benchmarks(c: &mut Criterion) {
    let (data_vec, y) = synthetic_binary(0);
    let labels = RowMajorMatrix::new(y.clone(), ROWS, 1);
    let yhat = vec![0.0; ROWS];
    let mut grad = GradientPairs::zeros(ROWS, 1);
    LogLoss::calc_grad_hess(&labels, &yhat, None, None, &mut grad);

    let v: Vec<f32> = vec![10.; 300000];
    c.bench_function("fast sum", |b| b.iter(|| fast_sum(black_box(&v))));
    c.bench_function("fast f64 sum", |b| b.iter(|| fast_f64_sum(black_box(&v))));

    c.bench_function("calc_grad_hess", |b| {
        b.iter(|| {
            let mut g = GradientPairs::zeros(ROWS, 1);
            LogLoss::calc_grad_hess(black_box(&labels), black_box(&yhat), None, None, &mut g);
            g
        })
    });

    let data = Matrix::new(&data_vec, ROWS, COLS);
    let ctx = ExecutionContext::new(Device::Cpu, None).unwrap();
    let bindata = bin_matrix(&data, None, 256, f64::NAN, None).unwrap();
    let bdata = Matrix::new(&bindata.binned_data, data.rows, data.cols);
    let col_index: Vec<usize> = (0..data.cols).collect();
    let splitter = HistogramSplitter::new(Default::default(), 0.3);
    let limits = GrowthLimits {
        max_depth: 6,
        max_leaves: 0,
        grow_policy: GrowPolicy::DepthWise,
    };

    c.bench_function("Build Histogram", |b| {
        b.iter(|| {
            NodeHistogram::build(
                black_box(&bdata),
                &bindata.cuts,
                black_box(&data.index),
                &col_index,
                &grad,
                &ctx.pool,
            )
        })
    });

    c.bench_function("Train Tree", |b| {
        b.iter(|| {
            let mut tree = Tree::new(1, 0);
            tree.fit(
                black_box(&bdata),
                &bindata.cuts,
                data.index.to_owned(),
                &col_index,
                &grad,
                &splitter,
                &limits,
                None,
                &ctx.pool,
            );
            tree
        })
    });

    let mut tree = Tree::new(1, 0);
    tree.fit(
        &bdata,
        &bindata.cuts,
        data.index.to_owned(),
        &col_index,
        &grad,
        &splitter,
        &limits,
        None,
        &ctx.pool,
    );
    c.bench_function("Tree Predict", |b| {
        b.iter(|| {
            let mut margins = vec![0.0; ROWS];
            tree.update_margins(black_box(&data), &mut margins, 1, &f64::NAN);
            margins
        })
    });

    let mut booster_train = c.benchmark_group("booster_train");
    booster_train.warm_up_time(Duration::from_secs(10));
    booster_train.sample_size(20);
    for method in [TreeMethod::Hist, TreeMethod::Approx] {
        booster_train.bench_function(format!("train_booster_{}", method), |b| {
            b.iter(|| {
                let mut booster = GradientBooster::default()
                    .set_objective(BuiltinObjective::LogLoss)
                    .set_tree_method(method)
                    .set_n_estimators(20);
                booster
                    .fit(black_box(&data), black_box(&y), FitOptions::default())
                    .unwrap();
                booster
            })
        });
    }
    booster_train.finish();

    let mut booster = GradientBooster::default()
        .set_objective(BuiltinObjective::LogLoss)
        .set_n_estimators(50);
    booster.fit(&data, &y, FitOptions::default()).unwrap();
    let row_major = data.to_row_major();
    let data_rm = Matrix::new_row_major(&row_major.data, ROWS, COLS);
    c.bench_function("booster_predict", |b| b.iter(|| booster.predict(black_box(&data)).unwrap()));
    c.bench_function("booster_inplace_predict_row_major", |b| {
        b.iter(|| booster.inplace_predict(black_box(&data_rm)).unwrap())
    });
}

criterion_group!(benches, tree_benchmarks);
criterion_main!(benches);
