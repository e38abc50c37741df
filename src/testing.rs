//! Seeded synthetic datasets shared by the unit tests. Features are returned
//! column-major, ready for `Matrix::new`.
use crate::gradient::GradientPairs;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn uniform_columns(rng: &mut StdRng, rows: usize, cols: usize) -> Vec<f64> {
    (0..(rows * cols)).map(|_| rng.gen::<f64>()).collect()
}

/// Smooth regression target over uniform features.
pub fn make_regression(rows: usize, cols: usize, noise: f64, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = uniform_columns(&mut rng, rows, cols);
    let y = (0..rows)
        .map(|i| {
            let mut t = 0.0;
            for j in 0..cols {
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                t += sign * (j + 1) as f64 * x[j * rows + i];
            }
            if cols > 1 {
                t += 4.0 * x[i] * x[rows + i];
            }
            t + noise * (rng.gen::<f64>() - 0.5) * 2.0
        })
        .collect();
    (x, y)
}

/// Binary labels separated by the line `x0 + x1 = 1`.
pub fn make_binary(rows: usize, cols: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = uniform_columns(&mut rng, rows, cols.max(2));
    let y = (0..rows)
        .map(|i| if x[i] + x[rows + i] > 1.0 { 1.0 } else { 0.0 })
        .collect();
    (x, y)
}

/// Gaussian-ish blobs, one per class, every class present.
pub fn make_blobs(rows: usize, cols: usize, classes: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let y: Vec<f64> = (0..rows).map(|i| (i % classes) as f64).collect();
    let mut x = vec![0.0; rows * cols];
    for j in 0..cols {
        for i in 0..rows {
            let center = if j % 2 == 0 { 3.0 * y[i] } else { -2.0 * y[i] };
            let jitter: f64 = (0..3).map(|_| rng.gen::<f64>() - 0.5).sum();
            x[j * rows + i] = center + jitter;
        }
    }
    (x, y)
}

/// Query groups of equal size with graded relevance driven by the first feature.
pub fn make_ranking(n_groups: usize, group_size: usize, cols: usize, seed: u64) -> (Vec<f64>, Vec<f64>, Vec<u64>) {
    let rows = n_groups * group_size;
    let mut rng = StdRng::seed_from_u64(seed);
    let x = uniform_columns(&mut rng, rows, cols);
    let y = (0..rows)
        .map(|i| {
            let signal = x[i] + 0.1 * (rng.gen::<f64>() - 0.5);
            (signal * 4.0).floor().clamp(0.0, 3.0)
        })
        .collect();
    let qid = (0..rows).map(|i| (i / group_size) as u64).collect();
    (x, y, qid)
}

/// Squared error gradients at a zero prediction.
pub fn squared_error_gradients(y: &[f64]) -> GradientPairs {
    GradientPairs {
        grad: y.iter().map(|v| -*v as f32).collect(),
        hess: vec![1.0; y.len()],
        n_rows: y.len(),
        n_outputs: 1,
    }
}
