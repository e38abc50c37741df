//! Sampler
//!
//! Row and column sampling applied before fitting new trees, for stochastic
//! gradient boosting and random forests.
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleMethod {
    None,
    Random,
}

impl SampleMethod {
    pub fn from_subsample(subsample: f32) -> Self {
        if subsample >= 1.0 {
            SampleMethod::None
        } else {
            SampleMethod::Random
        }
    }
}

// A sampler can be used to subset the data prior to fitting a new tree.
pub trait Sampler {
    /// Sample the data, returning a tuple, where the first item is the samples
    /// chosen for training, and the second are the samples excluded.
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>);
}

/// Keeps every row, without drawing from the generator.
pub struct NoSampler {}

impl Sampler for NoSampler {
    fn sample(&mut self, _rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        (index.to_vec(), Vec::new())
    }
}

/// Bernoulli row sampling.
pub struct RandomSampler {
    subsample: f32,
}

impl RandomSampler {
    pub fn new(subsample: f32) -> Self {
        RandomSampler { subsample }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let subsample = self.subsample;
        let mut chosen = Vec::new();
        let mut excluded = Vec::new();
        for i in index {
            if rng.gen::<f32>() < subsample {
                chosen.push(*i);
            } else {
                excluded.push(*i)
            }
        }
        (chosen, excluded)
    }
}

pub fn row_sampler(method: SampleMethod, subsample: f32) -> Box<dyn Sampler> {
    match method {
        SampleMethod::None => Box::new(NoSampler {}),
        SampleMethod::Random => Box::new(RandomSampler::new(subsample)),
    }
}

/// Features available to one tree, in increasing order. At least one
/// feature is always kept.
pub fn sample_columns(rng: &mut StdRng, n_cols: usize, colsample_bytree: f64) -> Vec<usize> {
    if colsample_bytree >= 1.0 {
        return (0..n_cols).collect();
    }
    let amount = ((n_cols as f64 * colsample_bytree).round() as usize).clamp(1, n_cols.max(1));
    let mut cols = (0..n_cols).choose_multiple(rng, amount);
    cols.sort_unstable();
    cols
}
