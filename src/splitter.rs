//! Splitter
//!
//! Scan the histograms of a node and find the split with the highest
//! regularized gain.
use crate::categories::CategorySet;
use crate::constants::DEFAULT_MAX_CAT_TO_ONEHOT;
use crate::data::JaggedMatrix;
use crate::histogram::{FeatureHistogram, NodeHistogram};
use crate::utils::{gain, weight};
use rayon::{prelude::*, ThreadPool};
use std::collections::HashSet;

/// Regularization parameters shared by every split evaluation of a tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainParams {
    /// L1 penalty on leaf weights.
    pub reg_alpha: f64,
    /// L2 penalty on leaf weights.
    pub reg_lambda: f64,
    /// Minimum gain a split needs to be accepted.
    pub gamma: f64,
    /// Minimum hessian sum of either child, for every output.
    pub min_child_weight: f64,
    /// Categorical features with fewer observed categories use one-vs-rest splits.
    pub max_cat_to_onehot: usize,
}

impl Default for GainParams {
    fn default() -> Self {
        GainParams {
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_cat_to_onehot: DEFAULT_MAX_CAT_TO_ONEHOT,
        }
    }
}

impl GainParams {
    #[inline]
    pub fn score(&self, grad: &[f64], hess: &[f64]) -> f64 {
        grad.iter()
            .zip(hess.iter())
            .map(|(g, h)| gain(*g, *h, self.reg_alpha, self.reg_lambda))
            .sum()
    }

    #[inline]
    pub fn weights(&self, grad: &[f64], hess: &[f64]) -> Vec<f64> {
        grad.iter()
            .zip(hess.iter())
            .map(|(g, h)| weight(*g, *h, self.reg_alpha, self.reg_lambda))
            .collect()
    }
}

/// Gradient statistics of a node, one entry per output.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub grad: Vec<f64>,
    pub hess: Vec<f64>,
    pub counts: usize,
    pub weights: Vec<f64>,
    pub score: f64,
}

impl NodeInfo {
    pub fn new(grad: Vec<f64>, hess: Vec<f64>, counts: usize, params: &GainParams) -> Self {
        let weights = params.weights(&grad, &hess);
        let score = params.score(&grad, &hess);
        NodeInfo {
            grad,
            hess,
            counts,
            weights,
            score,
        }
    }

    pub fn hessian_sum(&self) -> f64 {
        self.hess.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitInfo {
    pub split_gain: f64,
    pub split_feature: usize,
    /// Numeric threshold, rows with `v < split_value` go left.
    pub split_value: f64,
    /// Last bin sent left by a numeric split.
    pub split_bin: u16,
    /// Direction of the rows with a missing value.
    pub default_left: bool,
    /// Category codes sent left by a categorical split.
    pub left_cats: Option<CategorySet>,
    /// Lookup table over the bins of the split feature, true for the
    /// non-missing bins that go left.
    pub left_bins: Vec<bool>,
    pub left_node: NodeInfo,
    pub right_node: NodeInfo,
}

// Running state of the scan over one feature.
struct Candidate {
    gain: f64,
    bins: Vec<usize>,
    default_left: bool,
    left_grad: Vec<f64>,
    left_hess: Vec<f64>,
    left_counts: usize,
}

pub trait Splitter {
    fn get_params(&self) -> &GainParams;
    fn get_eta(&self) -> f64;

    /// Find the best split of a single feature, or `None` if no split
    /// satisfies the regularization constraints.
    fn best_feature_split(
        &self,
        node: &NodeInfo,
        feature: usize,
        hist: &FeatureHistogram,
        cuts: &[f64],
        is_categorical: bool,
    ) -> Option<SplitInfo>;

    /// Find the best possible split, considering all feature histograms.
    ///
    /// Features are evaluated in parallel on the pool, the winner is then
    /// picked sequentially in `col_index` order, so a tie always goes to the
    /// lowest feature.
    fn best_split(
        &self,
        node: &NodeInfo,
        hist: &NodeHistogram,
        col_index: &[usize],
        cuts: &JaggedMatrix<f64>,
        cat_index: Option<&HashSet<usize>>,
        pool: &ThreadPool,
    ) -> Option<SplitInfo>
    where
        Self: Sync,
    {
        let candidates: Vec<Option<SplitInfo>> = pool.install(|| {
            col_index
                .par_iter()
                .map(|f| {
                    let is_categorical = cat_index.map_or(false, |c| c.contains(f));
                    self.best_feature_split(node, *f, &hist.features[*f], cuts.get_col(*f), is_categorical)
                })
                .collect()
        });
        let mut best: Option<SplitInfo> = None;
        for c in candidates.into_iter().flatten() {
            if best.as_ref().map_or(true, |b| c.split_gain > b.split_gain) {
                best = Some(c);
            }
        }
        best
    }
}

/// Exact scan over histogram bins, with a learned default direction for
/// missing values.
#[derive(Debug, Clone)]
pub struct HistogramSplitter {
    pub params: GainParams,
    pub eta: f64,
}

impl HistogramSplitter {
    pub fn new(params: GainParams, eta: f64) -> Self {
        HistogramSplitter { params, eta }
    }

    /// Gain of sending `left` to the left child, or `None` if the split is
    /// not allowed.
    fn evaluate(&self, node: &NodeInfo, left_grad: &[f64], left_hess: &[f64], left_counts: usize) -> Option<f64> {
        if left_counts == 0 || left_counts >= node.counts {
            return None;
        }
        let right_grad: Vec<f64> = node.grad.iter().zip(left_grad).map(|(t, l)| t - l).collect();
        let right_hess: Vec<f64> = node.hess.iter().zip(left_hess).map(|(t, l)| t - l).collect();
        let mcw = self.params.min_child_weight;
        if left_hess.iter().any(|h| *h < mcw) || right_hess.iter().any(|h| *h < mcw) {
            return None;
        }
        let split_gain =
            self.params.score(left_grad, left_hess) + self.params.score(&right_grad, &right_hess) - node.score;
        if split_gain <= self.params.gamma || split_gain.is_nan() {
            None
        } else {
            Some(split_gain)
        }
    }

    /// Try both default directions for a left bin set. Missing going left
    /// only replaces missing going right when strictly better.
    #[allow(clippy::too_many_arguments)]
    fn consider(
        &self,
        node: &NodeInfo,
        hist: &FeatureHistogram,
        bins: &[usize],
        left_grad: &[f64],
        left_hess: &[f64],
        left_counts: usize,
        best: &mut Option<Candidate>,
    ) {
        let miss_counts = hist.counts[0] as usize;
        let with_missing = |v: &[f64], m: &[f64]| -> Vec<f64> { v.iter().zip(m).map(|(a, b)| a + b).collect() };
        let options = [
            (false, left_grad.to_vec(), left_hess.to_vec(), left_counts),
            (
                true,
                with_missing(left_grad, hist.grad_bin(0)),
                with_missing(left_hess, hist.hess_bin(0)),
                left_counts + miss_counts,
            ),
        ];
        for (default_left, lg, lh, lc) in options {
            if default_left && miss_counts == 0 {
                continue;
            }
            if let Some(g) = self.evaluate(node, &lg, &lh, lc) {
                if best.as_ref().map_or(true, |b| g > b.gain) {
                    *best = Some(Candidate {
                        gain: g,
                        bins: bins.to_vec(),
                        default_left,
                        left_grad: lg,
                        left_hess: lh,
                        left_counts: lc,
                    });
                }
            }
        }
    }

    fn numeric_scan(&self, node: &NodeInfo, hist: &FeatureHistogram) -> Option<Candidate> {
        let k_out = hist.n_outputs;
        let mut lg = vec![0.0; k_out];
        let mut lh = vec![0.0; k_out];
        let mut lc = 0;
        let mut best = None;
        // The last bin can not be split off to the right of anything useful,
        // since it only holds values at the top cut.
        for b in 1..hist.n_bins().saturating_sub(1) {
            for k in 0..k_out {
                lg[k] += hist.grad_bin(b)[k];
                lh[k] += hist.hess_bin(b)[k];
            }
            lc += hist.counts[b] as usize;
            if hist.counts[b] == 0 {
                continue;
            }
            self.consider(node, hist, &[b], &lg, &lh, lc, &mut best);
        }
        best
    }

    fn categorical_scan(&self, node: &NodeInfo, hist: &FeatureHistogram) -> Option<Candidate> {
        let k_out = hist.n_outputs;
        let observed: Vec<usize> = (1..hist.n_bins()).filter(|b| hist.counts[*b] > 0).collect();
        if observed.len() < 2 {
            return None;
        }
        let mut best = None;
        if observed.len() < self.params.max_cat_to_onehot {
            for b in observed.iter() {
                self.consider(
                    node,
                    hist,
                    &[*b],
                    hist.grad_bin(*b),
                    hist.hess_bin(*b),
                    hist.counts[*b] as usize,
                    &mut best,
                );
            }
            return best;
        }
        // Order categories by their leaf weight and scan the prefixes.
        let mut order: Vec<(usize, f64)> = observed
            .iter()
            .map(|b| (*b, self.params.weights(hist.grad_bin(*b), hist.hess_bin(*b)).iter().sum()))
            .collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut lg = vec![0.0; k_out];
        let mut lh = vec![0.0; k_out];
        let mut lc = 0;
        let mut bins = Vec::with_capacity(order.len());
        for (b, _) in order.iter().take(order.len() - 1) {
            for k in 0..k_out {
                lg[k] += hist.grad_bin(*b)[k];
                lh[k] += hist.hess_bin(*b)[k];
            }
            lc += hist.counts[*b] as usize;
            bins.push(*b);
            self.consider(node, hist, &bins, &lg, &lh, lc, &mut best);
        }
        best
    }
}

impl Splitter for HistogramSplitter {
    fn get_params(&self) -> &GainParams {
        &self.params
    }

    fn get_eta(&self) -> f64 {
        self.eta
    }

    fn best_feature_split(
        &self,
        node: &NodeInfo,
        feature: usize,
        hist: &FeatureHistogram,
        cuts: &[f64],
        is_categorical: bool,
    ) -> Option<SplitInfo> {
        if hist.n_bins() < 2 {
            return None;
        }
        let candidate = if is_categorical {
            self.categorical_scan(node, hist)?
        } else {
            self.numeric_scan(node, hist)?
        };

        let mut left_bins = vec![false; hist.n_bins()];
        let (split_value, split_bin, left_cats) = if is_categorical {
            for b in candidate.bins.iter() {
                left_bins[*b] = true;
            }
            let cats: CategorySet = candidate.bins.iter().map(|b| cuts[*b - 1] as u32).collect();
            (0.0, 0, Some(cats))
        } else {
            let last = candidate.bins[0];
            for lb in left_bins.iter_mut().take(last + 1).skip(1) {
                *lb = true;
            }
            (cuts[last], last as u16, None)
        };

        let right_grad: Vec<f64> = node.grad.iter().zip(&candidate.left_grad).map(|(t, l)| t - l).collect();
        let right_hess: Vec<f64> = node.hess.iter().zip(&candidate.left_hess).map(|(t, l)| t - l).collect();
        let right_counts = node.counts - candidate.left_counts;
        Some(SplitInfo {
            split_gain: candidate.gain,
            split_feature: feature,
            split_value,
            split_bin,
            default_left: candidate.default_left,
            left_cats,
            left_bins,
            left_node: NodeInfo::new(candidate.left_grad, candidate.left_hess, candidate.left_counts, &self.params),
            right_node: NodeInfo::new(right_grad, right_hess, right_counts, &self.params),
        })
    }
}
