//! Histogram
//!
//! Efficient histogram calculations for finding optimal splits.
//! Histograms store aggregated gradient and hessian statistics for each bin,
//! accumulated in f64 regardless of the f32 gradient storage.
use crate::data::{JaggedMatrix, Matrix};
use crate::gradient::GradientPairs;
use rayon::{prelude::*, ThreadPool};

/// Histogram of a single feature.
///
/// Gradient and hessian sums are stored flat with index `bin * n_outputs + k`,
/// so every bin holds the sums of all outputs next to each other.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureHistogram {
    /// Gradient sums.
    pub grad: Vec<f64>,
    /// Hessian sums.
    pub hess: Vec<f64>,
    /// Row counts per bin.
    pub counts: Vec<u32>,
    /// Number of outputs accumulated per bin.
    pub n_outputs: usize,
}

impl FeatureHistogram {
    /// Create an empty histogram with `n_bins` bins, bin zero being missing.
    pub fn empty(n_bins: usize, n_outputs: usize) -> Self {
        FeatureHistogram {
            grad: vec![0.0; n_bins * n_outputs],
            hess: vec![0.0; n_bins * n_outputs],
            counts: vec![0; n_bins],
            n_outputs,
        }
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn grad_bin(&self, bin: usize) -> &[f64] {
        &self.grad[(bin * self.n_outputs)..((bin + 1) * self.n_outputs)]
    }

    #[inline]
    pub fn hess_bin(&self, bin: usize) -> &[f64] {
        &self.hess[(bin * self.n_outputs)..((bin + 1) * self.n_outputs)]
    }

    fn accumulate(&mut self, feature: &[u16], index: &[usize], grad: &GradientPairs) {
        let k_out = self.n_outputs;
        let n_bins = self.n_bins();
        for i in index {
            let b = (feature[*i] as usize).min(n_bins - 1);
            let g = grad.row_grad(*i);
            let h = grad.row_hess(*i);
            let base = b * k_out;
            for k in 0..k_out {
                self.grad[base + k] += f64::from(g[k]);
                self.hess[base + k] += f64::from(h[k]);
            }
            self.counts[b] += 1;
        }
    }

    /// Element-wise `parent - child`.
    pub fn from_parent_child(parent: &FeatureHistogram, child: &FeatureHistogram) -> Self {
        FeatureHistogram {
            grad: parent.grad.iter().zip(child.grad.iter()).map(|(p, c)| p - c).collect(),
            hess: parent.hess.iter().zip(child.hess.iter()).map(|(p, c)| p - c).collect(),
            counts: parent
                .counts
                .iter()
                .zip(child.counts.iter())
                .map(|(p, c)| p.saturating_sub(*c))
                .collect(),
            n_outputs: parent.n_outputs,
        }
    }
}

/// Histograms of every feature for one node. Features that are not sampled
/// for the current tree hold an empty histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistogram {
    pub features: Vec<FeatureHistogram>,
}

impl NodeHistogram {
    /// Create zeroed histograms sized from the bin map. One extra bin per
    /// feature keeps values beyond the last cut in range.
    pub fn empty_from_cuts(cuts: &JaggedMatrix<f64>, col_index: &[usize], n_outputs: usize) -> Self {
        let mut features: Vec<FeatureHistogram> = (0..cuts.cols).map(|_| FeatureHistogram::empty(0, n_outputs)).collect();
        for col in col_index {
            features[*col] = FeatureHistogram::empty(cuts.get_col(*col).len() + 1, n_outputs);
        }
        NodeHistogram { features }
    }

    /// Build the histograms of a node by scanning its rows.
    ///
    /// * `data` - Column-major binned data.
    /// * `cuts` - Bin map of the data.
    /// * `index` - Rows assigned to the node.
    /// * `col_index` - Features sampled for this tree.
    /// * `grad` - Gradient pairs of all rows.
    /// * `pool` - Thread pool of the training session.
    pub fn build(
        data: &Matrix<u16>,
        cuts: &JaggedMatrix<f64>,
        index: &[usize],
        col_index: &[usize],
        grad: &GradientPairs,
        pool: &ThreadPool,
    ) -> Self {
        let mut hist = NodeHistogram::empty_from_cuts(cuts, col_index, grad.n_outputs);
        pool.install(|| {
            hist.features
                .par_iter_mut()
                .enumerate()
                .filter(|(_, h)| h.n_bins() > 0)
                .for_each(|(col, h)| h.accumulate(data.get_col(col), index, grad));
        });
        hist
    }

    /// Derive a sibling histogram as `parent - child`, avoiding a scan over
    /// the sibling's rows.
    pub fn from_parent_child(parent: &NodeHistogram, child: &NodeHistogram, pool: &ThreadPool) -> Self {
        let features = pool.install(|| {
            parent
                .features
                .par_iter()
                .zip(child.features.par_iter())
                .map(|(p, c)| FeatureHistogram::from_parent_child(p, c))
                .collect()
        });
        NodeHistogram { features }
    }
}
