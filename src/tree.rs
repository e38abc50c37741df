//! Tree
//!
//! A single decision tree, grown on binned data and evaluated on raw values.
use crate::data::{JaggedMatrix, Matrix};
use crate::gradient::GradientPairs;
use crate::grower::GrowPolicy;
use crate::histogram::NodeHistogram;
use crate::node::{Node, SplittableNode};
use crate::splitter::{NodeInfo, Splitter};
use crate::utils::pivot_on_split;
use hashbrown::HashMap;
use rayon::{prelude::*, ThreadPool};
use serde::{Deserialize, Serialize};
use std::cmp::max;
use std::collections::HashSet;
use std::fmt::{self, Display};

/// Stopping rules of the tree grower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthLimits {
    /// Maximum depth, 0 means unlimited.
    pub max_depth: usize,
    /// Maximum number of leaves, 0 means unlimited.
    pub max_leaves: usize,
    pub grow_policy: GrowPolicy,
}

impl GrowthLimits {
    #[inline]
    fn can_split(&self, node: &SplittableNode) -> bool {
        (self.max_depth == 0 || node.depth < self.max_depth) && node.counts() >= 2
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Tree {
    /// Nodes indexed by their number, the root is node 0.
    pub nodes: Vec<Node>,
    pub depth: usize,
    pub n_leaves: usize,
    /// Number of weights per leaf, 1 unless the tree is a multi-output tree.
    pub n_outputs: usize,
    /// Output a single-output tree contributes to.
    pub group: usize,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl Tree {
    pub fn new(n_outputs: usize, group: usize) -> Self {
        Tree {
            nodes: Vec::new(),
            depth: 0,
            n_leaves: 0,
            n_outputs,
            group,
        }
    }

    /// Grow the tree on the rows in `index`.
    ///
    /// Every node looks for its best split when it's created. The smaller
    /// child of a split gets its histograms from a scan over its rows, the
    /// larger one from the parent histograms minus the smaller child.
    ///
    /// * `data` - Column-major binned data.
    /// * `cuts` - Bin map of the data.
    /// * `index` - Rows used to grow the tree.
    /// * `col_index` - Features available to this tree, in increasing order.
    /// * `grad` - Gradient pairs of every row, with `n_outputs` columns.
    /// * `splitter` - Split finder.
    /// * `limits` - Growth policy and its stopping rules.
    /// * `cat_index` - Categorical features.
    /// * `pool` - Thread pool of the training session.
    #[allow(clippy::too_many_arguments)]
    pub fn fit<T: Splitter + Sync>(
        &mut self,
        data: &Matrix<u16>,
        cuts: &JaggedMatrix<f64>,
        mut index: Vec<usize>,
        col_index: &[usize],
        grad: &GradientPairs,
        splitter: &T,
        limits: &GrowthLimits,
        cat_index: Option<&HashSet<usize>>,
        pool: &ThreadPool,
    ) {
        let eta = splitter.get_eta();
        let params = splitter.get_params();
        self.n_outputs = grad.n_outputs;
        self.nodes.clear();
        self.depth = 0;
        self.n_leaves = 1;

        // Histograms of the nodes that are still waiting to be split.
        let mut hist_cache: HashMap<usize, NodeHistogram> = HashMap::new();

        let (g, h) = grad.sums(&index);
        let mut root = SplittableNode::new(0, 0, 0, 0, index.len(), NodeInfo::new(g, h, index.len(), params));
        self.nodes.push(root.as_node(eta));
        if limits.can_split(&root) {
            let hist = NodeHistogram::build(data, cuts, &index, col_index, grad, pool);
            root.split_info = splitter.best_split(&root.info, &hist, col_index, cuts, cat_index, pool);
            if root.split_info.is_some() {
                hist_cache.insert(0, hist);
            }
        }

        let mut growable = limits.grow_policy.grower();
        if root.split_info.is_some() {
            growable.add_node(root);
        }

        while let Some(node) = growable.get_next_node() {
            if limits.max_leaves > 0 && self.n_leaves >= limits.max_leaves {
                break;
            }
            let SplittableNode {
                num,
                depth,
                start_idx,
                stop_idx,
                split_info,
                ..
            } = node;
            let split_info = match split_info {
                Some(s) => s,
                None => continue,
            };
            let parent_hist = hist_cache.remove(&num);

            let n_left = pivot_on_split(
                &mut index[start_idx..stop_idx],
                data.get_col(split_info.split_feature),
                &split_info.left_bins,
                split_info.default_left,
            );
            let split_idx = start_idx + n_left;

            let left_num = self.nodes.len();
            let right_num = left_num + 1;
            let mut left = SplittableNode::new(
                left_num,
                depth + 1,
                num,
                start_idx,
                split_idx,
                split_info.left_node.clone(),
            );
            let mut right = SplittableNode::new(
                right_num,
                depth + 1,
                num,
                split_idx,
                stop_idx,
                split_info.right_node.clone(),
            );
            self.nodes[num].make_parent_node(&split_info, left_num, right_num);
            self.nodes.push(left.as_node(eta));
            self.nodes.push(right.as_node(eta));
            self.n_leaves += 1;
            self.depth = max(self.depth, depth + 1);

            let (left_ok, right_ok) = (limits.can_split(&left), limits.can_split(&right));
            if left_ok || right_ok {
                let left_smaller = left.counts() <= right.counts();
                let (small, large) = if left_smaller { (&left, &right) } else { (&right, &left) };
                let small_hist =
                    NodeHistogram::build(data, cuts, &index[small.start_idx..small.stop_idx], col_index, grad, pool);
                let large_hist = match &parent_hist {
                    Some(p) => NodeHistogram::from_parent_child(p, &small_hist, pool),
                    None => {
                        NodeHistogram::build(data, cuts, &index[large.start_idx..large.stop_idx], col_index, grad, pool)
                    }
                };
                let (left_hist, right_hist) = if left_smaller {
                    (small_hist, large_hist)
                } else {
                    (large_hist, small_hist)
                };

                let find = |n: &SplittableNode, ok: bool, hist: &NodeHistogram| {
                    if ok {
                        splitter.best_split(&n.info, hist, col_index, cuts, cat_index, pool)
                    } else {
                        None
                    }
                };
                let (left_split, right_split) = pool.install(|| {
                    rayon::join(
                        || find(&left, left_ok, &left_hist),
                        || find(&right, right_ok, &right_hist),
                    )
                });
                left.split_info = left_split;
                right.split_info = right_split;
                if left.split_info.is_some() {
                    hist_cache.insert(left_num, left_hist);
                }
                if right.split_info.is_some() {
                    hist_cache.insert(right_num, right_hist);
                }
            }

            for child in [left, right] {
                if child.split_info.is_some() {
                    growable.add_node(child);
                }
            }
        }
    }

    #[inline]
    fn find_leaf<F: Fn(usize) -> f64>(&self, value: F, missing: &f64) -> &Node {
        let mut node = &self.nodes[0];
        while !node.is_leaf {
            node = &self.nodes[node.get_child_idx(&value(node.split_feature), missing)];
        }
        node
    }

    /// Leaf weights of a row stored contiguously.
    pub fn predict_row_from_row_slice(&self, row: &[f64], missing: &f64) -> &[f32] {
        &self.find_leaf(|f| row[f], missing).weights
    }

    /// Leaf weights of row `i`, read through the matrix strides.
    pub fn predict_row(&self, data: &Matrix<f64>, i: usize, missing: &f64) -> &[f32] {
        &self.find_leaf(|f| *data.get(i, f), missing).weights
    }

    /// Add the leaf weights of a row to its margins.
    #[inline]
    pub fn add_to_margin(&self, leaf: &[f32], margin: &mut [f64]) {
        if self.n_outputs == 1 {
            margin[self.group] += f64::from(leaf[0]);
        } else {
            for (m, w) in margin.iter_mut().zip(leaf.iter()) {
                *m += f64::from(*w);
            }
        }
    }

    /// Add the tree's contribution to row-major margins with `margin_cols`
    /// outputs per row.
    pub fn update_margins(&self, data: &Matrix<f64>, margins: &mut [f64], margin_cols: usize, missing: &f64) {
        margins
            .par_chunks_mut(margin_cols)
            .enumerate()
            .for_each(|(i, m)| self.add_to_margin(self.predict_row(data, i, missing), m));
    }
}

impl Display for Tree {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let mut print_buffer: Vec<usize> = vec![0];
        let mut r = String::new();
        while let Some(idx) = print_buffer.pop() {
            let node = &self.nodes[idx];
            r += format!("{}{}\n", "      ".repeat(node.depth).as_str(), node).as_str();
            if !node.is_leaf {
                print_buffer.push(node.right_child);
                print_buffer.push(node.left_child);
            }
        }
        write!(f, "{}", r)
    }
}
