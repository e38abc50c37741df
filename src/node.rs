use crate::binning::is_valid_category;
use crate::categories::CategorySet;
use crate::splitter::{NodeInfo, SplitInfo};
use crate::utils::is_missing;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Debug};

/// A node of the tree under construction. It carries the rows it owns, as
/// the range `start_idx..stop_idx` of the tree's index, and its best split,
/// found when the node was created.
#[derive(Debug)]
pub struct SplittableNode {
    pub num: usize,
    pub depth: usize,
    pub parent_node: usize,
    pub start_idx: usize,
    pub stop_idx: usize,
    pub info: NodeInfo,
    pub split_info: Option<SplitInfo>,
}

/// A node of a trained tree.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Node {
    pub num: usize,
    /// Leaf weights, one per output of the tree, already scaled by the learning rate.
    pub weights: Vec<f32>,
    pub hessian_sum: f32,
    pub depth: usize,
    pub split_value: f64,
    pub split_feature: usize,
    pub split_gain: f32,
    pub default_left: bool,
    pub left_child: usize,
    pub right_child: usize,
    pub is_leaf: bool,
    pub parent_node: usize,
    pub left_cats: Option<CategorySet>,
}

impl SplittableNode {
    pub fn new(num: usize, depth: usize, parent_node: usize, start_idx: usize, stop_idx: usize, info: NodeInfo) -> Self {
        SplittableNode {
            num,
            depth,
            parent_node,
            start_idx,
            stop_idx,
            info,
            split_info: None,
        }
    }

    #[inline]
    pub fn counts(&self) -> usize {
        self.stop_idx - self.start_idx
    }

    /// Gain of the best split, negative infinity if the node can't be split.
    #[inline]
    pub fn split_gain(&self) -> f64 {
        self.split_info.as_ref().map_or(f64::NEG_INFINITY, |s| s.split_gain)
    }

    pub fn as_node(&self, eta: f64) -> Node {
        Node {
            num: self.num,
            weights: self.info.weights.iter().map(|w| (w * eta) as f32).collect(),
            hessian_sum: self.info.hessian_sum() as f32,
            depth: self.depth,
            split_value: 0.0,
            split_feature: 0,
            split_gain: 0.0,
            default_left: false,
            left_child: 0,
            right_child: 0,
            is_leaf: true,
            parent_node: self.parent_node,
            left_cats: None,
        }
    }
}

// Nodes are popped by highest split gain, on equal gain the node created
// first wins.
impl Ord for SplittableNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.split_gain()
            .total_cmp(&other.split_gain())
            .then_with(|| other.num.cmp(&self.num))
    }
}

impl PartialOrd for SplittableNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SplittableNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SplittableNode {}

impl Node {
    /// Turn a leaf into a parent node.
    pub fn make_parent_node(&mut self, split_info: &SplitInfo, left_child: usize, right_child: usize) {
        self.is_leaf = false;
        self.split_value = split_info.split_value;
        self.split_feature = split_info.split_feature;
        self.split_gain = split_info.split_gain as f32;
        self.default_left = split_info.default_left;
        self.left_child = left_child;
        self.right_child = right_child;
        self.left_cats = split_info.left_cats.clone();
    }

    /// Get the path that should be traveled down, given a value.
    ///
    /// Values that are not a known category code go right on categorical
    /// splits.
    #[inline]
    pub fn get_child_idx(&self, v: &f64, missing: &f64) -> usize {
        if is_missing(v, missing) {
            return if self.default_left {
                self.left_child
            } else {
                self.right_child
            };
        }
        match &self.left_cats {
            Some(cats) => {
                if is_valid_category(*v) && cats.contains(*v as u32) {
                    self.left_child
                } else {
                    self.right_child
                }
            }
            None => {
                if v < &self.split_value {
                    self.left_child
                } else {
                    self.right_child
                }
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_leaf {
            let w: Vec<String> = self.weights.iter().map(|w| w.to_string()).collect();
            write!(f, "{}:leaf={},cover={}", self.num, w.join(","), self.hessian_sum)
        } else {
            let condition = match &self.left_cats {
                Some(cats) => format!("{} in {}", self.split_feature, cats),
                None => format!("{} < {}", self.split_feature, self.split_value),
            };
            let missing = if self.default_left {
                self.left_child
            } else {
                self.right_child
            };
            write!(
                f,
                "{}:[{}] yes={},no={},missing={},gain={},cover={}",
                self.num, condition, self.left_child, self.right_child, missing, self.split_gain, self.hessian_sum
            )
        }
    }
}
