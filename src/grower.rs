use crate::errors::BoostError;
use crate::node::SplittableNode;
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Trait for handling the growth of the tree.
pub trait Grower {
    /// Add a node to the grower.
    fn add_node(&mut self, node: SplittableNode);
    /// Get the next node to split, `None` once the frontier is empty.
    fn get_next_node(&mut self) -> Option<SplittableNode>;
}

impl Grower for BinaryHeap<SplittableNode> {
    fn add_node(&mut self, node: SplittableNode) {
        self.push(node);
    }

    fn get_next_node(&mut self) -> Option<SplittableNode> {
        self.pop()
    }
}

impl Grower for VecDeque<SplittableNode> {
    fn add_node(&mut self, node: SplittableNode) {
        self.push_front(node);
    }

    fn get_next_node(&mut self) -> Option<SplittableNode> {
        self.pop_back()
    }
}

/// Policy for growing the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowPolicy {
    /// Depth-wise growth (level-wise).
    DepthWise,
    /// Loss-guided growth (leaf-wise).
    LossGuide,
}

impl GrowPolicy {
    pub fn grower(&self) -> Box<dyn Grower> {
        match self {
            GrowPolicy::DepthWise => Box::new(VecDeque::new()),
            GrowPolicy::LossGuide => Box::new(BinaryHeap::new()),
        }
    }
}

impl FromStr for GrowPolicy {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depthwise" => Ok(GrowPolicy::DepthWise),
            "lossguide" => Ok(GrowPolicy::LossGuide),
            _ => Err(BoostError::ParseString(
                s.to_string(),
                "GrowPolicy".to_string(),
                "depthwise, lossguide".to_string(),
            )),
        }
    }
}

impl fmt::Display for GrowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrowPolicy::DepthWise => write!(f, "depthwise"),
            GrowPolicy::LossGuide => write!(f, "lossguide"),
        }
    }
}
