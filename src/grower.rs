use serde::Deserialize;
use serde::Serialize;

use crate::bag::BindingBag;
use crate::schema::TypeId;
use std::collections::VecDeque;

/// A leaf still waiting to be split, with the bindings that reach it.
#[derive(Debug)]
pub struct PendingNode {
    pub num: usize,
    pub depth: usize,
    /// Entity type of every variable slot bound on the path to this node.
    pub slots: Vec<TypeId>,
    pub population: Vec<BindingBag>,
}

impl PendingNode {
    /// Number of distinct bags reaching the node.
    pub fn bag_count(&self) -> usize {
        self.population.len()
    }

    pub fn binding_count(&self) -> usize {
        self.population.iter().map(|b| b.len()).sum()
    }
}

/// Trait for handling the growth of the tree.
pub trait Grower {
    /// Add a node to the grower.
    fn add_node(&mut self, node: PendingNode);
    /// Get the next node to split.
    fn get_next_node(&mut self) -> Option<PendingNode>;
    /// Check if the grower is empty.
    fn is_empty(&self) -> bool;
}

impl Grower for Vec<PendingNode> {
    fn add_node(&mut self, node: PendingNode) {
        self.push(node);
    }

    fn get_next_node(&mut self) -> Option<PendingNode> {
        self.pop()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl Grower for VecDeque<PendingNode> {
    fn add_node(&mut self, node: PendingNode) {
        self.push_front(node);
    }

    fn get_next_node(&mut self) -> Option<PendingNode> {
        self.pop_back()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

/// Policy for growing the tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowPolicy {
    /// Finish a branch before moving to its siblings.
    #[default]
    DepthFirst,
    /// Level by level.
    BreadthFirst,
}

impl GrowPolicy {
    pub fn grower(&self) -> Box<dyn Grower> {
        match self {
            GrowPolicy::DepthFirst => Box::new(Vec::<PendingNode>::new()),
            GrowPolicy::BreadthFirst => Box::new(VecDeque::<PendingNode>::new()),
        }
    }
}
