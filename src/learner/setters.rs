use crate::grower::GrowPolicy;
use crate::learner::Learner;
use crate::splitter::Criterion;

impl Learner {
    // Set methods for parameters

    /// Set the maximum depth on the learner.
    /// * `max_depth` - Maximum number of splits on any path from the root.
    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.cfg.max_depth = max_depth;
        self
    }

    /// Set the minimum gain on the learner.
    /// * `min_gain` - A split is only committed if it improves impurity by strictly
    ///   more than this value.
    pub fn set_min_gain(mut self, min_gain: f64) -> Self {
        self.cfg.min_gain = min_gain;
        self
    }

    /// Set the minimum number of bags to split a node.
    /// * `min_bags_split` - Nodes reached by fewer bags become leaves.
    pub fn set_min_bags_split(mut self, min_bags_split: usize) -> Self {
        self.cfg.min_bags_split = min_bags_split;
        self
    }

    /// Set the number of new variables one split may introduce.
    /// * `max_new_vars` - Each new variable ranges over the entities of one type in the bag.
    pub fn set_max_new_vars(mut self, max_new_vars: usize) -> Self {
        self.cfg.max_new_vars = max_new_vars;
        self
    }

    /// Set the number of variables on any path.
    /// * `max_vars` - Includes the participant slots of the bags.
    pub fn set_max_vars(mut self, max_vars: usize) -> Self {
        self.cfg.max_vars = max_vars;
        self
    }

    /// Set the binding cap on the learner.
    /// * `max_bindings` - Node populations above this size are subsampled while growing.
    ///   Smaller values trade accuracy for memory on bags with many entities.
    pub fn set_max_bindings(mut self, max_bindings: usize) -> Self {
        self.cfg.max_bindings = max_bindings;
        self
    }

    /// Set the impurity criterion.
    /// * `criterion` - Gini or entropy over bag level counts.
    pub fn set_criterion(mut self, criterion: Criterion) -> Self {
        self.cfg.criterion = criterion;
        self
    }

    /// Set the grow policy on the learner.
    /// * `grow_policy` - Order in which pending leaves are split.
    pub fn set_grow_policy(mut self, grow_policy: GrowPolicy) -> Self {
        self.cfg.grow_policy = grow_policy;
        self
    }

    /// Set the number of threads on the learner.
    /// * `num_threads` - Set the number of threads to be used during training.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.cfg.num_threads = num_threads;
        self
    }

    /// Set the seed on the learner.
    /// * `seed` - Integer value used to seed subsampling.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.cfg.seed = seed;
        self
    }

    /// Set verbose.
    /// * `verbose` - Log every committed split at info level.
    pub fn set_verbose(mut self, verbose: bool) -> Self {
        self.cfg.verbose = verbose;
        self
    }
}
