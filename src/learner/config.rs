//! Learner Configuration
//!
//! Stopping rules, search limits and run settings of the tree learner.
use crate::constants::{
    DEFAULT_MAX_BINDINGS, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NEW_VARS, DEFAULT_MAX_VARS, DEFAULT_MIN_BAGS_SPLIT,
    DEFAULT_MIN_GAIN,
};
use crate::errors::ConcunoError;
use crate::grower::GrowPolicy;
use crate::splitter::Criterion;
use crate::utils::{validate_positive_count, validate_positive_float_parameter};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_min_gain() -> f64 {
    DEFAULT_MIN_GAIN
}
fn default_min_bags_split() -> usize {
    DEFAULT_MIN_BAGS_SPLIT
}
fn default_max_new_vars() -> usize {
    DEFAULT_MAX_NEW_VARS
}
fn default_max_vars() -> usize {
    DEFAULT_MAX_VARS
}
fn default_max_bindings() -> usize {
    DEFAULT_MAX_BINDINGS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Maximum number of splits on any path from the root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// A split must improve impurity by strictly more than this.
    #[serde(default = "default_min_gain")]
    pub min_gain: f64,
    /// Nodes reached by fewer bags become leaves.
    #[serde(default = "default_min_bags_split")]
    pub min_bags_split: usize,
    /// Variables one split may introduce.
    #[serde(default = "default_max_new_vars")]
    pub max_new_vars: usize,
    /// Variables along one path.
    #[serde(default = "default_max_vars")]
    pub max_vars: usize,
    /// Bindings kept per node while growing, larger populations are subsampled.
    #[serde(default = "default_max_bindings")]
    pub max_bindings: usize,
    #[serde(default)]
    pub criterion: Criterion,
    #[serde(default)]
    pub grow_policy: GrowPolicy,
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            min_gain: DEFAULT_MIN_GAIN,
            min_bags_split: DEFAULT_MIN_BAGS_SPLIT,
            max_new_vars: DEFAULT_MAX_NEW_VARS,
            max_vars: DEFAULT_MAX_VARS,
            max_bindings: DEFAULT_MAX_BINDINGS,
            criterion: Criterion::Gini,
            grow_policy: GrowPolicy::DepthFirst,
            num_threads: None,
            seed: 0,
            verbose: false,
        }
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> Result<(), ConcunoError> {
        validate_positive_float_parameter(self.min_gain, "min_gain")?;
        validate_positive_count(self.max_bindings, "max_bindings")?;
        validate_positive_count(self.max_vars, "max_vars")?;
        if self.num_threads == Some(0) {
            return Err(ConcunoError::InvalidParameter(
                "num_threads".to_string(),
                "None or at least 1".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConcunoError> {
        fs::write(path, self.json_dump()?).map_err(|e| ConcunoError::UnableToWrite(e.to_string()))
    }

    fn json_dump(&self) -> Result<String, ConcunoError> {
        serde_json::to_string(self).map_err(|e| ConcunoError::UnableToWrite(e.to_string()))
    }

    fn from_json(json_str: &str) -> Result<Self, ConcunoError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| ConcunoError::UnableToRead(e.to_string()))
    }

    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, ConcunoError> {
        let json_str = fs::read_to_string(path).map_err(|e| ConcunoError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for LearnerConfig {}
