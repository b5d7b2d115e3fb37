/// Bytes used by a pointer-typed value, which holds an entity handle.
pub const POINTER_SIZE: usize = 8;
/// Handle value stored for an unbound variable slot.
pub const NULL_HANDLE: u64 = u64::MAX;
pub const FLOAT_TYPE_NAME: &str = "Float";
pub const INT_TYPE_NAME: &str = "Int";
pub const COUNT_TYPE_NAME: &str = "Count";
/// Probability above which a leaf predicts a positive bag.
pub const LEAF_LABEL_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_DEPTH: usize = 4;
pub const DEFAULT_MIN_GAIN: f64 = 1e-6;
pub const DEFAULT_MIN_BAGS_SPLIT: usize = 2;
pub const DEFAULT_MAX_NEW_VARS: usize = 2;
pub const DEFAULT_MAX_VARS: usize = 4;
pub const DEFAULT_MAX_BINDINGS: usize = 100_000;
