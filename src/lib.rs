// Modules
pub mod bag;
pub mod constants;
pub mod data;
pub mod errors;
pub mod function;
pub mod grower;
pub mod learner;
pub mod node;
pub mod schema;
pub mod splitter;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use bag::{Bag, BindingBag};
pub use data::{Entity, EntityPool};
pub use errors::ConcunoError;
pub use function::{
    standard_functions, ComposedFunction, DifferenceFunction, DistanceFunction, Function, FunctionOps, GetFunction,
    PointerFunction, PutFunction, ValidityFunction,
};
pub use learner::config::{ConfigIO, LearnerConfig};
pub use learner::Learner;
pub use schema::{Schema, TypeId};
pub use tree::Tree;
