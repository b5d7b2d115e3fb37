//! Errors
//!
//! Custom error types used throughout the `concuno` crate.
use thiserror::Error;

/// Errors that can occur while describing entities, building functions, or learning trees.
#[derive(Debug, Error)]
pub enum ConcunoError {
    /// Incompatible function composition or inconsistent entity layout.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    /// First value is the type name, second is the property name.
    #[error("Type {0} has no property named {1}.")]
    MissingProperty(String, String),
    /// Nothing to learn from.
    #[error("Empty input: {0}")]
    EmptyInput(String),
    /// A type with this name already exists with a different layout.
    #[error("Type {0} is already defined with a different size.")]
    DuplicateType(String),
    /// Properties can't change once derived types or functions depend on the layout.
    #[error("Type {0} is sealed, its properties can no longer change.")]
    SealedType(String),
    /// A byte buffer doesn't have the size its type requires.
    #[error("Buffer of {found} bytes found where {expected} bytes were expected.")]
    BufferSize { expected: usize, found: usize },
    /// An entity handle outside of the pool.
    #[error("Entity handle {0} does not exist in the pool.")]
    DanglingEntity(u64),
    /// Dereference of an unbound variable slot.
    #[error("Attempted to dereference an unbound entity.")]
    NullEntity,
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Unable to read configuration.
    #[error("Unable to read configuration: {0}")]
    UnableToRead(String),
    /// Unable to write configuration.
    #[error("Unable to write configuration: {0}")]
    UnableToWrite(String),
    /// The worker pool could not be built.
    #[error("Unable to build thread pool: {0}")]
    ThreadPool(String),
}
