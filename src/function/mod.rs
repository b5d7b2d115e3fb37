//! Function
//!
//! Typed transformations over raw byte buffers. Every function declares its
//! input and output types up front, and compositions are checked when they
//! are built rather than when they run.
mod composed;
mod get;
mod validity;
mod vector;

pub use composed::{ComposedFunction, Composition, PointerFunction};
pub use get::{GetFunction, PutFunction};
pub use validity::ValidityFunction;
pub use vector::{DifferenceFunction, DistanceFunction};

use crate::constants::POINTER_SIZE;
use crate::data::{encode_entity, read_scalars, Entity, EntityPool};
use crate::errors::ConcunoError;
use crate::schema::{ScalarKind, Schema, TypeId};

/// Capabilities shared by every function variant.
pub trait FunctionOps {
    fn name(&self) -> &str;
    fn type_in(&self) -> TypeId;
    fn type_out(&self) -> TypeId;
    /// Bytes read from the input buffer.
    fn size_in(&self) -> usize;
    /// Bytes written to the output buffer.
    fn size_out(&self) -> usize;
    /// Evaluate over `input`, writing the result into `output`. Both buffers
    /// must have exactly the declared sizes.
    fn evaluate(&self, pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError>;
}

/// The closed set of function variants.
#[derive(Clone, Debug)]
pub enum Function {
    Get(GetFunction),
    Put(PutFunction),
    Difference(DifferenceFunction),
    Distance(DistanceFunction),
    Composed(ComposedFunction),
    Pointer(PointerFunction),
    Validity(ValidityFunction),
}

impl Function {
    fn ops(&self) -> &dyn FunctionOps {
        match self {
            Function::Get(f) => f,
            Function::Put(f) => f,
            Function::Difference(f) => f,
            Function::Distance(f) => f,
            Function::Composed(f) => f,
            Function::Pointer(f) => f,
            Function::Validity(f) => f,
        }
    }

    /// Only validity checks make sense on unbound variable slots.
    pub fn tolerates_unbound(&self) -> bool {
        matches!(self, Function::Validity(_))
    }

    /// Properties this function reads or writes, as (entity type, name).
    pub fn required_properties(&self) -> Vec<(TypeId, String)> {
        match self {
            Function::Get(f) => vec![(f.entity_type(), f.name().to_string())],
            Function::Put(f) => vec![(f.type_out(), f.name().trim_end_matches('=').to_string())],
            Function::Composed(f) => {
                let mut props = f.outer().required_properties();
                props.extend(f.inner().required_properties());
                props
            }
            Function::Pointer(f) => f.base().required_properties(),
            Function::Difference(_) | Function::Distance(_) | Function::Validity(_) => Vec::new(),
        }
    }

    /// Describe how this function reads bindings, failing unless it takes
    /// entity pointers and returns numeric scalars.
    pub fn signature(&self, schema: &Schema) -> Result<FunctionSignature, ConcunoError> {
        let input = schema.ty(self.type_in());
        let (arity, entity_type) = if input.is_pointer() {
            (1, schema.base_of(self.type_in()))
        } else {
            match input.base() {
                Some(element) if input.is_array() && schema.ty(element).is_pointer() => {
                    (input.count, schema.base_of(element))
                }
                _ => {
                    return Err(ConcunoError::TypeMismatch(format!(
                        "{} takes {}, not entity pointers",
                        self.name(),
                        input.name
                    )))
                }
            }
        };
        let (kind, components) = schema.scalar_layout(self.type_out()).ok_or_else(|| {
            ConcunoError::TypeMismatch(format!(
                "{} returns {}, which isn't numeric",
                self.name(),
                schema.ty(self.type_out()).name
            ))
        })?;
        Ok(FunctionSignature {
            arity,
            entity_type,
            kind,
            components,
        })
    }

    /// Wrap a function over entity records in a `PointerFunction`, so it can
    /// read entities through binding handles. Other functions are returned
    /// unchanged.
    pub fn into_relational(self, schema: &Schema) -> Result<Function, ConcunoError> {
        let input = schema.ty(self.type_in());
        if input.base().is_none() && input.scalar().is_none() {
            Ok(Function::Pointer(PointerFunction::wrap(schema, self)?))
        } else {
            Ok(self)
        }
    }

    /// Evaluate over the entities bound to `var_indices`.
    ///
    /// Returns `None` when an argument is unbound, unless this function
    /// tolerates that, or when any resulting component is NaN.
    pub fn evaluate_binding(
        &self,
        pool: &EntityPool,
        signature: &FunctionSignature,
        binding: &[Option<Entity>],
        var_indices: &[usize],
    ) -> Result<Option<Vec<f64>>, ConcunoError> {
        let mut input = vec![0u8; signature.arity * POINTER_SIZE];
        for (&var, chunk) in var_indices.iter().zip(input.chunks_exact_mut(POINTER_SIZE)) {
            let entity = binding.get(var).copied().flatten();
            if entity.is_none() && !self.tolerates_unbound() {
                return Ok(None);
            }
            encode_entity(entity, chunk);
        }
        let mut output = vec![0u8; self.size_out()];
        self.evaluate(pool, &input, &mut output)?;
        let values = read_scalars(signature.kind, &output, signature.components)?;
        if values.iter().any(|v| v.is_nan()) {
            Ok(None)
        } else {
            Ok(Some(values))
        }
    }
}

impl FunctionOps for Function {
    fn name(&self) -> &str {
        self.ops().name()
    }

    fn type_in(&self) -> TypeId {
        self.ops().type_in()
    }

    fn type_out(&self) -> TypeId {
        self.ops().type_out()
    }

    fn size_in(&self) -> usize {
        self.ops().size_in()
    }

    fn size_out(&self) -> usize {
        self.ops().size_out()
    }

    fn evaluate(&self, pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        self.ops().evaluate(pool, input, output)
    }
}

macro_rules! impl_from_function {
    ($($variant:ident => $ty:ty),*) => {
        $(
            impl From<$ty> for Function {
                fn from(f: $ty) -> Self {
                    Function::$variant(f)
                }
            }
        )*
    };
}

impl_from_function!(
    Get => GetFunction,
    Put => PutFunction,
    Difference => DifferenceFunction,
    Distance => DistanceFunction,
    Composed => ComposedFunction,
    Pointer => PointerFunction,
    Validity => ValidityFunction
);

/// How a relational function consumes a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Number of variable slots taken.
    pub arity: usize,
    /// Type every argument must be bound to.
    pub entity_type: TypeId,
    /// Encoding of the output scalars.
    pub kind: ScalarKind,
    /// Number of output scalars, each of which can be split on.
    pub components: usize,
}

/// The usual candidate set for one entity type: for every Float property, a
/// getter, the Euclidean distance between two entities, and their difference.
pub fn standard_functions(schema: &mut Schema, entity_type: TypeId) -> Result<Vec<Function>, ConcunoError> {
    let float = schema.float_type();
    let names: Vec<String> = schema
        .ty(entity_type)
        .properties()
        .iter()
        .filter(|p| schema.base_of(p.type_id) == float)
        .map(|p| p.name.clone())
        .collect();
    let mut functions: Vec<Function> = Vec::with_capacity(3 * names.len());
    for name in names {
        let get = GetFunction::new(schema, entity_type, &name)?;
        let vector_type = get.type_out();
        functions.push(PointerFunction::new(schema, get.clone().into()).into());
        let distance = DistanceFunction::euclidean(schema, vector_type)?;
        let pointer = PointerFunction::new(schema, get.clone().into());
        functions.push(ComposedFunction::new(schema, distance.into(), pointer.into())?.into());
        let difference = DifferenceFunction::new(schema, vector_type)?;
        let pointer = PointerFunction::new(schema, get.into());
        functions.push(ComposedFunction::new(schema, difference.into(), pointer.into())?.into());
    }
    Ok(functions)
}
