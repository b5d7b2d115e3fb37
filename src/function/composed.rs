use crate::constants::POINTER_SIZE;
use crate::data::{check_size, decode_entity, EntityPool};
use crate::errors::ConcunoError;
use crate::function::{Function, FunctionOps};
use crate::schema::{Schema, TypeId};

/// How the inner function feeds the outer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Composition {
    /// One inner evaluation whose output is the outer input.
    Raw,
    /// The input is an array, the inner function runs on every element and
    /// the outer function sees the array of results.
    Array { count: usize },
}

/// `outer(inner(x))`, or `outer([inner(x0), inner(x1), ...])` in array mode.
#[derive(Clone, Debug)]
pub struct ComposedFunction {
    name: String,
    outer: Box<Function>,
    inner: Box<Function>,
    composition: Composition,
    type_in: TypeId,
}

impl ComposedFunction {
    /// Raw mode applies when the outer input type is the inner output type.
    /// Array mode applies when the outer input is an array of the inner output
    /// type, in which case the composed input is an array of the inner input
    /// type with the same count. Anything else is a `TypeMismatch`.
    pub fn new(schema: &mut Schema, outer: Function, inner: Function) -> Result<Self, ConcunoError> {
        let outer_in = outer.type_in();
        let inner_out = inner.type_out();
        let (composition, type_in) = if outer_in == inner_out {
            (Composition::Raw, inner.type_in())
        } else if schema.ty(outer_in).is_array() && schema.ty(outer_in).base() == Some(inner_out) {
            let count = schema.ty(outer_in).count;
            if inner.size_in() == 0 || inner.size_out() == 0 {
                return Err(ConcunoError::TypeMismatch(format!(
                    "can't map {} over an array, it has a zero sized input or output",
                    inner.name()
                )));
            }
            (Composition::Array { count }, schema.array_type(inner.type_in(), count)?)
        } else {
            return Err(ConcunoError::TypeMismatch(format!(
                "{} takes {}, but {} returns {}",
                outer.name(),
                schema.ty(outer_in).name,
                inner.name(),
                schema.ty(inner_out).name
            )));
        };
        Ok(ComposedFunction {
            name: format!("{}({})", outer.name(), inner.name()),
            outer: Box::new(outer),
            inner: Box::new(inner),
            composition,
            type_in,
        })
    }

    pub fn composition(&self) -> Composition {
        self.composition
    }

    pub fn outer(&self) -> &Function {
        &self.outer
    }

    pub fn inner(&self) -> &Function {
        &self.inner
    }
}

impl FunctionOps for ComposedFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_in(&self) -> TypeId {
        self.type_in
    }

    fn type_out(&self) -> TypeId {
        self.outer.type_out()
    }

    fn size_in(&self) -> usize {
        match self.composition {
            Composition::Raw => self.inner.size_in(),
            Composition::Array { count } => count * self.inner.size_in(),
        }
    }

    fn size_out(&self) -> usize {
        self.outer.size_out()
    }

    fn evaluate(&self, pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        check_size(input, self.size_in())?;
        let mut between = match self.composition {
            Composition::Raw => vec![0u8; self.inner.size_out()],
            Composition::Array { count } => vec![0u8; count * self.inner.size_out()],
        };
        match self.composition {
            Composition::Raw => self.inner.evaluate(pool, input, &mut between)?,
            Composition::Array { .. } => {
                for (x, y) in input
                    .chunks_exact(self.inner.size_in())
                    .zip(between.chunks_exact_mut(self.inner.size_out()))
                {
                    self.inner.evaluate(pool, x, y)?;
                }
            }
        }
        self.outer.evaluate(pool, &between, output)
    }
}

/// Follows an entity handle and applies the base function to the entity bytes.
#[derive(Clone, Debug)]
pub struct PointerFunction {
    base: Box<Function>,
    pointer_type: TypeId,
}

impl PointerFunction {
    pub fn new(schema: &mut Schema, base: Function) -> Self {
        let pointer_type = schema.pointer_type(base.type_in());
        PointerFunction {
            base: Box::new(base),
            pointer_type,
        }
    }

    /// Like `new`, but only with a pointer type that already exists. Getters
    /// create the pointer type of their entity type, so this works for them
    /// and anything composed over them.
    pub fn wrap(schema: &Schema, base: Function) -> Result<Self, ConcunoError> {
        let pointer_type = schema.cached_pointer_type(base.type_in()).ok_or_else(|| {
            ConcunoError::TypeMismatch(format!(
                "no pointer type exists for {}, the input of {}",
                schema.ty(base.type_in()).name,
                base.name()
            ))
        })?;
        Ok(PointerFunction {
            base: Box::new(base),
            pointer_type,
        })
    }

    pub fn base(&self) -> &Function {
        &self.base
    }
}

impl FunctionOps for PointerFunction {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn type_in(&self) -> TypeId {
        self.pointer_type
    }

    fn type_out(&self) -> TypeId {
        self.base.type_out()
    }

    fn size_in(&self) -> usize {
        POINTER_SIZE
    }

    fn size_out(&self) -> usize {
        self.base.size_out()
    }

    fn evaluate(&self, pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        let entity = decode_entity(input)?.ok_or(ConcunoError::NullEntity)?;
        if pool.type_of(entity)? != self.base.type_in() {
            return Err(ConcunoError::TypeMismatch(format!(
                "{} was given an entity of another type",
                self.name()
            )));
        }
        self.base.evaluate(pool, pool.bytes(entity)?, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{encode_entity, encode_scalars, read_scalars};
    use crate::function::{DifferenceFunction, DistanceFunction, GetFunction};
    use crate::schema::ScalarKind;

    struct Fixture {
        schema: Schema,
        pool: EntityPool,
        block: TypeId,
        position: GetFunction,
    }

    fn fixture() -> Fixture {
        let mut schema = Schema::new();
        let float = schema.float_type();
        let block = schema.add_type("Block", 0).unwrap();
        schema.push_or_expand_property(block, "position", float).unwrap();
        schema.push_or_expand_property(block, "position", float).unwrap();
        schema.push_or_expand_property(block, "mass", float).unwrap();
        let position = GetFunction::new(&mut schema, block, "position").unwrap();
        let mut pool = EntityPool::new();
        pool.push(&schema, block, &encode_scalars(&[0.0_f64, 0.0, 1.0])).unwrap();
        pool.push(&schema, block, &encode_scalars(&[3.0_f64, 4.0, 2.0])).unwrap();
        Fixture {
            schema,
            pool,
            block,
            position,
        }
    }

    fn handles(entities: &[usize]) -> Vec<u8> {
        let mut bytes = vec![0u8; entities.len() * POINTER_SIZE];
        for (e, chunk) in entities.iter().zip(bytes.chunks_exact_mut(POINTER_SIZE)) {
            chunk.copy_from_slice(&(*e as u64).to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_pointer_dereferences() {
        let mut f = fixture();
        let pointer = PointerFunction::new(&mut f.schema, f.position.clone().into());
        assert_eq!(pointer.type_in(), f.schema.cached_pointer_type(f.block).unwrap());
        let mut out = vec![0u8; 16];
        pointer.evaluate(&f.pool, &handles(&[1]), &mut out).unwrap();
        assert_eq!(read_scalars(ScalarKind::Float, &out, 2).unwrap(), vec![3.0, 4.0]);

        let mut null = [0u8; POINTER_SIZE];
        encode_entity(None, &mut null);
        assert!(matches!(
            pointer.evaluate(&f.pool, &null, &mut out),
            Err(ConcunoError::NullEntity)
        ));
        assert!(pointer.evaluate(&f.pool, &handles(&[7]), &mut out).is_err());
    }

    #[test]
    fn test_composed_array_distance() {
        let mut f = fixture();
        let vector = f.position.type_out();
        let distance = DistanceFunction::euclidean(&mut f.schema, vector).unwrap();
        let pointer = PointerFunction::new(&mut f.schema, f.position.clone().into());
        let composed = ComposedFunction::new(&mut f.schema, distance.into(), pointer.into()).unwrap();
        assert_eq!(composed.composition(), Composition::Array { count: 2 });
        assert_eq!(composed.name(), "Distance(position)");
        assert_eq!(f.schema.ty(composed.type_in()).name, "Block*[2]");
        assert_eq!(composed.size_in(), 2 * POINTER_SIZE);

        let mut out = vec![0u8; 8];
        composed.evaluate(&f.pool, &handles(&[0, 1]), &mut out).unwrap();
        assert_eq!(read_scalars(ScalarKind::Float, &out, 1).unwrap(), vec![5.0]);
    }

    #[test]
    fn test_composed_raw() {
        let mut f = fixture();
        let vector = f.position.type_out();
        let pair = f.schema.array_type(vector, 2).unwrap();
        let difference = DifferenceFunction::new(&mut f.schema, vector).unwrap();
        let float = f.schema.float_type();
        let distance = DistanceFunction::euclidean(&mut f.schema, float).unwrap();
        // Difference yields Float[2], which is exactly what Distance over Float takes.
        let composed = ComposedFunction::new(&mut f.schema, distance.into(), difference.into()).unwrap();
        assert_eq!(composed.composition(), Composition::Raw);
        assert_eq!(composed.type_in(), pair);
        let mut out = vec![0u8; 8];
        composed
            .evaluate(&f.pool, &encode_scalars(&[4.0_f64, 1.0, 1.0, 5.0]), &mut out)
            .unwrap();
        // (4, 1) - (1, 5) = (3, -4), then |3 - -4|.
        assert_eq!(read_scalars(ScalarKind::Float, &out, 1).unwrap(), vec![7.0]);
    }

    #[test]
    fn test_composed_mismatch() {
        let mut f = fixture();
        let mass = GetFunction::new(&mut f.schema, f.block, "mass").unwrap();
        let vector = f.position.type_out();
        let distance = DistanceFunction::euclidean(&mut f.schema, vector).unwrap();
        // Distance over Float[2] can't consume a scalar mass.
        assert!(matches!(
            ComposedFunction::new(&mut f.schema, distance.into(), mass.into()),
            Err(ConcunoError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_wrap_needs_existing_pointer_type() {
        let mut schema = Schema::new();
        let float = schema.float_type();
        let distance = DistanceFunction::euclidean(&mut schema, float).unwrap();
        let input = distance.type_in();
        assert!(PointerFunction::wrap(&schema, distance.clone().into()).is_err());
        schema.pointer_type(input);
        assert!(PointerFunction::wrap(&schema, distance.into()).is_ok());
    }
}
