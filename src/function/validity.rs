use crate::constants::POINTER_SIZE;
use crate::data::{check_size, decode_entity, EntityPool, ScalarData};
use crate::errors::ConcunoError;
use crate::function::FunctionOps;
use crate::schema::{Schema, TypeId};

/// 1.0 when one slot of a binding holds an entity, 0.0 when it's unbound.
///
/// This is the only function that accepts unbound arguments, which lets a
/// tree split on whether a variable could be bound at all.
#[derive(Clone, Debug)]
pub struct ValidityFunction {
    name: String,
    type_in: TypeId,
    float_type: TypeId,
    arity: usize,
    slot: usize,
}

impl ValidityFunction {
    pub fn new(schema: &mut Schema, entity_type: TypeId, arity: usize, slot: usize) -> Result<Self, ConcunoError> {
        if slot >= arity {
            return Err(ConcunoError::InvalidParameter(
                "slot".to_string(),
                format!("a slot below the arity {}", arity),
                slot.to_string(),
            ));
        }
        let pointer = schema.pointer_type(entity_type);
        let type_in = schema.array_type(pointer, arity)?;
        Ok(ValidityFunction {
            name: format!("valid[{}]", slot),
            type_in,
            float_type: schema.float_type(),
            arity,
            slot,
        })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl FunctionOps for ValidityFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_in(&self) -> TypeId {
        self.type_in
    }

    fn type_out(&self) -> TypeId {
        self.float_type
    }

    fn size_in(&self) -> usize {
        self.arity * POINTER_SIZE
    }

    fn size_out(&self) -> usize {
        f64::SIZE
    }

    fn evaluate(&self, pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        check_size(input, self.size_in())?;
        check_size(output, f64::SIZE)?;
        let start = self.slot * POINTER_SIZE;
        let valid = match decode_entity(&input[start..start + POINTER_SIZE])? {
            Some(entity) => pool.contains(entity),
            None => false,
        };
        (if valid { 1.0_f64 } else { 0.0 }).write(output);
        Ok(())
    }
}
