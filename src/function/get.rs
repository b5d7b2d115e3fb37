use crate::data::{check_size, Entity, EntityPool};
use crate::errors::ConcunoError;
use crate::function::FunctionOps;
use crate::schema::{Schema, TypeId};

/// Reads a property value straight out of an entity buffer.
#[derive(Clone, Debug)]
pub struct GetFunction {
    name: String,
    entity_type: TypeId,
    attribute_type: TypeId,
    offset: usize,
    size: usize,
    entity_size: usize,
}

impl GetFunction {
    /// Getter for the named property of `entity_type`. Properties with a count
    /// above one yield the matching array type.
    ///
    /// The entity type is sealed and its pointer type created up front, so
    /// later learners can wrap the getter without mutating the schema.
    pub fn new(schema: &mut Schema, entity_type: TypeId, property: &str) -> Result<Self, ConcunoError> {
        let prop = schema
            .property(entity_type, property)
            .cloned()
            .ok_or_else(|| ConcunoError::MissingProperty(schema.ty(entity_type).name.clone(), property.to_string()))?;
        let attribute_type = if prop.count == 1 {
            prop.type_id
        } else {
            schema.array_type(prop.type_id, prop.count)?
        };
        schema.seal(entity_type);
        schema.pointer_type(entity_type);
        Ok(GetFunction {
            name: prop.name,
            entity_type,
            attribute_type,
            offset: prop.offset,
            size: prop.size,
            entity_size: schema.ty(entity_type).size,
        })
    }

    pub fn entity_type(&self) -> TypeId {
        self.entity_type
    }

    pub fn attribute_type(&self) -> TypeId {
        self.attribute_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl FunctionOps for GetFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_in(&self) -> TypeId {
        self.entity_type
    }

    fn type_out(&self) -> TypeId {
        self.attribute_type
    }

    fn size_in(&self) -> usize {
        self.entity_size
    }

    fn size_out(&self) -> usize {
        self.size
    }

    fn evaluate(&self, _pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        check_size(input, self.entity_size)?;
        check_size(output, self.size)?;
        output.copy_from_slice(&input[self.offset..self.offset + self.size]);
        Ok(())
    }
}

/// Inverse of a `GetFunction`: the value goes in, and the entity buffer passed
/// as output is updated in place.
#[derive(Clone, Debug)]
pub struct PutFunction {
    name: String,
    get: GetFunction,
}

impl PutFunction {
    pub fn new(get: &GetFunction) -> Self {
        PutFunction {
            name: format!("{}=", get.name),
            get: get.clone(),
        }
    }

    fn write(&self, value: &[u8], entity: &mut [u8]) -> Result<(), ConcunoError> {
        check_size(value, self.get.size)?;
        check_size(entity, self.get.entity_size)?;
        entity[self.get.offset..self.get.offset + self.get.size].copy_from_slice(value);
        Ok(())
    }

    /// Write a value into an entity stored in the pool.
    pub fn apply(&self, pool: &mut EntityPool, entity: Entity, value: &[u8]) -> Result<(), ConcunoError> {
        if pool.type_of(entity)? != self.get.entity_type {
            return Err(ConcunoError::TypeMismatch(format!(
                "{} can't write into an entity of another type",
                self.name
            )));
        }
        self.write(value, pool.bytes_mut(entity)?)
    }
}

impl FunctionOps for PutFunction {
    fn name(&self) -> &str {
        &self.name
    }

    // Reversed relative to the getter.
    fn type_in(&self) -> TypeId {
        self.get.attribute_type
    }

    fn type_out(&self) -> TypeId {
        self.get.entity_type
    }

    fn size_in(&self) -> usize {
        self.get.size
    }

    fn size_out(&self) -> usize {
        self.get.entity_size
    }

    fn evaluate(&self, _pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        self.write(input, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{encode_scalars, read_scalars};
    use crate::schema::ScalarKind;

    fn block(schema: &mut Schema) -> TypeId {
        let float = schema.float_type();
        let block = schema.add_type("Block", 0).unwrap();
        schema.push_or_expand_property(block, "position", float).unwrap();
        schema.push_or_expand_property(block, "position", float).unwrap();
        schema.push_or_expand_property(block, "mass", float).unwrap();
        block
    }

    #[test]
    fn test_get_reads_property() {
        let mut schema = Schema::new();
        let block = block(&mut schema);
        let position = GetFunction::new(&mut schema, block, "position").unwrap();
        let mass = GetFunction::new(&mut schema, block, "mass").unwrap();
        assert_eq!(schema.ty(position.type_out()).name, "Float[2]");
        assert_eq!(mass.type_out(), schema.float_type());
        assert!(schema.ty(block).is_sealed());
        assert!(schema.cached_pointer_type(block).is_some());

        let pool = EntityPool::new();
        let entity = encode_scalars(&[1.0_f64, 2.0, 9.5]);
        let mut out = vec![0u8; position.size_out()];
        position.evaluate(&pool, &entity, &mut out).unwrap();
        assert_eq!(read_scalars(ScalarKind::Float, &out, 2).unwrap(), vec![1.0, 2.0]);
        let mut out = vec![0u8; 8];
        mass.evaluate(&pool, &entity, &mut out).unwrap();
        assert_eq!(read_scalars(ScalarKind::Float, &out, 1).unwrap(), vec![9.5]);
        assert!(mass.evaluate(&pool, &entity[..16], &mut out).is_err());
    }

    #[test]
    fn test_get_missing_property() {
        let mut schema = Schema::new();
        let block = block(&mut schema);
        assert!(matches!(
            GetFunction::new(&mut schema, block, "color"),
            Err(ConcunoError::MissingProperty(_, _))
        ));
    }

    #[test]
    fn test_put_mirrors_get() {
        let mut schema = Schema::new();
        let block = block(&mut schema);
        let mass = GetFunction::new(&mut schema, block, "mass").unwrap();
        let put = PutFunction::new(&mass);
        assert_eq!(put.name(), "mass=");
        assert_eq!(put.type_in(), mass.type_out());
        assert_eq!(put.type_out(), mass.type_in());

        let mut pool = EntityPool::new();
        let entity = pool.push_zeroed(&schema, block).unwrap();
        put.apply(&mut pool, entity, &encode_scalars(&[4.25_f64])).unwrap();
        let mut out = vec![0u8; 8];
        mass.evaluate(&pool, pool.bytes(entity).unwrap(), &mut out).unwrap();
        assert_eq!(read_scalars(ScalarKind::Float, &out, 1).unwrap(), vec![4.25]);
        // The rest of the entity is untouched.
        assert_eq!(&pool.bytes(entity).unwrap()[..16], &[0u8; 16]);
    }
}
