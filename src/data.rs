use crate::constants::{NULL_HANDLE, POINTER_SIZE};
use crate::errors::ConcunoError;
use crate::schema::{ScalarKind, Schema, TypeId};
use std::fmt::{Debug, Display};

/// Data trait for the scalar encodings that live inside entity buffers.
pub trait ScalarData: Copy + Debug + Display + PartialOrd + Send + Sync {
    /// Encoding tag matching the schema's standard types.
    const KIND: ScalarKind;
    /// Bytes used by one value.
    const SIZE: usize;
    /// Decode from the first `SIZE` bytes.
    fn read(bytes: &[u8]) -> Self;
    /// Encode into the first `SIZE` bytes.
    fn write(self, bytes: &mut [u8]);
    /// Widen to a float for thresholding.
    fn to_f64(self) -> f64;
}

impl ScalarData for f64 {
    const KIND: ScalarKind = ScalarKind::Float;
    const SIZE: usize = 8;
    fn read(bytes: &[u8]) -> f64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }
    fn write(self, bytes: &mut [u8]) {
        bytes[..8].copy_from_slice(&self.to_le_bytes());
    }
    fn to_f64(self) -> f64 {
        self
    }
}

impl ScalarData for i32 {
    const KIND: ScalarKind = ScalarKind::Int;
    const SIZE: usize = 4;
    fn read(bytes: &[u8]) -> i32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        i32::from_le_bytes(raw)
    }
    fn write(self, bytes: &mut [u8]) {
        bytes[..4].copy_from_slice(&self.to_le_bytes());
    }
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl ScalarData for u64 {
    const KIND: ScalarKind = ScalarKind::Count;
    const SIZE: usize = 8;
    fn read(bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        u64::from_le_bytes(raw)
    }
    fn write(self, bytes: &mut [u8]) {
        bytes[..8].copy_from_slice(&self.to_le_bytes());
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// Fail unless the buffer has exactly the expected size.
#[inline]
pub fn check_size(buffer: &[u8], expected: usize) -> Result<(), ConcunoError> {
    if buffer.len() == expected {
        Ok(())
    } else {
        Err(ConcunoError::BufferSize {
            expected,
            found: buffer.len(),
        })
    }
}

/// Read `count` scalars of the given kind as floats.
pub fn read_scalars(kind: ScalarKind, bytes: &[u8], count: usize) -> Result<Vec<f64>, ConcunoError> {
    let size = kind.size();
    check_size(bytes, size * count)?;
    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| match kind {
            ScalarKind::Float => f64::read(chunk),
            ScalarKind::Int => i32::read(chunk).to_f64(),
            ScalarKind::Count => u64::read(chunk).to_f64(),
        })
        .collect())
}

/// Encode a slice of scalars into a fresh buffer.
pub fn encode_scalars<T: ScalarData>(values: &[T]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * T::SIZE];
    for (v, chunk) in values.iter().zip(bytes.chunks_exact_mut(T::SIZE)) {
        v.write(chunk);
    }
    bytes
}

/// Handle to an entity stored in an `EntityPool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);

impl Entity {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Write an optional entity as a pointer-typed value.
#[inline]
pub fn encode_entity(entity: Option<Entity>, bytes: &mut [u8]) {
    let handle = entity.map_or(NULL_HANDLE, |e| u64::from(e.0));
    handle.write(&mut bytes[..POINTER_SIZE]);
}

/// Read a pointer-typed value, `None` for the null handle.
#[inline]
pub fn decode_entity(bytes: &[u8]) -> Result<Option<Entity>, ConcunoError> {
    check_size(bytes, POINTER_SIZE)?;
    let handle = u64::read(bytes);
    if handle == NULL_HANDLE {
        Ok(None)
    } else {
        u32::try_from(handle)
            .map(|h| Some(Entity(h)))
            .map_err(|_| ConcunoError::DanglingEntity(handle))
    }
}

#[derive(Clone, Copy, Debug)]
struct EntityRecord {
    type_id: TypeId,
    start: usize,
    len: usize,
}

/// Contiguous storage for entity records of any registered type.
///
/// The pool belongs to whoever loads the data. Bags and bindings only hold
/// `Entity` handles into it, and the learner never copies entity bytes.
#[derive(Debug, Default)]
pub struct EntityPool {
    data: Vec<u8>,
    records: Vec<EntityRecord>,
}

impl EntityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `bytes` as an entity of `type_id`. The length must
    /// match the type size.
    pub fn push(&mut self, schema: &Schema, type_id: TypeId, bytes: &[u8]) -> Result<Entity, ConcunoError> {
        let ty = schema.ty(type_id);
        if ty.is_pointer() || ty.scalar().is_some() {
            return Err(ConcunoError::TypeMismatch(format!("entities can't be of type {}", ty.name)));
        }
        check_size(bytes, ty.size)?;
        let handle = u32::try_from(self.records.len())
            .map_err(|_| ConcunoError::DanglingEntity(self.records.len() as u64))?;
        self.records.push(EntityRecord {
            type_id,
            start: self.data.len(),
            len: bytes.len(),
        });
        self.data.extend_from_slice(bytes);
        Ok(Entity(handle))
    }

    /// Store an all-zero entity, typically filled in later with put functions.
    pub fn push_zeroed(&mut self, schema: &Schema, type_id: TypeId) -> Result<Entity, ConcunoError> {
        let zeros = vec![0u8; schema.ty(type_id).size];
        self.push(schema, type_id, &zeros)
    }

    fn record(&self, entity: Entity) -> Result<&EntityRecord, ConcunoError> {
        self.records
            .get(entity.index())
            .ok_or(ConcunoError::DanglingEntity(u64::from(entity.0)))
    }

    pub fn contains(&self, entity: Entity) -> bool {
        entity.index() < self.records.len()
    }

    pub fn type_of(&self, entity: Entity) -> Result<TypeId, ConcunoError> {
        self.record(entity).map(|r| r.type_id)
    }

    pub fn bytes(&self, entity: Entity) -> Result<&[u8], ConcunoError> {
        let r = *self.record(entity)?;
        Ok(&self.data[r.start..r.start + r.len])
    }

    pub fn bytes_mut(&mut self, entity: Entity) -> Result<&mut [u8], ConcunoError> {
        let r = *self.record(entity)?;
        Ok(&mut self.data[r.start..r.start + r.len])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
