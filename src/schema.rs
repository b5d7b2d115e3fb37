//! Schema
//!
//! Runtime description of entity memory layouts. A `Schema` owns every `Type`
//! in an insertion-ordered arena, and everything else refers to types through
//! `TypeId` handles. Two types are the same type only if their ids are equal,
//! structural likeness is never considered.
//!
//! Derived array and pointer types are created lazily and cached on their base
//! type, so asking twice for the same derivation yields the same id. Creating a
//! derived type, or a function over a type, seals that type: its properties can
//! no longer be pushed or expanded, and attempts to do so fail with
//! `ConcunoError::SealedType`.
use crate::constants::{COUNT_TYPE_NAME, FLOAT_TYPE_NAME, INT_TYPE_NAME, POINTER_SIZE};
use crate::errors::ConcunoError;
use hashbrown::HashMap;
use std::fmt;

/// Handle to a `Type` owned by a `Schema`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Numeric scalar encodings understood by the function algebra.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    /// Little endian `f64`.
    Float,
    /// Little endian `i32`.
    Int,
    /// Little endian `u64`.
    Count,
}

impl ScalarKind {
    pub fn size(self) -> usize {
        match self {
            ScalarKind::Float => 8,
            ScalarKind::Int => 4,
            ScalarKind::Count => 8,
        }
    }
}

/// A named region of an entity layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: String,
    /// Bytes from the start of the entity.
    pub offset: usize,
    /// Element type.
    pub type_id: TypeId,
    /// Number of elements packed contiguously.
    pub count: usize,
    /// Total bytes, element size times count.
    pub size: usize,
}

impl Property {
    /// First byte past this property.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Layout descriptor for entities or values.
#[derive(Debug)]
pub struct Type {
    pub name: String,
    /// Size in bytes of one value of this type.
    pub size: usize,
    /// Array arity for derived types, 1 otherwise.
    pub count: usize,
    base: Option<TypeId>,
    pointer: bool,
    scalar: Option<ScalarKind>,
    properties: Vec<Property>,
    array_types: HashMap<usize, TypeId>,
    pointer_type: Option<TypeId>,
    sealed: bool,
}

impl Type {
    fn new(name: &str, size: usize, scalar: Option<ScalarKind>) -> Self {
        Type {
            name: name.to_string(),
            size,
            count: 1,
            base: None,
            pointer: false,
            scalar,
            properties: Vec::new(),
            array_types: HashMap::new(),
            pointer_type: None,
            sealed: false,
        }
    }

    /// The type this one was derived from, if any.
    pub fn base(&self) -> Option<TypeId> {
        self.base
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer
    }

    pub fn is_array(&self) -> bool {
        self.base.is_some() && !self.pointer
    }

    pub fn scalar(&self) -> Option<ScalarKind> {
        self.scalar
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Owns all types of one learning session.
#[derive(Debug)]
pub struct Schema {
    types: Vec<Type>,
    names: HashMap<String, TypeId>,
    float_type: TypeId,
    int_type: TypeId,
    count_type: TypeId,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// A schema holding the standard `Float`, `Int` and `Count` scalar types.
    pub fn new() -> Self {
        let mut schema = Schema {
            types: Vec::new(),
            names: HashMap::new(),
            float_type: TypeId(0),
            int_type: TypeId(0),
            count_type: TypeId(0),
        };
        schema.float_type = schema.register(Type::new(FLOAT_TYPE_NAME, 8, Some(ScalarKind::Float)));
        schema.int_type = schema.register(Type::new(INT_TYPE_NAME, 4, Some(ScalarKind::Int)));
        schema.count_type = schema.register(Type::new(COUNT_TYPE_NAME, 8, Some(ScalarKind::Count)));
        schema
    }

    fn register(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len());
        // Derived types are reachable through their base, not by name.
        if ty.base.is_none() {
            self.names.insert(ty.name.clone(), id);
        }
        self.types.push(ty);
        id
    }

    pub fn float_type(&self) -> TypeId {
        self.float_type
    }

    pub fn int_type(&self) -> TypeId {
        self.int_type
    }

    pub fn count_type(&self) -> TypeId {
        self.count_type
    }

    /// Registers a new record type of the given size.
    ///
    /// Adding a name that already exists returns the existing type when the
    /// sizes agree, and fails otherwise.
    pub fn add_type(&mut self, name: &str, size: usize) -> Result<TypeId, ConcunoError> {
        if let Some(&id) = self.names.get(name) {
            if self.types[id.0].size == size {
                return Ok(id);
            }
            return Err(ConcunoError::DuplicateType(name.to_string()));
        }
        Ok(self.register(Type::new(name, size, None)))
    }

    /// Access a type. Panics on an id from another schema.
    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.0]
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// All types in insertion order, derived types included.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i), t))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The type itself when it isn't derived from another.
    pub fn base_of(&self, id: TypeId) -> TypeId {
        self.types[id.0].base.unwrap_or(id)
    }

    pub fn property(&self, type_id: TypeId, name: &str) -> Option<&Property> {
        self.types[type_id.0].property(name)
    }

    fn check_mutable(&self, type_id: TypeId) -> Result<(), ConcunoError> {
        let ty = &self.types[type_id.0];
        if ty.sealed {
            return Err(ConcunoError::SealedType(ty.name.clone()));
        }
        if ty.base.is_some() || ty.scalar.is_some() {
            return Err(ConcunoError::TypeMismatch(format!(
                "properties can only be added to record types, not {}",
                ty.name
            )));
        }
        Ok(())
    }

    /// Declares a struct field at a fixed offset. The field must fit inside
    /// the declared size of the type.
    pub fn add_property(
        &mut self,
        type_id: TypeId,
        name: &str,
        element: TypeId,
        offset: usize,
        count: usize,
    ) -> Result<(), ConcunoError> {
        self.check_mutable(type_id)?;
        if count == 0 {
            return Err(ConcunoError::InvalidParameter(
                "count".to_string(),
                "at least 1".to_string(),
                count.to_string(),
            ));
        }
        if self.types[type_id.0].property(name).is_some() {
            return Err(ConcunoError::TypeMismatch(format!(
                "property {} already declared on {}",
                name, self.types[type_id.0].name
            )));
        }
        let size = self.types[element.0].size * count;
        let ty = &self.types[type_id.0];
        if offset + size > ty.size {
            return Err(ConcunoError::TypeMismatch(format!(
                "property {} spans bytes {}..{} but {} has {} bytes",
                name,
                offset,
                offset + size,
                ty.name,
                ty.size
            )));
        }
        self.types[type_id.0].properties.push(Property {
            name: name.to_string(),
            offset,
            type_id: element,
            count,
            size,
        });
        Ok(())
    }

    /// Appends a property, or widens an existing property of the same name by
    /// one element. Widening shifts every property laid out after it by the
    /// element size, and the type grows by exactly that size either way.
    pub fn push_or_expand_property(
        &mut self,
        type_id: TypeId,
        name: &str,
        element: TypeId,
    ) -> Result<(), ConcunoError> {
        self.check_mutable(type_id)?;
        let grow = self.types[element.0].size;
        let ty = &mut self.types[type_id.0];
        match ty.properties.iter().position(|p| p.name == name) {
            Some(index) => {
                if ty.properties[index].type_id != element {
                    return Err(ConcunoError::TypeMismatch(format!(
                        "property {} of {} can't be expanded with a different element type",
                        name, ty.name
                    )));
                }
                let old_end = ty.properties[index].end();
                for (i, property) in ty.properties.iter_mut().enumerate() {
                    if i == index {
                        property.count += 1;
                        property.size += grow;
                    } else if property.offset >= old_end {
                        property.offset += grow;
                    }
                }
            }
            None => {
                let offset = ty.size;
                ty.properties.push(Property {
                    name: name.to_string(),
                    offset,
                    type_id: element,
                    count: 1,
                    size: grow,
                });
            }
        }
        ty.size += grow;
        Ok(())
    }

    /// Checks the layout invariant, no overlapping properties and a size equal
    /// to the sum of property sizes, then seals the type.
    pub fn finalize(&mut self, type_id: TypeId) -> Result<(), ConcunoError> {
        let ty = &self.types[type_id.0];
        let mut spans: Vec<(usize, usize)> = ty.properties.iter().map(|p| (p.offset, p.end())).collect();
        spans.sort_unstable();
        if spans.windows(2).any(|w| w[0].1 > w[1].0) {
            return Err(ConcunoError::TypeMismatch(format!("{} has overlapping properties", ty.name)));
        }
        let total: usize = ty.properties.iter().map(|p| p.size).sum();
        if !ty.properties.is_empty() && total != ty.size {
            return Err(ConcunoError::TypeMismatch(format!(
                "{} declares {} bytes but its properties cover {}",
                ty.name, ty.size, total
            )));
        }
        self.seal(type_id);
        Ok(())
    }

    pub fn seal(&mut self, type_id: TypeId) {
        self.types[type_id.0].sealed = true;
    }

    /// An array of `count` values of `base`, created on first request.
    pub fn array_type(&mut self, base: TypeId, count: usize) -> Result<TypeId, ConcunoError> {
        if count == 0 {
            return Err(ConcunoError::InvalidParameter(
                "count".to_string(),
                "an array length of at least 1, use pointer_type for pointers".to_string(),
                count.to_string(),
            ));
        }
        if let Some(id) = self.cached_array_type(base, count) {
            return Ok(id);
        }
        let base_type = &self.types[base.0];
        let mut ty = Type::new(&format!("{}[{}]", base_type.name, count), base_type.size * count, None);
        ty.count = count;
        ty.base = Some(base);
        let id = self.register(ty);
        let base_type = &mut self.types[base.0];
        base_type.array_types.insert(count, id);
        base_type.sealed = true;
        Ok(id)
    }

    /// A pointer to `base`, created on first request.
    pub fn pointer_type(&mut self, base: TypeId) -> TypeId {
        if let Some(id) = self.cached_pointer_type(base) {
            return id;
        }
        let mut ty = Type::new(&format!("{}*", self.types[base.0].name), POINTER_SIZE, None);
        ty.base = Some(base);
        ty.pointer = true;
        let id = self.register(ty);
        let base_type = &mut self.types[base.0];
        base_type.pointer_type = Some(id);
        base_type.sealed = true;
        id
    }

    pub fn cached_array_type(&self, base: TypeId, count: usize) -> Option<TypeId> {
        self.types[base.0].array_types.get(&count).copied()
    }

    pub fn cached_pointer_type(&self, base: TypeId) -> Option<TypeId> {
        self.types[base.0].pointer_type
    }

    /// Scalar encoding and number of scalars of a value of this type, or
    /// `None` for records and pointers.
    pub fn scalar_layout(&self, id: TypeId) -> Option<(ScalarKind, usize)> {
        let ty = &self.types[id.0];
        if let Some(kind) = ty.scalar {
            return Some((kind, 1));
        }
        match ty.base {
            Some(base) if !ty.pointer => self.scalar_layout(base).map(|(kind, n)| (kind, n * ty.count)),
            _ => None,
        }
    }
}
