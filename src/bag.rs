//! Bag
//!
//! Labeled collections of entities, and the binding populations derived from
//! them while a tree grows.
use crate::data::{Entity, EntityPool};
use crate::errors::ConcunoError;
use crate::schema::TypeId;
use rand::rngs::StdRng;
use rand::seq::index;

/// A labeled collection of entities, the unit of classification.
#[derive(Clone, Debug)]
pub struct Bag {
    pub label: bool,
    /// Entities the tree may quantify over.
    pub entities: Vec<Entity>,
    /// Entities bound to the first variable slots before any split, in order.
    pub participants: Vec<Entity>,
}

impl Bag {
    pub fn new(label: bool, entities: Vec<Entity>) -> Self {
        Bag {
            label,
            entities,
            participants: Vec::new(),
        }
    }

    pub fn with_participants(label: bool, entities: Vec<Entity>, participants: Vec<Entity>) -> Self {
        Bag {
            label,
            entities,
            participants,
        }
    }
}

/// The bindings derived from one bag, stored flat with `arity` slots each.
///
/// An unbound slot is `None`. Each binding holds distinct entities.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingBag {
    /// Index of the source bag.
    pub bag: usize,
    pub label: bool,
    arity: usize,
    count: usize,
    entities: Vec<Option<Entity>>,
}

impl BindingBag {
    /// The single initial binding of a bag, holding its participants.
    pub fn initial(bag_index: usize, bag: &Bag) -> Self {
        BindingBag {
            bag: bag_index,
            label: bag.label,
            arity: bag.participants.len(),
            count: 1,
            entities: bag.participants.iter().map(|&e| Some(e)).collect(),
        }
    }

    /// No bindings, same source and arity.
    pub fn empty_like(&self) -> Self {
        BindingBag {
            bag: self.bag,
            label: self.label,
            arity: self.arity,
            count: 0,
            entities: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn binding(&self, i: usize) -> &[Option<Entity>] {
        &self.entities[i * self.arity..(i + 1) * self.arity]
    }

    pub fn bindings(&self) -> impl Iterator<Item = &[Option<Entity>]> + '_ {
        (0..self.count).map(move |i| self.binding(i))
    }

    pub fn push(&mut self, binding: &[Option<Entity>]) {
        debug_assert_eq!(binding.len(), self.arity);
        self.entities.extend_from_slice(binding);
        self.count += 1;
    }

    /// Add one slot ranging over the bag's entities of `entity_type`.
    ///
    /// Each binding is extended once per entity of that type it doesn't
    /// already hold. A binding with no such entity left gets the new slot
    /// unbound instead, so the bag never disappears from the population.
    pub fn expand(&self, pool: &EntityPool, bag: &Bag, entity_type: TypeId) -> Result<BindingBag, ConcunoError> {
        let mut candidates = Vec::with_capacity(bag.entities.len());
        for &entity in &bag.entities {
            if pool.type_of(entity)? == entity_type {
                candidates.push(entity);
            }
        }
        let arity = self.arity + 1;
        let mut expanded = BindingBag {
            bag: self.bag,
            label: self.label,
            arity,
            count: 0,
            entities: Vec::with_capacity(self.count * candidates.len().max(1) * arity),
        };
        let mut extended = Vec::with_capacity(arity);
        for binding in self.bindings() {
            let before = expanded.count;
            for &entity in &candidates {
                if binding.contains(&Some(entity)) {
                    continue;
                }
                extended.clear();
                extended.extend_from_slice(binding);
                extended.push(Some(entity));
                expanded.push(&extended);
            }
            if expanded.count == before {
                extended.clear();
                extended.extend_from_slice(binding);
                extended.push(None);
                expanded.push(&extended);
            }
        }
        Ok(expanded)
    }

    /// Keep `amount` bindings chosen at random, preserving their order.
    pub fn subsample(&self, amount: usize, rng: &mut StdRng) -> BindingBag {
        if amount >= self.count {
            return self.clone();
        }
        let mut chosen = index::sample(rng, self.count, amount).into_vec();
        chosen.sort_unstable();
        let mut sampled = self.empty_like();
        for i in chosen {
            sampled.push(self.binding(i));
        }
        sampled
    }
}
