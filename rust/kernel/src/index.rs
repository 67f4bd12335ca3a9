// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entity tables indexed by entity `index`.
//!
//! Traversals use these for visited flags, the manifold pass for its bit
//! flags and the ray classifier for hit/miss records. A table is sized
//! from [`Model::maxindex`] when it is created and grows if entities are
//! added while it is alive.

use crate::error::Result;
use crate::keys::TopologyKey;
use crate::model::Model;

/// Dense table with one slot per entity index.
#[derive(Debug, Clone)]
pub struct IndexTable<T> {
    slots: Vec<T>,
}

impl<T: Clone + Default> IndexTable<T> {
    /// A table with `len` default slots.
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![T::default(); len],
        }
    }

    /// A table covering every index handed out by `m` so far.
    pub fn for_model(m: &Model) -> Self {
        Self::with_len(m.maxindex())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    /// Mutable slot at `index`, growing the table as needed.
    pub fn slot_mut(&mut self, index: usize) -> &mut T {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, T::default());
        }
        &mut self.slots[index]
    }

    pub fn set(&mut self, index: usize, value: T) {
        *self.slot_mut(index) = value;
    }

    /// Value for an entity key.
    pub fn get_key(&self, m: &Model, key: TopologyKey) -> Result<Option<&T>> {
        Ok(self.get(m.index_of(key)?))
    }

    /// Iterates over `(index, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate()
    }
}

impl IndexTable<bool> {
    /// Marks `index` visited. Returns `true` the first time only.
    pub fn visit(&mut self, index: usize) -> bool {
        let slot = self.slot_mut(index);
        !std::mem::replace(slot, true)
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.get(index).copied().unwrap_or(false)
    }
}
