//! Interface identity registry.
//!
//! Every interface type that ends up in some type's interface table gets a small integer id,
//! unique among the live interfaces of the loader. The ids index the per-type
//! [`CompressedBitmap`](crate::typesystem::CompressedBitmap) behind the constant-time
//! "implements" check.
//!
//! Ids are allocated from one global bit set guarded by a mutex. Id 0 is reserved. Allocation
//! takes the lowest clear bit; a full set doubles and hands out the first id of the new half.
//! Each id is also recorded under its owner (the module of a plain interface, or the module set of
//! a generic interface instance) so unloading a module frees exactly the ids it introduced.

use std::{collections::HashMap, sync::Mutex};

use crate::{
    typesystem::{IdBitSet, ModuleId, ModuleSetId, TypeNode},
    Result,
};

/// Initial capacity of the id space
pub const INITIAL_INTERFACE_IDS: u32 = 128;

/// Who introduced an interface id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdOwner {
    /// A plain interface defined by a module
    Module(ModuleId),
    /// A generic interface instance owned by a module set
    ModuleSet(ModuleSetId),
}

impl IdOwner {
    /// Owner of the id of the given interface node
    #[must_use]
    pub fn of(node: &TypeNode) -> Self {
        match node.module_set {
            Some(set) => IdOwner::ModuleSet(set),
            None => IdOwner::Module(node.module),
        }
    }
}

struct IdState {
    used: IdBitSet,
    owners: HashMap<IdOwner, IdBitSet>,
}

/// Global allocator of interface ids
pub struct InterfaceIdRegistry {
    state: Mutex<IdState>,
}

impl InterfaceIdRegistry {
    /// Create a registry with id 0 reserved
    #[must_use]
    pub fn new() -> Self {
        let mut used = IdBitSet::with_capacity(INITIAL_INTERFACE_IDS);
        used.insert(0);
        InterfaceIdRegistry {
            state: Mutex::new(IdState {
                used,
                owners: HashMap::new(),
            }),
        }
    }

    /// Allocate a fresh id for an owner
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the registry mutex is poisoned
    pub fn allocate(&self, owner: IdOwner) -> Result<u32> {
        let mut state = lock!(self.state);
        let id = match state.used.first_clear() {
            Some(id) => id,
            None => {
                let old = state.used.capacity();
                state.used.grow(old * 2);
                old
            }
        };
        state.used.insert(id);
        state
            .owners
            .entry(owner)
            .or_insert_with(|| IdBitSet::with_capacity(INITIAL_INTERFACE_IDS))
            .insert(id);
        Ok(id)
    }

    /// Give the id of an interface node, allocating it on first use
    ///
    /// Idempotent: repeated calls, also concurrent ones, return the same id.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the registry mutex is poisoned
    pub fn assign(&self, node: &TypeNode) -> Result<u32> {
        if let Some(id) = node.interface_id.get() {
            return Ok(*id);
        }

        let owner = IdOwner::of(node);
        let id = self.allocate(owner)?;
        let stored = *node.interface_id.get_or_init(|| id);
        if stored != id {
            self.free(owner, id)?;
        }
        Ok(stored)
    }

    fn free(&self, owner: IdOwner, id: u32) -> Result<()> {
        let mut state = lock!(self.state);
        state.used.remove(id);
        if let Some(owned) = state.owners.get_mut(&owner) {
            owned.remove(id);
        }
        Ok(())
    }

    /// Release every id introduced by an owner
    ///
    /// Returns the released ids.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the registry mutex is poisoned
    pub fn release(&self, owner: IdOwner) -> Result<Vec<u32>> {
        let mut state = lock!(self.state);
        let Some(owned) = state.owners.remove(&owner) else {
            return Ok(Vec::new());
        };

        let released: Vec<u32> = owned.iter().collect();
        for id in &released {
            state.used.remove(*id);
        }
        Ok(released)
    }

    /// Ids currently held by an owner
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the registry mutex is poisoned
    pub fn owned_by(&self, owner: IdOwner) -> Result<Vec<u32>> {
        let state = lock!(self.state);
        Ok(state
            .owners
            .get(&owner)
            .map(|owned| owned.iter().collect())
            .unwrap_or_default())
    }

    /// Check whether an id is currently allocated
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the registry mutex is poisoned
    pub fn is_allocated(&self, id: u32) -> Result<bool> {
        Ok(lock!(self.state).used.contains(id))
    }

    /// Current size of the id space
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the registry mutex is poisoned
    pub fn capacity(&self) -> Result<u32> {
        Ok(lock!(self.state).used.capacity())
    }
}

impl Default for InterfaceIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_skips_reserved_zero() {
        let registry = InterfaceIdRegistry::new();
        let owner = IdOwner::Module(ModuleId(1));
        assert_eq!(registry.allocate(owner).unwrap(), 1);
        assert_eq!(registry.allocate(owner).unwrap(), 2);
        assert!(registry.is_allocated(0).unwrap());
    }

    #[test]
    fn test_allocation_doubles_when_full() {
        let registry = InterfaceIdRegistry::new();
        let owner = IdOwner::Module(ModuleId(1));
        for expected in 1..INITIAL_INTERFACE_IDS {
            assert_eq!(registry.allocate(owner).unwrap(), expected);
        }
        assert_eq!(registry.capacity().unwrap(), INITIAL_INTERFACE_IDS);

        let id = registry.allocate(owner).unwrap();
        assert_eq!(id, INITIAL_INTERFACE_IDS);
        assert_eq!(registry.capacity().unwrap(), INITIAL_INTERFACE_IDS * 2);
    }

    #[test]
    fn test_release_frees_owned_ids_only() {
        let registry = InterfaceIdRegistry::new();
        let first = IdOwner::Module(ModuleId(1));
        let second = IdOwner::ModuleSet(ModuleSetId(7));

        let a = registry.allocate(first).unwrap();
        let b = registry.allocate(second).unwrap();
        let c = registry.allocate(first).unwrap();

        let mut released = registry.release(first).unwrap();
        released.sort_unstable();
        assert_eq!(released, vec![a, c]);
        assert!(!registry.is_allocated(a).unwrap());
        assert!(registry.is_allocated(b).unwrap());
        assert_eq!(registry.owned_by(second).unwrap(), vec![b]);

        // Freed ids are reused lowest first
        assert_eq!(registry.allocate(second).unwrap(), a);
    }
}
