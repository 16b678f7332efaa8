//! Modules and module sets.
//!
//! A [`Module`] is the unit of loading and unloading: it owns its reader, its definitions, and the
//! array and pointer types constructed over them. Generic instances may mix types of several
//! modules, so they are owned by the [`ModuleSet`] made of every module they mention and are
//! dropped together with the first of those modules that unloads.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    metadata::{reader::MetadataReader, token::Token},
    typesystem::{TypeHandle, TypeNodeRc},
};

/// Identity of a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// Pseudo module owning the built-in primitives; never unloaded
    pub const CORE: ModuleId = ModuleId(0);
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Identity of a module set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleSetId(pub u32);

/// A reference-counted module
pub type ModuleRc = Arc<Module>;

/// Cache key of an array type over an element
pub(crate) type ArrayKey = (TypeHandle, u32, bool);
/// Cache key of a pointer type over a target
pub(crate) type PointerKey = (TypeHandle, bool);

/// A loaded module
pub struct Module {
    /// Identity
    pub id: ModuleId,
    /// Name other modules use in `TypeRef` scopes
    pub name: String,
    /// Metadata of the module
    pub reader: Arc<dyn MetadataReader>,
    pub(crate) types: SkipMap<Token, TypeNodeRc>,
    pub(crate) arrays: Mutex<HashMap<ArrayKey, TypeNodeRc>>,
    pub(crate) pointers: Mutex<HashMap<PointerKey, TypeNodeRc>>,
}

impl Module {
    /// Create an empty module
    pub fn new(id: ModuleId, name: &str, reader: Arc<dyn MetadataReader>) -> Self {
        Module {
            id,
            name: name.to_string(),
            reader,
            types: SkipMap::new(),
            arrays: Mutex::new(HashMap::new()),
            pointers: Mutex::new(HashMap::new()),
        }
    }

    /// Definition node for a `TypeDef` token, if it was resolved already
    #[must_use]
    pub fn get(&self, token: Token) -> Option<TypeNodeRc> {
        self.types.get(&token).map(|entry| entry.value().clone())
    }

    /// Number of definitions resolved so far
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.types.len()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("types", &self.types.len())
            .finish()
    }
}

/// Identity of a generic instance
///
/// Equal keys produce the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericInstantiationKey {
    /// The generic definition
    pub definition: TypeHandle,
    /// The type arguments
    pub args: Vec<TypeHandle>,
    /// Owner of the instance
    pub module_set: ModuleSetId,
}

/// A reference-counted module set
pub type ModuleSetRc = Arc<ModuleSet>;

/// The owner of generic instances spanning a fixed set of modules
pub struct ModuleSet {
    /// Identity
    pub id: ModuleSetId,
    /// Member modules, sorted
    pub modules: Vec<ModuleId>,
    pub(crate) instances: DashMap<GenericInstantiationKey, TypeNodeRc>,
    pub(crate) arrays: Mutex<HashMap<ArrayKey, TypeNodeRc>>,
    pub(crate) pointers: Mutex<HashMap<PointerKey, TypeNodeRc>>,
}

impl ModuleSet {
    /// Create an empty set over sorted, deduplicated modules
    #[must_use]
    pub fn new(id: ModuleSetId, modules: Vec<ModuleId>) -> Self {
        ModuleSet {
            id,
            modules,
            instances: DashMap::new(),
            arrays: Mutex::new(HashMap::new()),
            pointers: Mutex::new(HashMap::new()),
        }
    }

    /// True if the module is a member
    #[must_use]
    pub fn contains(&self, module: ModuleId) -> bool {
        self.modules.binary_search(&module).is_ok()
    }

    /// Number of cached instances
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSet")
            .field("id", &self.id)
            .field("modules", &self.modules)
            .field("instances", &self.instances.len())
            .finish()
    }
}
