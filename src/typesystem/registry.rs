//! Central registry of everything the loader owns.
//!
//! The registry is the arena of the type graph: every node, whatever its kind, is stored here
//! under its [`TypeHandle`] and stays alive until the module owning it unloads. It also owns the
//! module and module-set tables, the built-in primitive nodes, and the canonical nodes standing
//! for method-level generic parameters.
//!
//! # Thread Safety
//!
//! All tables are lock-free (`SkipMap`) or sharded (`DashMap`), so lookups never contend with the
//! loader's structural lock.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use strum::IntoEnumIterator;

use crate::{
    config::LoaderConfig,
    metadata::{flags::TypeAttributes, reader::MetadataReader},
    typesystem::{
        CompressedBitmap, Dispatch, FieldLayout, InterfaceTable, Lifecycle, Module, ModuleId,
        ModuleRc, ModuleSet, ModuleSetId, ModuleSetRc, PrimitiveKind, StaticLayout, TypeHandle,
        TypeKind, TypeNode, TypeNodeRc, Vtable,
    },
    Result,
};

/// Arena of type nodes plus the module tables
pub struct TypeRegistry {
    nodes: SkipMap<TypeHandle, TypeNodeRc>,
    next_handle: AtomicU32,
    primitives: Vec<TypeNodeRc>,
    method_params: DashMap<u32, TypeNodeRc>,
    modules: SkipMap<ModuleId, ModuleRc>,
    module_names: DashMap<String, ModuleId>,
    next_module: AtomicU32,
    module_sets: DashMap<Vec<ModuleId>, ModuleSetRc>,
    sets_by_id: DashMap<ModuleSetId, ModuleSetRc>,
    next_module_set: AtomicU32,
}

impl TypeRegistry {
    /// Create a registry holding the fully initialized primitive nodes
    ///
    /// ## Arguments
    /// * 'config' - Target description used for the primitive layouts
    #[must_use]
    pub fn new(config: &LoaderConfig) -> Self {
        let mut registry = TypeRegistry {
            nodes: SkipMap::new(),
            next_handle: AtomicU32::new(1),
            primitives: Vec::new(),
            method_params: DashMap::new(),
            modules: SkipMap::new(),
            module_names: DashMap::new(),
            next_module: AtomicU32::new(1),
            module_sets: DashMap::new(),
            sets_by_id: DashMap::new(),
            next_module_set: AtomicU32::new(1),
        };

        let mut root_vtable: Option<Vtable> = None;
        for kind in PrimitiveKind::iter() {
            let parent = kind
                .parent()
                .and_then(|parent| registry.primitives.get(parent as usize).cloned());
            let mut supertypes: Vec<TypeNodeRc> = parent
                .as_ref()
                .and_then(|parent| parent.supertypes())
                .map(<[TypeNodeRc]>::to_vec)
                .unwrap_or_default();
            let node = registry.insert(Self::primitive_node(
                registry.allocate_handle(),
                kind,
                parent,
                config,
                &mut root_vtable,
            ));
            supertypes.push(node.clone());
            let _ = node.supertypes.set(Arc::from(supertypes));
            registry.primitives.push(node);
        }

        registry
    }

    fn primitive_node(
        handle: TypeHandle,
        kind: PrimitiveKind,
        parent: Option<TypeNodeRc>,
        config: &LoaderConfig,
        root_vtable: &mut Option<Vtable>,
    ) -> TypeNode {
        let (namespace, name) = kind.name();
        let mut flags = TypeAttributes::PUBLIC;
        if kind.is_value_type() {
            flags |= TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED;
        }
        if kind == PrimitiveKind::String {
            flags |= TypeAttributes::SEALED;
        }
        if kind.is_abstract() {
            flags |= TypeAttributes::ABSTRACT;
        }

        let mut node = TypeNode::new(
            handle,
            ModuleId::CORE,
            namespace,
            name,
            flags,
            TypeKind::Definition {
                token: kind.token(),
                generic_count: 0,
            },
        );
        node.primitive = Some(kind);
        node.lifecycle = Lifecycle::completed();

        let header = config.object_header_size;
        let pointer = config.pointer_size;
        let (instance_size, min_align, has_references) = match kind {
            PrimitiveKind::Object | PrimitiveKind::Array => (header, pointer, false),
            PrimitiveKind::ValueType | PrimitiveKind::Enum => (header, 1, false),
            PrimitiveKind::String => (header + pointer, pointer, false),
            PrimitiveKind::TypedReference => (header + pointer * 2, pointer, true),
            _ => {
                let size = kind.value_size(pointer).unwrap_or(0);
                (header + size, size.max(1), false)
            }
        };
        let _ = node.layout.set(FieldLayout {
            instance_size,
            min_align,
            blittable: kind.is_blittable(),
            has_references,
            fields: Vec::new(),
            explicit_size: false,
            underlying: None,
            element_size: 0,
        });
        let _ = node.statics.set(StaticLayout::default());

        let vtable = root_vtable.get_or_insert_with(|| Arc::from(Vec::new())).clone();
        let _ = node.dispatch.set(Dispatch {
            vtable,
            interfaces: InterfaceTable {
                interfaces: Vec::new(),
                offsets: Vec::new(),
                bitmap: CompressedBitmap::default(),
            },
            conflicts: Vec::new(),
        });

        let _ = node.fields.set(Vec::new());
        let _ = node.methods.set(Vec::new());
        let _ = node.properties.set(Vec::new());
        let _ = node.events.set(Vec::new());
        let _ = node.interfaces.set(Vec::new());
        node.parent = std::sync::RwLock::new(parent);
        node
    }

    /// Allocate a fresh handle
    pub fn allocate_handle(&self) -> TypeHandle {
        TypeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Store a node in the arena
    pub fn insert(&self, node: TypeNode) -> TypeNodeRc {
        let node = Arc::new(node);
        self.nodes.insert(node.handle, node.clone());
        node
    }

    /// Node by handle
    #[must_use]
    pub fn get(&self, handle: TypeHandle) -> Option<TypeNodeRc> {
        self.nodes.get(&handle).map(|entry| entry.value().clone())
    }

    /// Number of live nodes, primitives included
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the arena holds no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Built-in node for a primitive kind
    #[must_use]
    pub fn primitive(&self, kind: PrimitiveKind) -> TypeNodeRc {
        self.primitives[kind as usize].clone()
    }

    /// Canonical node for method-level generic parameter `index`
    pub fn method_param(&self, index: u32) -> TypeNodeRc {
        if let Some(existing) = self.method_params.get(&index) {
            return existing.clone();
        }

        self.method_params
            .entry(index)
            .or_insert_with(|| {
                let node = TypeNode::new(
                    self.allocate_handle(),
                    ModuleId::CORE,
                    "",
                    &format!("!!{index}"),
                    0,
                    TypeKind::GenericParameter {
                        owner: None,
                        index,
                        constraints: Vec::new(),
                    },
                );
                self.insert(node)
            })
            .clone()
    }

    /// Register a module under a unique name
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name is taken
    pub fn add_module(&self, name: &str, reader: Arc<dyn MetadataReader>) -> Result<ModuleRc> {
        let id = ModuleId(self.next_module.fetch_add(1, Ordering::Relaxed));
        match self.module_names.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(malformed_error!("Module {} is already registered", name))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let module = Arc::new(Module::new(id, name, reader));
                self.modules.insert(id, module.clone());
                vacant.insert(id);
                Ok(module)
            }
        }
    }

    /// Module by id
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<ModuleRc> {
        self.modules.get(&id).map(|entry| entry.value().clone())
    }

    /// Module by name
    #[must_use]
    pub fn module_by_name(&self, name: &str) -> Option<ModuleRc> {
        let id = *self.module_names.get(name)?;
        self.module(id)
    }

    /// Ids of all registered modules
    #[must_use]
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|entry| *entry.key()).collect()
    }

    /// Get or create the module set over the given modules
    pub fn module_set(&self, mut modules: Vec<ModuleId>) -> ModuleSetRc {
        modules.sort_unstable();
        modules.dedup();

        if let Some(existing) = self.module_sets.get(&modules) {
            return existing.clone();
        }
        self.module_sets
            .entry(modules.clone())
            .or_insert_with(|| {
                let id = ModuleSetId(self.next_module_set.fetch_add(1, Ordering::Relaxed));
                let set = Arc::new(ModuleSet::new(id, modules));
                self.sets_by_id.insert(id, set.clone());
                set
            })
            .clone()
    }

    /// Module set by id
    #[must_use]
    pub fn module_set_by_id(&self, id: ModuleSetId) -> Option<ModuleSetRc> {
        self.sets_by_id.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of live module sets
    #[must_use]
    pub fn module_set_count(&self) -> usize {
        self.module_sets.len()
    }

    /// Drop a module, every module set containing it, and all nodes they own
    ///
    /// Returns the removed module and module sets, or `None` if the module was not registered.
    pub fn remove_module(&self, id: ModuleId) -> Option<(ModuleRc, Vec<ModuleSetRc>)> {
        let module = self.modules.remove(&id)?.value().clone();
        self.module_names.remove(&module.name);

        let doomed: Vec<Vec<ModuleId>> = self
            .module_sets
            .iter()
            .filter(|entry| entry.value().contains(id))
            .map(|entry| entry.key().clone())
            .collect();
        let sets: Vec<ModuleSetRc> = doomed
            .iter()
            .filter_map(|key| self.module_sets.remove(key).map(|(_, set)| set))
            .collect();
        for set in &sets {
            self.sets_by_id.remove(&set.id);
        }

        let set_ids: HashMap<ModuleSetId, ()> = sets.iter().map(|set| (set.id, ())).collect();
        for entry in self.nodes.iter() {
            let node = entry.value();
            let owned_by_set = node
                .module_set
                .is_some_and(|set| set_ids.contains_key(&set));
            if node.module == id || owned_by_set {
                entry.remove();
            }
        }

        Some((module, sets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::builder::MetadataBuilder;

    #[test]
    fn test_primitives_are_complete() {
        let registry = TypeRegistry::new(&LoaderConfig::default());
        assert_eq!(registry.len(), PrimitiveKind::iter().count());

        let int = registry.primitive(PrimitiveKind::I4);
        assert_eq!(int.full_name(), "System.Int32");
        assert!(int.is_value_type());
        assert_eq!(int.layout().unwrap().instance_size, 16 + 4);
        assert_eq!(int.depth(), Some(3));

        let object = registry.primitive(PrimitiveKind::Object);
        assert!(object.parent().is_none());
        assert_eq!(object.depth(), Some(1));
        let value_type = registry.primitive(PrimitiveKind::ValueType);
        assert!(Arc::ptr_eq(
            object.vtable().unwrap(),
            value_type.vtable().unwrap()
        ));
    }

    #[test]
    fn test_method_params_are_canonical() {
        let registry = TypeRegistry::new(&LoaderConfig::default());
        let first = registry.method_param(0);
        let again = registry.method_param(0);
        let second = registry.method_param(1);
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_module_sets_are_interned() {
        let registry = TypeRegistry::new(&LoaderConfig::default());
        let a = registry.module_set(vec![ModuleId(2), ModuleId(1)]);
        let b = registry.module_set(vec![ModuleId(1), ModuleId(2), ModuleId(1)]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.modules, vec![ModuleId(1), ModuleId(2)]);
    }

    #[test]
    fn test_module_registration_and_removal() {
        let registry = TypeRegistry::new(&LoaderConfig::default());
        let module = registry
            .add_module("App", MetadataBuilder::new("App").build())
            .unwrap();
        assert!(registry
            .add_module("App", MetadataBuilder::new("App").build())
            .is_err());
        assert!(registry.module_by_name("App").is_some());

        let set = registry.module_set(vec![module.id]);
        let (removed, sets) = registry.remove_module(module.id).unwrap();
        assert_eq!(removed.id, module.id);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id, set.id);
        assert!(registry.module(module.id).is_none());
        assert!(registry.module_by_name("App").is_none());
        assert_eq!(registry.module_set_count(), 0);
    }
}
