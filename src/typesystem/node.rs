//! The type graph node.
//!
//! A [`TypeNode`] is created as a shell with only its identity filled in: handle, owning module,
//! name, attribute flags and [`TypeKind`]. Everything else is computed lazily by the loader and
//! published into write-once cells, guarded by the node's [`Lifecycle`]. After publication the
//! data never changes, so readers need no lock.
//!
//! Nodes own their data through `Arc`. Back references that would otherwise form ownership
//! cycles (a generic parameter to its owner, a nested type to its enclosing type, a member to its
//! declaring type) are [`TypeNodeRef`] weak references.

use std::{
    fmt,
    sync::{atomic::AtomicBool, Arc, OnceLock, RwLock, Weak},
};

use crate::{
    metadata::{
        flags::{GenericParamAttributes, TypeAttributes},
        token::Token,
    },
    typesystem::{
        Diagnostic, Dispatch, DimConflict, Event, FieldLayout, FieldRc, InterfaceTable,
        Lifecycle, LifecycleFlags, MethodRc, ModuleId, ModuleSetId, PrimitiveKind, Property,
        StaticLayout, Vtable,
    },
};

/// A reference-counted type node
pub type TypeNodeRc = Arc<TypeNode>;

/// Stable, loader-unique identity of a type node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(pub u32);

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A weak reference to a type node
#[derive(Clone, Debug, Default)]
pub struct TypeNodeRef {
    weak_ref: Weak<TypeNode>,
}

impl TypeNodeRef {
    /// Create a new `TypeNodeRef` from a strong reference
    pub fn new(strong_ref: &TypeNodeRc) -> Self {
        Self {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the type, returning None if the type has been unloaded
    #[must_use]
    pub fn upgrade(&self) -> Option<TypeNodeRc> {
        self.weak_ref.upgrade()
    }

    /// Check if the referenced type is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak_ref.strong_count() > 0
    }

    /// True if this points at `node`
    #[must_use]
    pub fn points_to(&self, node: &TypeNodeRc) -> bool {
        std::ptr::eq(self.weak_ref.as_ptr(), Arc::as_ptr(node))
    }
}

impl From<&TypeNodeRc> for TypeNodeRef {
    fn from(strong_ref: &TypeNodeRc) -> Self {
        Self::new(strong_ref)
    }
}

/// What a type node is
pub enum TypeKind {
    /// A type defined by a module, or a built-in primitive
    Definition {
        /// The `TypeDef` token, or the artificial primitive token
        token: Token,
        /// Number of generic parameters, 0 for non-generic types
        generic_count: usize,
    },
    /// A generic definition applied to type arguments
    GenericInstance {
        /// The open definition
        definition: TypeNodeRc,
        /// The arguments, one per generic parameter
        args: Vec<TypeNodeRc>,
    },
    /// An array of an element type
    Array {
        /// Element type
        element: TypeNodeRc,
        /// Number of dimensions
        rank: u32,
        /// Multi-dimensional (`T[,]`) rather than a vector (`T[]`)
        bounded: bool,
    },
    /// A pointer to a type
    Pointer {
        /// Target type
        pointee: TypeNodeRc,
        /// Managed pointer (`T&`) rather than unmanaged (`T*`)
        managed: bool,
    },
    /// A generic parameter of a type or method
    GenericParameter {
        /// The declaring generic type; `None` for method-level parameters
        owner: Option<TypeNodeRef>,
        /// Position in the owner's parameter list
        index: u32,
        /// Constraint tokens, resolved lazily in the owner's module
        constraints: Vec<Token>,
    },
}

/// A node of the type graph
pub struct TypeNode {
    /// Loader-unique identity
    pub handle: TypeHandle,
    /// Module that defines the node, [`ModuleId::CORE`] for built-ins
    pub module: ModuleId,
    /// Module set owning a generic instance
    pub module_set: Option<ModuleSetId>,
    /// Namespace, empty for nested and constructed types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Raw `TypeAttributes`, or `GenericParamAttributes` for generic parameters
    pub flags: u32,
    /// What the node is
    pub kind: TypeKind,
    /// Set for the built-in primitive nodes
    pub primitive: Option<PrimitiveKind>,
    /// Nesting depth of generic instances in this type
    pub generic_depth: usize,
    /// The type mentions a generic parameter somewhere
    pub is_open: bool,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) parent: RwLock<Option<TypeNodeRc>>,
    pub(crate) parent_defaulted: AtomicBool,
    pub(crate) enclosing: OnceLock<Option<TypeNodeRef>>,
    pub(crate) generic_params: OnceLock<Vec<TypeNodeRc>>,
    pub(crate) constraints: OnceLock<Vec<TypeNodeRc>>,
    pub(crate) interfaces: OnceLock<Vec<TypeNodeRc>>,
    pub(crate) supertypes: OnceLock<Arc<[TypeNodeRc]>>,
    pub(crate) fields: OnceLock<Vec<FieldRc>>,
    pub(crate) methods: OnceLock<Vec<MethodRc>>,
    pub(crate) properties: OnceLock<Vec<Property>>,
    pub(crate) events: OnceLock<Vec<Event>>,
    pub(crate) layout: OnceLock<FieldLayout>,
    pub(crate) statics: OnceLock<StaticLayout>,
    pub(crate) dispatch: OnceLock<Dispatch>,
    pub(crate) interface_id: OnceLock<u32>,
    pub(crate) failure: OnceLock<Arc<Diagnostic>>,
    pub(crate) instances: boxcar::Vec<TypeNodeRef>,
}

impl TypeNode {
    /// Create a shell node; nothing beyond its identity is computed
    #[must_use]
    pub fn new(
        handle: TypeHandle,
        module: ModuleId,
        namespace: &str,
        name: &str,
        flags: u32,
        kind: TypeKind,
    ) -> Self {
        let (generic_depth, is_open) = match &kind {
            TypeKind::Definition { generic_count, .. } => (0, *generic_count > 0),
            TypeKind::GenericInstance { args, .. } => (
                1 + args.iter().map(|arg| arg.generic_depth).max().unwrap_or(0),
                args.iter().any(|arg| arg.is_open),
            ),
            TypeKind::Array { element, .. } => (element.generic_depth, element.is_open),
            TypeKind::Pointer { pointee, .. } => (pointee.generic_depth, pointee.is_open),
            TypeKind::GenericParameter { .. } => (0, true),
        };

        TypeNode {
            handle,
            module,
            module_set: None,
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            kind,
            primitive: None,
            generic_depth,
            is_open,
            lifecycle: Lifecycle::new(),
            parent: RwLock::new(None),
            parent_defaulted: AtomicBool::new(false),
            enclosing: OnceLock::new(),
            generic_params: OnceLock::new(),
            constraints: OnceLock::new(),
            interfaces: OnceLock::new(),
            supertypes: OnceLock::new(),
            fields: OnceLock::new(),
            methods: OnceLock::new(),
            properties: OnceLock::new(),
            events: OnceLock::new(),
            layout: OnceLock::new(),
            statics: OnceLock::new(),
            dispatch: OnceLock::new(),
            interface_id: OnceLock::new(),
            failure: OnceLock::new(),
            instances: boxcar::Vec::new(),
        }
    }

    /// Published lifecycle flags
    #[must_use]
    pub fn lifecycle_flags(&self) -> LifecycleFlags {
        self.lifecycle.flags()
    }

    /// The `TypeDef` token of a definition or of the definition behind an instance
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match &self.kind {
            TypeKind::Definition { token, .. } => Some(*token),
            TypeKind::GenericInstance { definition, .. } => definition.token(),
            _ => None,
        }
    }

    /// Current parent
    ///
    /// `None` for rootless types, interfaces, and while the parent has not been resolved. The
    /// parent of a generic instance is only available once the loader computed it.
    #[must_use]
    pub fn parent(&self) -> Option<TypeNodeRc> {
        self.parent.read().ok().and_then(|parent| parent.clone())
    }

    /// Ordered ancestor chain from the root, ending with this type
    #[must_use]
    pub fn supertypes(&self) -> Option<&[TypeNodeRc]> {
        self.supertypes.get().map(|supertypes| &supertypes[..])
    }

    /// Length of the supertype chain
    #[must_use]
    pub fn depth(&self) -> Option<usize> {
        self.supertypes.get().map(|supertypes| supertypes.len())
    }

    /// Declared interfaces, once resolved
    #[must_use]
    pub fn interfaces(&self) -> Option<&[TypeNodeRc]> {
        self.interfaces.get().map(Vec::as_slice)
    }

    /// Field table, once read
    #[must_use]
    pub fn fields(&self) -> Option<&[FieldRc]> {
        self.fields.get().map(Vec::as_slice)
    }

    /// Method table, once read
    #[must_use]
    pub fn methods(&self) -> Option<&[MethodRc]> {
        self.methods.get().map(Vec::as_slice)
    }

    /// Properties, once read
    #[must_use]
    pub fn properties(&self) -> Option<&[Property]> {
        self.properties.get().map(Vec::as_slice)
    }

    /// Events, once read
    #[must_use]
    pub fn events(&self) -> Option<&[Event]> {
        self.events.get().map(Vec::as_slice)
    }

    /// Generic parameter nodes of a generic definition
    #[must_use]
    pub fn generic_params(&self) -> &[TypeNodeRc] {
        self.generic_params.get().map_or(&[], Vec::as_slice)
    }

    /// Instance layout, once computed
    #[must_use]
    pub fn layout(&self) -> Option<&FieldLayout> {
        self.layout.get()
    }

    /// Static layout, once computed
    #[must_use]
    pub fn static_layout(&self) -> Option<&StaticLayout> {
        self.statics.get()
    }

    /// Vtable, once computed
    #[must_use]
    pub fn vtable(&self) -> Option<&Vtable> {
        self.dispatch.get().map(|dispatch| &dispatch.vtable)
    }

    /// Interface table, once computed
    #[must_use]
    pub fn interface_table(&self) -> Option<&InterfaceTable> {
        self.dispatch.get().map(|dispatch| &dispatch.interfaces)
    }

    /// Default implementation conflicts found while building the vtable
    #[must_use]
    pub fn dim_conflicts(&self) -> &[DimConflict] {
        self.dispatch
            .get()
            .map_or(&[], |dispatch| dispatch.conflicts.as_slice())
    }

    /// Interface id, once assigned
    #[must_use]
    pub fn interface_id(&self) -> Option<u32> {
        self.interface_id.get().copied()
    }

    /// Stored failure
    #[must_use]
    pub fn failure(&self) -> Option<Arc<Diagnostic>> {
        self.failure.get().cloned()
    }

    /// `HAS_FAILURE` is set
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.lifecycle.has_failure()
    }

    /// Record a failure; the first recorded diagnostic wins and is returned
    pub fn fail(&self, diagnostic: Diagnostic) -> Arc<Diagnostic> {
        self.fail_first(diagnostic).0
    }

    /// Like [`TypeNode::fail`], also telling whether this call stored the diagnostic
    pub(crate) fn fail_first(&self, diagnostic: Diagnostic) -> (Arc<Diagnostic>, bool) {
        let fresh = Arc::new(diagnostic);
        let stored = self.failure.get_or_init(|| fresh.clone()).clone();
        self.lifecycle.mark_failed();
        let first = Arc::ptr_eq(&stored, &fresh);
        (stored, first)
    }

    /// The interface flag is set
    #[must_use]
    pub fn is_interface(&self) -> bool {
        !matches!(self.kind, TypeKind::GenericParameter { .. })
            && self.flags & TypeAttributes::INTERFACE != 0
    }

    /// The abstract flag is set
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        !matches!(self.kind, TypeKind::GenericParameter { .. })
            && self.flags & TypeAttributes::ABSTRACT != 0
    }

    /// Raw layout kind bits of `TypeAttributes`
    #[must_use]
    pub fn layout_kind(&self) -> u32 {
        self.flags & TypeAttributes::LAYOUT_MASK
    }

    /// Instances are values rather than references
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        if let Some(primitive) = self.primitive {
            return primitive.is_value_type();
        }
        match &self.kind {
            TypeKind::Definition { .. } => self.parent().is_some_and(|parent| {
                matches!(
                    parent.primitive,
                    Some(PrimitiveKind::ValueType | PrimitiveKind::Enum)
                )
            }),
            TypeKind::GenericInstance { definition, .. } => definition.is_value_type(),
            TypeKind::Array { .. } | TypeKind::Pointer { .. } => false,
            TypeKind::GenericParameter { .. } => {
                self.flags & GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT != 0
            }
        }
    }

    /// Derives from `System.Enum`
    #[must_use]
    pub fn is_enum(&self) -> bool {
        match &self.kind {
            TypeKind::GenericInstance { definition, .. } => definition.is_enum(),
            TypeKind::Definition { .. } if self.primitive.is_none() => self
                .parent()
                .is_some_and(|parent| parent.primitive == Some(PrimitiveKind::Enum)),
            _ => false,
        }
    }

    /// Managed or unmanaged pointer
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer { .. })
    }

    /// A managed pointer (`T&`)
    #[must_use]
    pub fn is_byref(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer { managed: true, .. })
    }

    /// A generic parameter
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self.kind, TypeKind::GenericParameter { .. })
    }

    /// An open generic definition
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        matches!(self.kind, TypeKind::Definition { generic_count, .. } if generic_count > 0)
    }

    /// A generic instance
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        matches!(self.kind, TypeKind::GenericInstance { .. })
    }

    /// Definition behind a generic instance
    #[must_use]
    pub fn generic_definition(&self) -> Option<&TypeNodeRc> {
        match &self.kind {
            TypeKind::GenericInstance { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Type arguments of a generic instance
    #[must_use]
    pub fn generic_args(&self) -> &[TypeNodeRc] {
        match &self.kind {
            TypeKind::GenericInstance { args, .. } => args,
            _ => &[],
        }
    }

    /// Element type of an array, or target of a pointer
    #[must_use]
    pub fn element_type(&self) -> Option<&TypeNodeRc> {
        match &self.kind {
            TypeKind::Array { element, .. } => Some(element),
            TypeKind::Pointer { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    /// Enclosing type of a nested type, once resolved
    #[must_use]
    pub fn enclosing(&self) -> Option<TypeNodeRc> {
        self.enclosing
            .get()
            .and_then(|enclosing| enclosing.as_ref())
            .and_then(TypeNodeRef::upgrade)
    }

    /// Display name including namespace, nesting, type arguments and array or pointer suffixes
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.kind {
            TypeKind::Definition { .. } => {
                if let Some(enclosing) = self.enclosing() {
                    format!("{}/{}", enclosing.full_name(), self.name)
                } else if self.namespace.is_empty() {
                    self.name.clone()
                } else {
                    format!("{}.{}", self.namespace, self.name)
                }
            }
            TypeKind::GenericInstance { definition, args } => {
                let args: Vec<String> = args.iter().map(|arg| arg.full_name()).collect();
                format!("{}<{}>", definition.full_name(), args.join(","))
            }
            TypeKind::Array {
                element,
                rank,
                bounded,
            } => {
                if *bounded {
                    format!(
                        "{}[{}]",
                        element.full_name(),
                        ",".repeat(rank.saturating_sub(1) as usize)
                    )
                } else {
                    format!("{}[]", element.full_name())
                }
            }
            TypeKind::Pointer { pointee, managed } => {
                format!("{}{}", pointee.full_name(), if *managed { "&" } else { "*" })
            }
            TypeKind::GenericParameter { .. } => self.name.clone(),
        }
    }
}

impl fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeNode")
            .field("handle", &self.handle)
            .field("name", &self.full_name())
            .field("flags", &self.lifecycle_flags())
            .finish()
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
