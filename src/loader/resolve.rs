//! Token and signature resolution, definition shells, parents and declared interfaces.
//!
//! Definitions are created as shells the first time a token resolves to them. The shell is
//! inserted into its module's type map before its parent is resolved, so a type that refers back
//! to itself while resolving its parent finds the shell instead of recursing. Such partial nodes
//! may be handed out to the code that builds them, never to other threads: those wait for the
//! parent stage to be committed or resolve it themselves.

use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::{
    loader::{sync::ConstructionFrame, GenericContext, Progress, TypeLoader},
    metadata::{
        flags::{GenericParamAttributes, TypeAttributes},
        signature::TypeSignature,
        token::{TableId, Token},
    },
    typesystem::{
        ModuleId, ModuleRc, PrimitiveKind, Stage, TypeKind, TypeNode, TypeNodeRc, TypeNodeRef,
    },
    Error, Result,
};

impl TypeLoader {
    /// Resolve a `TypeDef`, `TypeRef`, `TypeSpec` or primitive token of a module
    ///
    /// The returned node has its parent resolved; everything else is computed on demand.
    ///
    /// ## Arguments
    /// * 'module' - The module the token belongs to
    /// * 'token'  - The token to resolve
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] for unknown modules and unresolvable `TypeRef`
    /// scopes, [`crate::Error::Malformed`] for bad tokens, and [`crate::Error::TypeLoad`] if the
    /// type failed to load
    pub fn resolve(&self, module: ModuleId, token: Token) -> Result<TypeNodeRc> {
        let module = self.require_module(module)?;
        let node = self.resolve_token(&module, token, &[])?;
        match node.failure() {
            Some(failure) => Err(Error::TypeLoad(failure)),
            None => Ok(node),
        }
    }

    /// Resolve a top-level type of a module by its full name
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] for unknown modules and the errors of
    /// [`TypeLoader::resolve`]
    pub fn resolve_by_name(
        &self,
        module: ModuleId,
        namespace: &str,
        name: &str,
    ) -> Result<TypeNodeRc> {
        let reader = self.require_module(module)?.reader.clone();
        let token = reader
            .lookup_type(namespace, name)
            .ok_or_else(|| malformed_error!("Module {} has no type {}.{}", module, namespace, name))?;
        self.resolve(module, token)
    }

    /// Resolve a signature in the context of a module
    ///
    /// `GenericParamType` positions are resolved against the parameters of the type definition the
    /// signature belongs to, if any.
    ///
    /// # Errors
    /// Same as [`TypeLoader::resolve`]
    pub fn resolve_signature(
        &self,
        module: ModuleId,
        signature: &TypeSignature,
        context: Option<&TypeNodeRc>,
    ) -> Result<TypeNodeRc> {
        let module = self.require_module(module)?;
        let params = context.map_or(&[][..], |context| context.generic_params());
        let node = self.resolve_sig(&module, signature, params)?;
        match node.failure() {
            Some(failure) => Err(Error::TypeLoad(failure)),
            None => Ok(node),
        }
    }

    /// Resolve a token, returning failed nodes instead of an error
    pub(crate) fn resolve_token(
        &self,
        module: &ModuleRc,
        token: Token,
        params: &[TypeNodeRc],
    ) -> Result<TypeNodeRc> {
        match token.table() {
            TableId::PRIMITIVE => PrimitiveKind::from_token(token)
                .map(|kind| self.registry.primitive(kind))
                .ok_or(Error::TypeNotFound(token)),
            TableId::TYPE_DEF => self.definition(module, token),
            TableId::TYPE_REF => self.resolve_type_ref(module, token),
            TableId::TYPE_SPEC => {
                let signature = module.reader.read_type_spec(token)?;
                self.resolve_sig(module, &signature, params)
            }
            _ => Err(malformed_error!("Token {} does not name a type", token)),
        }
    }

    /// Resolve a signature, returning failed nodes instead of an error
    pub(crate) fn resolve_sig(
        &self,
        module: &ModuleRc,
        signature: &TypeSignature,
        params: &[TypeNodeRc],
    ) -> Result<TypeNodeRc> {
        if let Some(kind) = signature.primitive() {
            return Ok(self.registry.primitive(kind));
        }

        match signature {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                self.resolve_token(module, *token, params)
            }
            TypeSignature::GenericParamType(index) => params
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| malformed_error!("Generic parameter !{} is out of range", index)),
            TypeSignature::GenericParamMethod(index) => Ok(self.registry.method_param(*index)),
            TypeSignature::GenericInst(base, args) => {
                let definition = self.resolve_sig(module, base, params)?;
                let args = args
                    .iter()
                    .map(|arg| self.resolve_sig(module, arg, params))
                    .collect::<Result<Vec<_>>>()?;
                self.instantiate_node(&definition, &args)
            }
            TypeSignature::SzArray(element) => {
                let element = self.resolve_sig(module, element, params)?;
                self.array_of(&element, 1, false)
            }
            TypeSignature::Array { element, rank } => {
                let element = self.resolve_sig(module, element, params)?;
                self.array_of(&element, *rank, true)
            }
            TypeSignature::Ptr(target) => {
                let target = self.resolve_sig(module, target, params)?;
                self.pointer_to(&target, false)
            }
            TypeSignature::ByRef(target) => {
                let target = self.resolve_sig(module, target, params)?;
                self.pointer_to(&target, true)
            }
            other => Err(malformed_error!("Unexpected signature element {:?}", other)),
        }
    }

    fn resolve_type_ref(&self, module: &ModuleRc, token: Token) -> Result<TypeNodeRc> {
        let row = module.reader.read_type_ref(token)?;
        if let Some(target) = self.registry.module_by_name(&row.scope) {
            let definition = target
                .reader
                .lookup_type(&row.namespace, &row.name)
                .ok_or(Error::TypeNotFound(token))?;
            return self.definition(&target, definition);
        }

        // References to the core library resolve to the built-ins when no module provides it
        if row.namespace == "System" {
            if let Some(kind) =
                PrimitiveKind::iter().find(|kind| kind.name().1 == row.name.as_str())
            {
                return Ok(self.registry.primitive(kind));
            }
        }
        Err(Error::ModuleNotFound(row.scope))
    }

    /// The node of a `TypeDef` token, created on first use
    fn definition(&self, module: &ModuleRc, token: Token) -> Result<TypeNodeRc> {
        if let Some(existing) = module.get(token) {
            self.settle_parent(&existing)?;
            return Ok(existing);
        }
        self.create_definition(module, token)
    }

    fn create_definition(&self, module: &ModuleRc, token: Token) -> Result<TypeNodeRc> {
        let row = module.reader.read_type_row(token)?;
        let params = module.reader.read_generic_params(token)?;

        let node = {
            let _guard = self.lock.enter()?;
            match module.get(token) {
                Some(existing) => existing,
                None => {
                    let node = self.registry.insert(TypeNode::new(
                        self.registry.allocate_handle(),
                        module.id,
                        &row.namespace,
                        &row.name,
                        row.flags,
                        TypeKind::Definition {
                            token,
                            generic_count: params.len(),
                        },
                    ));

                    let param_nodes = params
                        .iter()
                        .map(|param| {
                            self.registry.insert(TypeNode::new(
                                self.registry.allocate_handle(),
                                module.id,
                                "",
                                &param.name,
                                param.flags,
                                TypeKind::GenericParameter {
                                    owner: Some(TypeNodeRef::new(&node)),
                                    index: u32::from(param.number),
                                    constraints: param.constraints.clone(),
                                },
                            ))
                        })
                        .collect();
                    let _ = node.generic_params.set(param_nodes);

                    module.types.insert(token, node.clone());
                    self.stats.definition_created();
                    node
                }
            }
        };

        self.enclosing_type(&node)?;
        self.settle_parent(&node)?;
        Ok(node)
    }

    /// Make sure the parent of `node` is resolved, recording rather than returning type failures
    fn settle_parent(&self, node: &TypeNodeRc) -> Result<()> {
        match self.ensure_stage(node, Stage::Parent, Self::build_parent) {
            Ok(_) | Err(Error::TypeLoad(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    pub(crate) fn build_parent(&self, node: &TypeNodeRc) -> Result<()> {
        let parent = match &node.kind {
            TypeKind::Definition { .. } => {
                if node.is_generic_definition() {
                    self.begin_recording()?;
                    let result = self.definition_parent(node);
                    let outcome = match result {
                        Ok(parent) => {
                            *write_lock!(node.parent) = parent;
                            Ok(())
                        }
                        Err(error) => Err(Error::TypeLoad(self.fail_with(node, error)?)),
                    };
                    // The parent must be visible before deferred instances inflate it
                    self.end_recording(node)?;
                    return outcome;
                }
                self.definition_parent(node)?
            }
            TypeKind::GenericInstance { definition, args } => {
                return self.instance_parent(node, definition, args);
            }
            TypeKind::Array { .. } => Some(self.registry.primitive(PrimitiveKind::Array)),
            TypeKind::Pointer { .. } => None,
            TypeKind::GenericParameter { .. } => {
                if node.flags & GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT != 0 {
                    Some(self.registry.primitive(PrimitiveKind::ValueType))
                } else {
                    Some(self.registry.primitive(PrimitiveKind::Object))
                }
            }
        };

        *write_lock!(node.parent) = parent;
        Ok(())
    }

    /// Resolve and validate the declared parent of a definition
    fn definition_parent(&self, node: &TypeNodeRc) -> Result<Option<TypeNodeRc>> {
        let Some(token) = node.token() else {
            return Ok(None);
        };
        let module = self.require_module(node.module)?;
        let row = module.reader.read_type_row(token)?;

        if node.is_interface() {
            return Ok(None);
        }
        if row.parent_token.is_null() {
            return Ok(None);
        }

        let parent = self.resolve_token(&module, row.parent_token, node.generic_params())?;

        let self_instance = parent
            .generic_definition()
            .is_some_and(|definition| Arc::ptr_eq(definition, node));
        if Arc::ptr_eq(&parent, node)
            || self_instance
            || ConstructionFrame::is_active(self.id, parent.handle, Stage::Parent)
        {
            return Err(violation!(
                CyclicDefinition,
                "{} derives from itself through {}",
                node.full_name(),
                parent.full_name()
            ));
        }
        if let Some(failure) = parent.failure() {
            return Err(Error::TypeLoad(failure));
        }
        if parent.is_interface() {
            return Err(malformed_error!(
                "{} derives from interface {}",
                node.full_name(),
                parent.full_name()
            ));
        }
        if parent.is_generic_parameter() || parent.is_pointer() {
            return Err(malformed_error!(
                "{} derives from {}",
                node.full_name(),
                parent.full_name()
            ));
        }
        if parent.flags & TypeAttributes::SEALED != 0 {
            return Err(malformed_error!(
                "{} derives from sealed type {}",
                node.full_name(),
                parent.full_name()
            ));
        }

        if parent.is_generic_instance() {
            self.settle_instance_chain(&parent)?;
        }
        Ok(Some(parent))
    }

    /// Resolve the parents of a chain of generic instances up to the first non-instance
    fn settle_instance_chain(&self, start: &TypeNodeRc) -> Result<()> {
        let mut cursor = start.clone();
        for _ in 0..self.config.max_generic_depth {
            if self.ensure_stage(&cursor, Stage::Parent, Self::build_parent)? == Progress::InProgress
            {
                break;
            }
            match cursor.parent() {
                Some(next) if next.is_generic_instance() => cursor = next,
                _ => break,
            }
        }
        Ok(())
    }

    /// Parent of a generic instance, inflated from its definition
    ///
    /// While the definition is still resolving its own parent on this thread, the instance gets
    /// `System.Object` and is recorded; the definition fixes it up once its parent is known.
    fn instance_parent(
        &self,
        node: &TypeNodeRc,
        definition: &TypeNodeRc,
        args: &[TypeNodeRc],
    ) -> Result<()> {
        match self.ensure_stage(definition, Stage::Parent, Self::build_parent)? {
            Progress::InProgress => {
                *write_lock!(node.parent) = Some(self.registry.primitive(PrimitiveKind::Object));
                node.parent_defaulted
                    .store(true, std::sync::atomic::Ordering::Release);
                self.record_instance(node)
            }
            Progress::Done => {
                let parent = match definition.parent() {
                    Some(parent) => Some(self.inflate(&parent, &GenericContext::new(definition, args))?),
                    None => None,
                };
                *write_lock!(node.parent) = parent;
                node.parent_defaulted
                    .store(false, std::sync::atomic::Ordering::Release);
                Ok(())
            }
        }
    }

    pub(crate) fn build_interfaces(&self, node: &TypeNodeRc) -> Result<()> {
        let interfaces = match &node.kind {
            TypeKind::Definition { token, .. } if node.primitive.is_none() => {
                let module = self.require_module(node.module)?;
                let mut interfaces = Vec::new();
                for declared in module.reader.read_interface_impl_list(*token)? {
                    let interface = self.resolve_token(&module, declared, node.generic_params())?;
                    if let Some(failure) = interface.failure() {
                        return Err(Error::TypeLoad(failure));
                    }
                    if !interface.is_interface() {
                        return Err(malformed_error!(
                            "{} implements {}, which is not an interface",
                            node.full_name(),
                            interface.full_name()
                        ));
                    }
                    if Arc::ptr_eq(&interface, node)
                        || interface
                            .generic_definition()
                            .is_some_and(|definition| Arc::ptr_eq(definition, node))
                    {
                        return Err(violation!(
                            CyclicDefinition,
                            "{} implements itself",
                            node.full_name()
                        ));
                    }
                    if !interfaces.iter().any(|seen| Arc::ptr_eq(seen, &interface)) {
                        interfaces.push(interface);
                    }
                }
                interfaces
            }
            TypeKind::GenericInstance { definition, args } => {
                let context = GenericContext::new(definition, args);
                let mut interfaces = Vec::new();
                for interface in self.require_interfaces(definition)? {
                    let inflated = self.inflate(interface, &context)?;
                    if let Some(failure) = inflated.failure() {
                        return Err(Error::TypeLoad(failure));
                    }
                    if !interfaces.iter().any(|seen| Arc::ptr_eq(seen, &inflated)) {
                        interfaces.push(inflated);
                    }
                }
                interfaces
            }
            _ => Vec::new(),
        };

        let _ = node.interfaces.set(interfaces);
        Ok(())
    }

    /// Declared interfaces, treating re-entry as a cycle
    pub(crate) fn require_interfaces<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [TypeNodeRc]> {
        match self.ensure_stage(node, Stage::Interfaces, Self::build_interfaces)? {
            Progress::Done => Ok(node.interfaces().unwrap_or(&[])),
            Progress::InProgress => Err(violation!(
                CyclicDefinition,
                "interfaces of {} depend on themselves",
                node.full_name()
            )),
        }
    }

    /// The enclosing type of a nested definition
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for bad metadata and the errors of
    /// [`TypeLoader::resolve`]
    pub fn enclosing_type(&self, node: &TypeNodeRc) -> Result<Option<TypeNodeRc>> {
        if let Some(enclosing) = node.enclosing.get() {
            return Ok(enclosing.as_ref().and_then(TypeNodeRef::upgrade));
        }

        let enclosing = match &node.kind {
            TypeKind::Definition { token, .. } if node.primitive.is_none() => {
                let module = self.require_module(node.module)?;
                match module.reader.read_enclosing_type(*token)? {
                    Some(outer) => Some(self.resolve_token(&module, outer, &[])?),
                    None => None,
                }
            }
            TypeKind::GenericInstance { definition, .. } => self.enclosing_type(definition)?,
            _ => None,
        };

        let stored = node
            .enclosing
            .get_or_init(|| enclosing.as_ref().map(TypeNodeRef::new));
        Ok(stored.as_ref().and_then(TypeNodeRef::upgrade))
    }

    /// The array type over `element`
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if a cache lock is poisoned
    pub fn array_of(&self, element: &TypeNodeRc, rank: u32, bounded: bool) -> Result<TypeNodeRc> {
        let key = (element.handle, rank, bounded);
        let create = || {
            let mut node = TypeNode::new(
                self.registry.allocate_handle(),
                element.module,
                "",
                &element.name,
                TypeAttributes::PUBLIC | TypeAttributes::SEALED,
                TypeKind::Array {
                    element: element.clone(),
                    rank,
                    bounded,
                },
            );
            node.module_set = element.module_set;
            self.registry.insert(node)
        };

        if let Some(set) = element.module_set.and_then(|set| self.registry.module_set_by_id(set)) {
            let mut arrays = lock!(set.arrays);
            return Ok(arrays.entry(key).or_insert_with(create).clone());
        }
        match self.registry.module(element.module) {
            Some(module) if element.module != ModuleId::CORE => {
                let mut arrays = lock!(module.arrays);
                Ok(arrays.entry(key).or_insert_with(create).clone())
            }
            _ => {
                let mut arrays = lock!(self.core_arrays);
                Ok(arrays.entry(key).or_insert_with(create).clone())
            }
        }
    }

    /// The managed (`T&`) or unmanaged (`T*`) pointer type over `target`
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if a cache lock is poisoned
    pub fn pointer_to(&self, target: &TypeNodeRc, managed: bool) -> Result<TypeNodeRc> {
        let key = (target.handle, managed);
        let create = || {
            let mut node = TypeNode::new(
                self.registry.allocate_handle(),
                target.module,
                "",
                &target.name,
                TypeAttributes::PUBLIC | TypeAttributes::SEALED,
                TypeKind::Pointer {
                    pointee: target.clone(),
                    managed,
                },
            );
            node.module_set = target.module_set;
            self.registry.insert(node)
        };

        if let Some(set) = target.module_set.and_then(|set| self.registry.module_set_by_id(set)) {
            let mut pointers = lock!(set.pointers);
            return Ok(pointers.entry(key).or_insert_with(create).clone());
        }
        match self.registry.module(target.module) {
            Some(module) if target.module != ModuleId::CORE => {
                let mut pointers = lock!(module.pointers);
                Ok(pointers.entry(key).or_insert_with(create).clone())
            }
            _ => {
                let mut pointers = lock!(self.core_pointers);
                Ok(pointers.entry(key).or_insert_with(create).clone())
            }
        }
    }
}
