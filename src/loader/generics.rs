//! Generic instantiation.
//!
//! Instances are interned per [`crate::typesystem::ModuleSet`]: the set of non-core modules that
//! the definition and the arguments come from. Equal definitions and arguments always give the
//! same node, and the instance disappears with the first of those modules to unload.
//!
//! # Incomplete instances
//!
//! A generic definition may mention its own instances while its parent is still being resolved,
//! e.g. through an ancestor chain that refers back to it. Such an instance cannot inflate the
//! definition's parent yet. It is given `System.Object` and recorded; when the definition's parent
//! resolution ends, every recorded instance of it gets its real parent, or fails with the
//! definition.

use std::sync::{atomic::Ordering, Arc};

use crate::{
    loader::{GenericContext, TypeLoader},
    metadata::flags::{GenericParamAttributes, MethodAttributes},
    typesystem::{
        Diagnostic, FailureKind, GenericInstantiationKey, ModuleId, ModuleSetId, PrimitiveKind,
        TypeKind, TypeNode, TypeNodeRc, TypeNodeRef,
    },
    Error, Result,
};

/// Instances created while their definition was resolving its parent
#[derive(Default)]
pub(crate) struct Recording {
    active: usize,
    recorded: Vec<TypeNodeRc>,
}

impl TypeLoader {
    /// The instance of a generic definition for the given arguments
    ///
    /// ## Arguments
    /// * 'definition' - An open generic type definition
    /// * 'args'       - One argument per generic parameter
    ///
    /// # Errors
    /// Returns [`crate::Error::GenericArity`] if `definition` is not generic or the number of
    /// arguments is wrong, and [`crate::Error::TypeLoad`] if the instance is invalid
    pub fn instantiate(&self, definition: &TypeNodeRc, args: &[TypeNodeRc]) -> Result<TypeNodeRc> {
        let instance = self.instantiate_node(definition, args)?;
        match instance.failure() {
            Some(failure) => Err(Error::TypeLoad(failure)),
            None => Ok(instance),
        }
    }

    /// Live instances created from a definition so far
    #[must_use]
    pub fn instances_of(&self, definition: &TypeNodeRc) -> Vec<TypeNodeRc> {
        definition
            .instances
            .iter()
            .filter_map(|(_, instance)| instance.upgrade())
            .collect()
    }

    /// Intern an instance, returning failed instances instead of an error
    pub(crate) fn instantiate_node(
        &self,
        definition: &TypeNodeRc,
        args: &[TypeNodeRc],
    ) -> Result<TypeNodeRc> {
        let expected = match &definition.kind {
            TypeKind::Definition { generic_count, .. } => *generic_count,
            _ => 0,
        };
        if expected == 0 || expected != args.len() {
            return Err(Error::GenericArity {
                definition: definition.full_name(),
                expected,
                actual: args.len(),
            });
        }

        let mut modules = Vec::new();
        owner_modules(definition, &mut modules);
        for arg in args {
            owner_modules(arg, &mut modules);
        }
        let set = self.registry.module_set(modules);

        let key = GenericInstantiationKey {
            definition: definition.handle,
            args: args.iter().map(|arg| arg.handle).collect(),
            module_set: set.id,
        };
        if let Some(existing) = set.instances.get(&key) {
            return Ok(existing.clone());
        }

        let instance = set
            .instances
            .entry(key)
            .or_insert_with(|| self.create_instance(definition, args, set.id))
            .clone();
        Ok(instance)
    }

    fn create_instance(
        &self,
        definition: &TypeNodeRc,
        args: &[TypeNodeRc],
        set: ModuleSetId,
    ) -> TypeNodeRc {
        let mut node = TypeNode::new(
            self.registry.allocate_handle(),
            definition.module,
            &definition.namespace,
            &definition.name,
            definition.flags,
            TypeKind::GenericInstance {
                definition: definition.clone(),
                args: args.to_vec(),
            },
        );
        node.module_set = Some(set);
        let instance = self.registry.insert(node);
        definition.instances.push(TypeNodeRef::new(&instance));
        self.stats.instance_created();

        let name = instance.full_name();
        log::debug!("instantiated {}", name);
        if let Some(invalid) = args.iter().find(|arg| {
            arg.is_pointer() || arg.primitive == Some(PrimitiveKind::Void)
        }) {
            self.record_failure(
                &instance,
                Diagnostic::new(
                    FailureKind::GenericArgumentInvalid,
                    name,
                    format!("{} cannot be a type argument", invalid.full_name()),
                ),
            );
        } else if instance.generic_depth > self.config.max_generic_depth {
            self.record_failure(
                &instance,
                Diagnostic::new(
                    FailureKind::CyclicDefinition,
                    name,
                    format!(
                        "generic arguments nest deeper than {}",
                        self.config.max_generic_depth
                    ),
                ),
            );
        } else if let Some(failure) = std::iter::once(definition)
            .chain(args)
            .find_map(|node| node.failure())
        {
            self.record_failure(
                &instance,
                Diagnostic::new(
                    FailureKind::DependencyFailed,
                    name,
                    format!("depends on {}", failure.type_name),
                )
                .caused_by(failure),
            );
        }
        instance
    }

    pub(crate) fn begin_recording(&self) -> Result<()> {
        let mut recording = lock!(self.recording);
        recording.active += 1;
        Ok(())
    }

    pub(crate) fn record_instance(&self, instance: &TypeNodeRc) -> Result<()> {
        let mut recording = lock!(self.recording);
        if recording.active == 0 {
            return Err(malformed_error!(
                "{} was deferred outside of a parent resolution",
                instance.full_name()
            ));
        }
        recording.recorded.push(instance.clone());
        Ok(())
    }

    /// Close a recording window of `definition` and fix up its recorded instances
    ///
    /// Instances of other definitions stay recorded for the windows still open, on this thread
    /// or on others.
    pub(crate) fn end_recording(&self, definition: &TypeNodeRc) -> Result<()> {
        let pending: Vec<TypeNodeRc> = {
            let mut recording = lock!(self.recording);
            recording.active = recording.active.saturating_sub(1);
            let recorded = std::mem::take(&mut recording.recorded);
            let (mine, others): (Vec<_>, Vec<_>) = recorded.into_iter().partition(|instance| {
                instance
                    .generic_definition()
                    .is_some_and(|owner| Arc::ptr_eq(owner, definition))
            });
            recording.recorded = others;
            mine
        };

        for instance in pending {
            if let Some(failure) = definition.failure() {
                self.record_failure(
                    &instance,
                    Diagnostic::new(
                        FailureKind::DependencyFailed,
                        instance.full_name(),
                        "generic definition failed while the instance was created",
                    )
                    .caused_by(failure),
                );
            } else {
                let parent = match definition.parent() {
                    Some(parent) => {
                        let context = GenericContext::new(definition, instance.generic_args());
                        Some(self.inflate(&parent, &context)?)
                    }
                    None => None,
                };
                log::trace!(
                    "fixed up parent of {} to {}",
                    instance.full_name(),
                    parent.as_ref().map_or_else(|| "none".to_string(), |p| p.full_name())
                );
                *write_lock!(instance.parent) = parent;
            }
            instance.parent_defaulted.store(false, Ordering::Release);
        }
        Ok(())
    }

    /// Constraints of a generic parameter, resolved in the context of its owner
    pub(crate) fn param_constraints<'n>(&self, param: &'n TypeNodeRc) -> Result<&'n [TypeNodeRc]> {
        if let Some(constraints) = param.constraints.get() {
            return Ok(constraints);
        }

        let resolved = match &param.kind {
            TypeKind::GenericParameter {
                owner: Some(owner),
                constraints,
                ..
            } => match owner.upgrade() {
                Some(owner) => {
                    let module = self.require_module(owner.module)?;
                    constraints
                        .iter()
                        .map(|token| self.resolve_token(&module, *token, owner.generic_params()))
                        .collect::<Result<Vec<_>>>()?
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(param.constraints.get_or_init(|| resolved))
    }

    /// Check every argument of a closed instance against its parameter's constraints
    pub(crate) fn check_constraints(&self, instance: &TypeNodeRc) -> Result<()> {
        let Some(context) = GenericContext::of(instance) else {
            return Ok(());
        };

        for (param, arg) in context.definition.generic_params().iter().zip(context.args) {
            let flags = param.flags;
            let invalid = |reason: &str| {
                violation!(
                    GenericArgumentInvalid,
                    "{} violates the {} constraint of {}",
                    arg.full_name(),
                    reason,
                    param.name
                )
            };

            if flags & GenericParamAttributes::REFERENCE_TYPE_CONSTRAINT != 0 && arg.is_value_type() {
                return Err(invalid("class"));
            }
            if flags & GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT != 0
                && !arg.is_value_type()
            {
                return Err(invalid("struct"));
            }
            if flags & GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT != 0
                && !self.has_default_constructor(arg)?
            {
                return Err(invalid("new()"));
            }

            for constraint in self.param_constraints(param)? {
                let target = self.inflate(constraint, &context)?;
                if !self.is_assignable_from(&target, arg)? {
                    return Err(invalid(&target.full_name()));
                }
            }
        }
        Ok(())
    }

    fn has_default_constructor(&self, ty: &TypeNodeRc) -> Result<bool> {
        if ty.is_value_type() || ty.primitive == Some(PrimitiveKind::Object) {
            return Ok(true);
        }
        if ty.is_abstract() || ty.is_interface() || ty.primitive.is_some() {
            return Ok(false);
        }
        if ty.is_generic_parameter() {
            return Ok(ty.flags & GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT != 0);
        }
        Ok(self.require_methods(ty)?.iter().any(|method| {
            method.name == ".ctor"
                && method.signature.params.is_empty()
                && !method.flags.contains(MethodAttributes::STATIC)
                && method.flags.is_public()
        }))
    }
}

/// Non-core modules a type mentions
fn owner_modules(node: &TypeNode, out: &mut Vec<ModuleId>) {
    match &node.kind {
        TypeKind::GenericInstance { definition, args } => {
            owner_modules(definition, out);
            for arg in args {
                owner_modules(arg, out);
            }
        }
        TypeKind::Array { element, .. } => owner_modules(element, out),
        TypeKind::Pointer { pointee, .. } => owner_modules(pointee, out),
        TypeKind::Definition { .. } | TypeKind::GenericParameter { .. } => {
            if node.module != ModuleId::CORE && !out.contains(&node.module) {
                out.push(node.module);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{builder::MetadataBuilder, signature::TypeSignature},
        test::*,
    };

    #[test]
    fn test_instances_are_interned() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let list = loader.resolve(module, tokens.list).unwrap();
        let int = loader.primitive(PrimitiveKind::I4);
        let string = loader.primitive(PrimitiveKind::String);

        let a = loader.instantiate(&list, &[int.clone()]).unwrap();
        let b = loader.instantiate(&list, &[int]).unwrap();
        let c = loader.instantiate(&list, &[string]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(loader.instances_of(&list).len(), 2);
        assert_eq!(loader.stats().instances_created, 2);
    }

    #[test]
    fn test_arity_is_checked() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let list = loader.resolve(module, tokens.list).unwrap();
        let int = loader.primitive(PrimitiveKind::I4);
        assert!(matches!(
            loader.instantiate(&list, &[int.clone(), int.clone()]),
            Err(Error::GenericArity {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert!(matches!(
            loader.instantiate(&int, &[int.clone()]),
            Err(Error::GenericArity { expected: 0, .. })
        ));
    }

    #[test]
    fn test_pointer_argument_is_invalid() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let list = loader.resolve(module, tokens.list).unwrap();
        let int = loader.primitive(PrimitiveKind::I4);
        let pointer = loader.pointer_to(&int, false).unwrap();

        let Err(Error::TypeLoad(diagnostic)) = loader.instantiate(&list, &[pointer]) else {
            panic!("pointer arguments must be rejected");
        };
        assert_eq!(diagnostic.kind, FailureKind::GenericArgumentInvalid);
    }

    #[test]
    fn test_instance_parent_is_inflated() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let sorted = loader.resolve(module, tokens.sorted_list).unwrap();
        let list = loader.resolve(module, tokens.list).unwrap();
        let int = loader.primitive(PrimitiveKind::I4);

        let sorted_int = loader.instantiate(&sorted, &[int.clone()]).unwrap();
        let parent = loader.ensure_parent(&sorted_int).unwrap().unwrap();
        let list_int = loader.instantiate(&list, &[int]).unwrap();
        assert!(Arc::ptr_eq(&parent, &list_int));
    }

    #[test]
    fn test_instances_span_module_sets() {
        let mut lib = MetadataBuilder::new("Lib");
        let list = lib.class("Lib", "List`1").generic_param("T").build();
        let mut app = MetadataBuilder::new("App");
        let item = app.class("App", "Item").build();

        let loader = TypeLoader::new();
        let lib = loader.register_module("Lib", lib.build()).unwrap();
        let app = loader.register_module("App", app.build()).unwrap();
        let list = loader.resolve(lib, list).unwrap();
        let item = loader.resolve(app, item).unwrap();

        let list_item = loader.instantiate(&list, &[item]).unwrap();
        let list_int = loader
            .instantiate(&list, &[loader.primitive(PrimitiveKind::I4)])
            .unwrap();
        assert_ne!(list_item.module_set, list_int.module_set);

        loader.unload_module(app).unwrap();
        assert!(loader.registry().get(list_item.handle).is_none());
        assert!(loader.registry().get(list_int.handle).is_some());
    }

    #[test]
    fn test_deferred_instance_parent_is_fixed_up() {
        // A<T> : B<T>, B<U> : A<int>
        let mut md = MetadataBuilder::new("App");
        let a = md.class("App", "A`1").generic_param("T").build();
        let b = md.class("App", "B`1").generic_param("U").build();
        let b_of_t = md.type_spec(TypeSignature::generic_class(
            b,
            vec![TypeSignature::GenericParamType(0)],
        ));
        let a_of_int = md.type_spec(TypeSignature::generic_class(a, vec![TypeSignature::I4]));
        md.set_extends(a, b_of_t);
        md.set_extends(b, a_of_int);

        let loader = TypeLoader::new();
        let module = loader.register_module("App", md.build()).unwrap();
        let a = loader.resolve(module, a).unwrap();
        let b = loader.resolve(module, b).unwrap();
        let int = loader.primitive(PrimitiveKind::I4);

        let a_int = loader.instantiate_node(&a, &[int.clone()]).unwrap();
        let b_int = loader.instantiate_node(&b, &[int]).unwrap();
        assert!(!a_int.parent_defaulted.load(Ordering::Acquire));
        assert!(Arc::ptr_eq(&a_int.parent().unwrap(), &b_int));

        let Err(Error::TypeLoad(diagnostic)) = loader.init(&a) else {
            panic!("the instance chain is cyclic");
        };
        assert_eq!(diagnostic.root_cause().kind, FailureKind::CyclicDefinition);
    }

    #[test]
    fn test_deferred_parent_is_fixed_before_other_threads_see_it() {
        // A<T> : B<T>, B<U> : A<int>
        let mut md = MetadataBuilder::new("App");
        let a = md.class("App", "A`1").generic_param("T").build();
        let b = md.class("App", "B`1").generic_param("U").build();
        let b_of_t = md.type_spec(TypeSignature::generic_class(
            b,
            vec![TypeSignature::GenericParamType(0)],
        ));
        let a_of_int = md.type_spec(TypeSignature::generic_class(a, vec![TypeSignature::I4]));
        md.set_extends(a, b_of_t);
        md.set_extends(b, a_of_int);

        let loader = TypeLoader::new();
        let module = loader.register_module("App", md.build()).unwrap();
        let parents: Vec<Option<TypeNodeRc>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let a = loader.resolve(module, a).unwrap();
                        let int = loader.primitive(PrimitiveKind::I4);
                        let a_int = loader.instantiate_node(&a, &[int]).unwrap();
                        assert!(!a_int.parent_defaulted.load(Ordering::Acquire));
                        a_int.parent()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let b = loader.resolve(module, b).unwrap();
        let b_int = loader
            .instantiate_node(&b, &[loader.primitive(PrimitiveKind::I4)])
            .unwrap();
        for parent in parents {
            assert!(Arc::ptr_eq(&parent.unwrap(), &b_int));
        }
    }

    #[test]
    fn test_generic_depth_limit() {
        let mut md = MetadataBuilder::new("App");
        let list = md.class("App", "List`1").generic_param("T").build();
        let loader = TypeLoader::with_config(crate::LoaderConfig::default().with_max_generic_depth(3));
        let module = loader.register_module("App", md.build()).unwrap();
        let list = loader.resolve(module, list).unwrap();

        let mut current = loader.primitive(PrimitiveKind::I4);
        for _ in 0..3 {
            current = loader.instantiate(&list, &[current]).unwrap();
        }
        let Err(Error::TypeLoad(diagnostic)) = loader.instantiate(&list, &[current]) else {
            panic!("depth 4 exceeds the limit");
        };
        assert_eq!(diagnostic.kind, FailureKind::CyclicDefinition);
    }

    #[test]
    fn test_constraints_are_validated() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let constrained = loader.resolve(module, tokens.struct_only).unwrap();
        let string = loader.primitive(PrimitiveKind::String);
        let int = loader.primitive(PrimitiveKind::I4);

        let ok = loader.instantiate(&constrained, &[int]).unwrap();
        loader.init(&ok).unwrap();

        let bad = loader.instantiate(&constrained, &[string]).unwrap();
        let Err(Error::TypeLoad(diagnostic)) = loader.init(&bad) else {
            panic!("string violates the struct constraint");
        };
        assert_eq!(diagnostic.kind, FailureKind::GenericArgumentInvalid);
    }
}
