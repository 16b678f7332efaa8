//! Concurrent construction.
//!
//! Many threads request the same types and stages at once. Every stage must be computed exactly
//! once and every thread must observe the same published data.

use std::sync::Arc;

use dotloader::{prelude::*, Result};
use rayon::prelude::*;

const DEPTH: usize = 24;
const THREADS: usize = 64;

fn new_virtual() -> MethodAttributes {
    MethodAttributes::PUBLIC
        | MethodAttributes::VIRTUAL
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::NEW_SLOT
}

/// A chain `Level0 : IVisitor`, `Level{n} : Level{n-1}`, each level overriding `Visit` and
/// adding a field, plus a generic `Wrapper<T>`
fn hierarchy() -> (MetadataBuilder, Vec<Token>, Token) {
    let mut md = MetadataBuilder::new("App");
    let visitor = md
        .interface("App", "IVisitor")
        .method(
            "Visit",
            new_virtual() | MethodAttributes::ABSTRACT,
            SignatureMethod::void_instance(),
        )
        .build();

    let mut levels = Vec::with_capacity(DEPTH);
    for level in 0..DEPTH {
        let name = format!("Level{level}");
        let builder = md.class("App", &name);
        let builder = match levels.last() {
            Some(parent) => builder.extends(*parent).method(
                "Visit",
                MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::HIDE_BY_SIG,
                SignatureMethod::void_instance(),
            ),
            None => builder
                .implements(visitor)
                .method("Visit", new_virtual(), SignatureMethod::void_instance()),
        };
        levels.push(
            builder
                .field(&format!("f{level}"), FieldAttributes::PUBLIC, TypeSignature::I4)
                .build(),
        );
    }

    let wrapper = md
        .class("App", "Wrapper`1")
        .generic_param("T")
        .field("value", FieldAttributes::PUBLIC, TypeSignature::GenericParamType(0))
        .build();
    (md, levels, wrapper)
}

#[test]
fn test_concurrent_init_is_idempotent() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let (md, levels, _) = hierarchy();
    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;
    let deepest = *levels.last().unwrap();

    let nodes: Vec<TypeNodeRc> = (0..THREADS)
        .into_par_iter()
        .map(|_| loader.load(module, deepest))
        .collect::<Result<_>>()?;

    let first = &nodes[0];
    let vtable = loader.vtable(first)?;
    for node in &nodes {
        assert!(Arc::ptr_eq(node, first));
        assert!(Arc::ptr_eq(&loader.vtable(node)?, &vtable));
    }

    let stats = loader.stats();
    assert_eq!(stats.layouts_computed, DEPTH);
    assert_eq!(stats.vtables_built, DEPTH + 1);
    assert_eq!(stats.failures_recorded, 0);

    loader.init(first)?;
    assert_eq!(loader.stats(), stats);
    Ok(())
}

#[test]
fn test_concurrent_stage_requests_across_the_chain() -> Result<()> {
    let (md, levels, _) = hierarchy();
    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;
    let nodes: Vec<TypeNodeRc> = levels
        .iter()
        .map(|token| loader.resolve(module, *token))
        .collect::<Result<_>>()?;

    // Every thread walks the chain in a different order and asks for a different stage first
    (0..THREADS).into_par_iter().try_for_each(|thread| {
        for index in 0..DEPTH {
            let node = &nodes[(index * 7 + thread) % DEPTH];
            match thread % 3 {
                0 => loader.ensure_vtable(node)?,
                1 => loader.ensure_fields(node)?,
                _ => loader.ensure_supertypes(node)?,
            }
        }
        Ok::<(), Error>(())
    })?;

    for (depth, node) in nodes.iter().enumerate() {
        loader.init(node)?;
        assert_eq!(node.depth(), Some(depth + 2));
        let unaligned = 16 + 4 * (depth as u32 + 1);
        assert_eq!(loader.instance_size(node)?, (unaligned + 7) & !7);
    }
    assert_eq!(loader.stats().layouts_computed, DEPTH);
    Ok(())
}

#[test]
fn test_concurrent_instantiation_is_interned() -> Result<()> {
    let (md, _, wrapper) = hierarchy();
    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;
    let wrapper = loader.resolve(module, wrapper)?;
    let kinds = [PrimitiveKind::I4, PrimitiveKind::String, PrimitiveKind::R8];

    let instances: Vec<TypeNodeRc> = (0..THREADS)
        .into_par_iter()
        .map(|thread| {
            let arg = loader.primitive(kinds[thread % kinds.len()]);
            let instance = loader.instantiate(&wrapper, &[arg])?;
            loader.init(&instance)?;
            Ok(instance)
        })
        .collect::<Result<_>>()?;

    for (thread, instance) in instances.iter().enumerate() {
        let arg = loader.primitive(kinds[thread % kinds.len()]);
        assert!(Arc::ptr_eq(instance, &loader.instantiate(&wrapper, &[arg])?));
    }
    assert_eq!(loader.stats().instances_created, kinds.len());
    assert_eq!(loader.instances_of(&wrapper).len(), kinds.len());
    Ok(())
}

#[test]
fn test_load_module_in_parallel() -> Result<()> {
    let (md, levels, _) = hierarchy();
    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;

    let failures = loader.load_module(module)?;
    assert!(failures.is_empty());
    for token in levels {
        let node = loader.resolve(module, token)?;
        assert!(node.lifecycle_flags().contains(LifecycleFlags::INITED));
    }
    Ok(())
}
