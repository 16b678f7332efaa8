//! Failure propagation and recovery.
//!
//! A broken type must not take unrelated types down with it, the failure of a dependency must be
//! reported with its cause, and unloading must give back the resources a module introduced.

use std::sync::Arc;

use dotloader::{prelude::*, typesystem::IdOwner, Result};

fn new_virtual() -> MethodAttributes {
    MethodAttributes::PUBLIC
        | MethodAttributes::VIRTUAL
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::NEW_SLOT
}

fn explicit_body() -> MethodAttributes {
    MethodAttributes::PRIVATE
        | MethodAttributes::VIRTUAL
        | MethodAttributes::FINAL
        | MethodAttributes::NEW_SLOT
}

#[test]
fn test_dependency_failure_is_chained() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut md = MetadataBuilder::new("App");
    let overlapping = md
        .value_type("App", "Overlapping")
        .flags(TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED)
        .field_at("reference", FieldAttributes::PUBLIC, TypeSignature::Object, 0)
        .field_at("number", FieldAttributes::PUBLIC, TypeSignature::I8, 0)
        .build();
    let holder = md
        .class("App", "Holder")
        .field("value", FieldAttributes::PUBLIC, TypeSignature::ValueType(overlapping))
        .build();
    let outer = md.class("App", "Outer").extends(holder).build();
    let healthy = md
        .class("App", "Healthy")
        .field("name", FieldAttributes::PUBLIC, TypeSignature::String)
        .build();

    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;

    let Err(Error::TypeLoad(diagnostic)) = loader.load(module, outer) else {
        panic!("Outer derives from a type with an invalid field");
    };
    let chain: Vec<(FailureKind, &str)> = diagnostic
        .chain()
        .map(|link| (link.kind, link.type_name.as_str()))
        .collect();
    assert_eq!(
        chain,
        [
            (FailureKind::DependencyFailed, "App.Outer"),
            (FailureKind::DependencyFailed, "App.Holder"),
            (FailureKind::LayoutViolation, "App.Overlapping"),
        ]
    );

    // The stored failure is reported again without recomputation
    let holder = loader.resolve(module, holder)?;
    let first = loader.has_failure(&holder).expect("Holder failed");
    let Err(Error::TypeLoad(again)) = loader.init(&holder) else {
        panic!("a failed type stays failed");
    };
    assert!(Arc::ptr_eq(&first, &again));

    let healthy = loader.load(module, healthy)?;
    assert!(loader.has_failure(&healthy).is_none());
    assert_eq!(loader.instance_size(&healthy)?, 16 + 8);
    Ok(())
}

#[test]
fn test_load_module_keeps_going() -> Result<()> {
    let mut md = MetadataBuilder::new("App");
    let recursive_token = md.next_type_token();
    md.value_type("App", "Recursive")
        .field("inner", FieldAttributes::PUBLIC, TypeSignature::ValueType(recursive_token))
        .build();
    let shape = md
        .interface("App", "IShape")
        .method(
            "Area",
            new_virtual() | MethodAttributes::ABSTRACT,
            SignatureMethod::instance(TypeSignature::R8, vec![]),
        )
        .build();
    md.class("App", "Unfinished").implements(shape).build();
    let square = md
        .class("App", "Square")
        .implements(shape)
        .method(
            "Area",
            new_virtual(),
            SignatureMethod::instance(TypeSignature::R8, vec![]),
        )
        .build();

    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;
    let mut failures: Vec<(String, FailureKind)> = loader
        .load_module(module)?
        .iter()
        .map(|diagnostic| (diagnostic.type_name.clone(), diagnostic.root_cause().kind))
        .collect();
    failures.sort_by(|left, right| left.0.cmp(&right.0));
    assert_eq!(
        failures,
        [
            ("App.Recursive".to_string(), FailureKind::CyclicDefinition),
            ("App.Unfinished".to_string(), FailureKind::DispatchUnsatisfied),
        ]
    );

    let square = loader.resolve(module, square)?;
    let shape = loader.resolve(module, shape)?;
    assert!(square.lifecycle_flags().contains(LifecycleFlags::INITED));
    assert!(loader.is_assignable_from(&shape, &square)?);
    assert_eq!(loader.stats().failures_recorded, 2);
    Ok(())
}

#[test]
fn test_unload_module_releases_interface_ids() -> Result<()> {
    let loader = TypeLoader::new();

    let mut core = MetadataBuilder::new("Core");
    let comparable = core.interface("Core", "IComparable").build();
    let comparer = core
        .interface("Core", "IComparer`1")
        .generic_param("T")
        .build();
    let core_id = loader.register_module("Core", core.build())?;

    let mut app = MetadataBuilder::new("App");
    let money = app.class("App", "Money").build();
    let app_id = loader.register_module("App", app.build())?;

    let comparable = loader.resolve(core_id, comparable)?;
    let comparer = loader.resolve(core_id, comparer)?;
    let money = loader.resolve(app_id, money)?;
    let comparer_of_money = loader.instantiate(&comparer, &[money])?;
    loader.init(&comparable)?;
    loader.init(&comparer_of_money)?;

    let plain_id = comparable.interface_id().expect("interfaces get an id");
    let instance_id = comparer_of_money.interface_id().expect("interfaces get an id");
    let ids = loader.interface_ids();
    assert!(ids.owned_by(IdOwner::Module(core_id))?.contains(&plain_id));
    assert!(ids.owned_by(IdOwner::of(&comparer_of_money))?.contains(&instance_id));

    // Unloading App drops the instance over Money but leaves Core's own interfaces
    loader.unload_module(app_id)?;
    assert!(ids.is_allocated(plain_id)?);
    assert!(!ids.is_allocated(instance_id)?);
    assert!(loader.registry().get(comparer_of_money.handle).is_none());
    assert!(loader.registry().get(comparer.handle).is_some());
    assert!(matches!(
        loader.unload_module(app_id),
        Err(Error::ModuleNotFound(_))
    ));

    loader.unload_module(core_id)?;
    assert!(!ids.is_allocated(plain_id)?);
    Ok(())
}

/// IBase { F default }, ILeft : IBase { IBase.F }, IRight : IBase { IBase.F }
fn default_hierarchy(md: &mut MetadataBuilder) -> (Token, Token, Token, Token) {
    let mut base = md.interface("App", "IBase");
    let f = base.add_method("F", new_virtual(), SignatureMethod::void_instance());
    let base = base.build();

    let mut left = md.interface("App", "ILeft").implements(base);
    let body = left.add_method("App.IBase.F", explicit_body(), SignatureMethod::void_instance());
    let left = left.override_method(body, f).build();

    let mut right = md.interface("App", "IRight").implements(base);
    let body = right.add_method("App.IBase.F", explicit_body(), SignatureMethod::void_instance());
    let right = right.override_method(body, f).build();

    (base, left, right, f)
}

#[test]
fn test_default_selection_ignores_declaration_order() -> Result<()> {
    let mut md = MetadataBuilder::new("App");
    let (base, left, right, _) = default_hierarchy(&mut md);
    let base_first = md.class("App", "BaseFirst").implements(base).implements(left).build();
    let left_first = md.class("App", "LeftFirst").implements(left).implements(base).build();
    let left_right = md.class("App", "LeftRight").implements(left).implements(right).build();
    let right_left = md.class("App", "RightLeft").implements(right).implements(left).build();

    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build())?;
    let base = loader.resolve(module, base)?;
    let left = loader.resolve(module, left)?;
    let f = loader
        .find_method(&base, "F")?
        .expect("IBase declares F");

    // The more specific default wins whichever interface is listed first
    for token in [base_first, left_first] {
        let node = loader.load(module, token)?;
        assert!(loader.dim_conflicts(&node)?.is_empty());
        let target = loader.resolve_virtual_call(&node, &f)?;
        assert!(target.declaring.points_to(&left), "{}", node.full_name());
    }

    // Two equally specific defaults conflict in either order
    for token in [left_right, right_left] {
        let node = loader.load(module, token)?;
        let conflicts = loader.dim_conflicts(&node)?;
        assert_eq!(conflicts.len(), 1, "{}", node.full_name());
        assert_eq!(conflicts[0].candidates.len(), 2);
        assert_eq!(Some(conflicts[0].slot), loader.interface_offset(&node, &base)?);
        assert!(matches!(
            loader.resolve_virtual_call(&node, &f),
            Err(Error::DispatchConflict { .. })
        ));
    }
    Ok(())
}
