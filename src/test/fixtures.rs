//! Metadata universes used across the unit tests

use crate::metadata::{
    builder::MetadataBuilder,
    flags::{FieldAttributes, GenericParamAttributes, MethodAttributes, TypeAttributes},
    signature::{SignatureMethod, TypeSignature},
};

use super::Tokens;

fn new_virtual() -> MethodAttributes {
    MethodAttributes::PUBLIC
        | MethodAttributes::VIRTUAL
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::NEW_SLOT
}

fn override_virtual() -> MethodAttributes {
    MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::HIDE_BY_SIG
}

/// `IShape { Area }`, `abstract Base { id; get_Id; Describe; abstract Measure }` and
/// `Derived : Base, IShape { name }` overriding everything
pub fn simple_hierarchy(md: &mut MetadataBuilder) -> Tokens {
    let shape = md
        .interface("App", "IShape")
        .method(
            "Area",
            new_virtual() | MethodAttributes::ABSTRACT,
            SignatureMethod::instance(TypeSignature::R8, vec![]),
        )
        .build();

    let base = md
        .class("App", "Base")
        .with_flags(TypeAttributes::ABSTRACT)
        .field("id", FieldAttributes::PRIVATE, TypeSignature::I4)
        .method(
            "get_Id",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            SignatureMethod::instance(TypeSignature::I4, vec![]),
        )
        .method("Describe", new_virtual(), SignatureMethod::instance(TypeSignature::String, vec![]))
        .method(
            "Measure",
            new_virtual() | MethodAttributes::ABSTRACT,
            SignatureMethod::void_instance(),
        )
        .build();

    let derived = md
        .class("App", "Derived")
        .extends(base)
        .implements(shape)
        .field("name", FieldAttributes::PRIVATE, TypeSignature::String)
        .method(
            "Describe",
            override_virtual(),
            SignatureMethod::instance(TypeSignature::String, vec![]),
        )
        .method("Measure", override_virtual(), SignatureMethod::void_instance())
        .method(
            "Area",
            new_virtual() | MethodAttributes::FINAL,
            SignatureMethod::instance(TypeSignature::R8, vec![]),
        )
        .build();

    Tokens {
        shape,
        base,
        derived,
        ..Tokens::default()
    }
}

/// `List<T> { T[] items; Add(T); Count; Changed }`, `SortedList<T> : List<T>` and
/// `Box<T> where T : struct`
pub fn generic_collections(md: &mut MetadataBuilder) -> Tokens {
    let mut builder = md
        .class("App", "List`1")
        .generic_param("T")
        .field(
            "items",
            FieldAttributes::PRIVATE,
            TypeSignature::sz_array(TypeSignature::GenericParamType(0)),
        )
        .field("count", FieldAttributes::PRIVATE, TypeSignature::I4)
        .method(
            "Add",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::GenericParamType(0)]),
        );
    let get_count = builder.add_method(
        "get_Count",
        MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME,
        SignatureMethod::instance(TypeSignature::I4, vec![]),
    );
    let add_changed = builder.add_method(
        "add_Changed",
        MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME,
        SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::Object]),
    );
    let list = builder
        .property("Count", Some(get_count), None)
        .event("Changed", Some(add_changed), None)
        .build();

    let list_of_t = md.type_spec(TypeSignature::generic_class(
        list,
        vec![TypeSignature::GenericParamType(0)],
    ));
    let sorted_list = md
        .class("App", "SortedList`1")
        .generic_param("T")
        .extends(list_of_t)
        .build();

    let struct_only = md
        .class("App", "Box`1")
        .generic_param_with(
            "T",
            GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT,
            vec![],
        )
        .field("value", FieldAttributes::PUBLIC, TypeSignature::GenericParamType(0))
        .build();

    Tokens {
        list,
        sorted_list,
        struct_only,
        ..Tokens::default()
    }
}

/// A struct overlapping a reference with data, a struct containing itself and a class holding
/// the broken struct
pub fn broken_layouts(md: &mut MetadataBuilder) -> Tokens {
    let overlapping = md
        .value_type("App", "Overlapping")
        .flags(TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED)
        .field_at("reference", FieldAttributes::PUBLIC, TypeSignature::Object, 0)
        .field_at("value", FieldAttributes::PUBLIC, TypeSignature::I8, 0)
        .build();

    let recursive_token = md.next_type_token();
    let recursive = md
        .value_type("App", "Recursive")
        .field("value", FieldAttributes::PUBLIC, TypeSignature::I4)
        .field("next", FieldAttributes::PUBLIC, TypeSignature::ValueType(recursive_token))
        .build();

    let dependent = md
        .class("App", "Holder")
        .field("inner", FieldAttributes::PUBLIC, TypeSignature::ValueType(overlapping))
        .build();

    Tokens {
        overlapping,
        recursive,
        dependent,
        ..Tokens::default()
    }
}

/// `IFirst` and `ISecond` with a default `Describe` each, `Single : IFirst`, and
/// `Ambiguous : IFirst, ISecond` whose own `Describe` matches both defaults
pub fn default_methods(md: &mut MetadataBuilder) -> Tokens {
    let first = md
        .interface("App", "IFirst")
        .method("Describe", new_virtual(), SignatureMethod::void_instance())
        .build();
    let second = md
        .interface("App", "ISecond")
        .method("Describe", new_virtual(), SignatureMethod::void_instance())
        .build();
    let single = md.class("App", "Single").implements(first).build();
    let ambiguous = md
        .class("App", "Ambiguous")
        .implements(first)
        .implements(second)
        .method("Describe", new_virtual(), SignatureMethod::void_instance())
        .build();

    Tokens {
        first,
        second,
        single,
        ambiguous,
        ..Tokens::default()
    }
}
