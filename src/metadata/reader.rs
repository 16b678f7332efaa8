//! The metadata boundary of the loader.
//!
//! The loader never parses binaries itself. Everything it knows about a module comes through a
//! [`MetadataReader`], a pure, side-effect free lookup surface keyed by [`Token`]. Rows are
//! returned by value; a bad token or out-of-range index is reported as [`crate::Error::Malformed`].

use std::ops::Range;

use crate::{
    metadata::{
        signature::{SignatureMethod, TypeSignature},
        token::Token,
    },
    Result,
};

/// A row of the `TypeDef` table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRow {
    /// Simple name of the type
    pub name: String,
    /// Namespace, empty for the global namespace and for nested types
    pub namespace: String,
    /// Raw [`crate::metadata::flags::TypeAttributes`]
    pub flags: u32,
    /// `TypeDef`, `TypeRef`, `TypeSpec` or primitive token of the parent, null if rootless
    pub parent_token: Token,
    /// Rows of the `Field` table owned by this type (1-based, end exclusive)
    pub field_range: Range<u32>,
    /// Rows of the `MethodDef` table owned by this type (1-based, end exclusive)
    pub method_range: Range<u32>,
}

/// A row of the `Field` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    /// Field name
    pub name: String,
    /// Raw [`crate::metadata::flags::FieldAttributes`]
    pub flags: u32,
    /// Type of the field
    pub signature: TypeSignature,
}

/// A row of the `MethodDef` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRow {
    /// Method name
    pub name: String,
    /// Raw `MethodAttributes`
    pub flags: u32,
    /// Decoded method signature
    pub signature: SignatureMethod,
}

/// A row of the `GenericParam` table with its constraints already attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParamRow {
    /// Position of the parameter in its owner's parameter list
    pub number: u16,
    /// Parameter name
    pub name: String,
    /// Raw [`crate::metadata::flags::GenericParamAttributes`]
    pub flags: u32,
    /// Type constraints, as `TypeDef`, `TypeRef` or `TypeSpec` tokens
    pub constraints: Vec<Token>,
}

/// Per-field placement for explicit layout types (`FieldLayout` table)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplicitLayout {
    /// Byte offset relative to the start of the instance data
    pub offset: i64,
    /// Declared storage extent of the field, if it differs from its natural size
    pub size: Option<u32>,
}

/// A row of the `ClassLayout` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassLayout {
    /// Packing size, 0 means the natural packing
    pub packing_size: u32,
    /// Explicit instance data size, 0 means computed
    pub class_size: u32,
}

/// A row of the `TypeRef` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRefRow {
    /// Name of the module that defines the type
    pub scope: String,
    /// Namespace of the referenced type
    pub namespace: String,
    /// Name of the referenced type
    pub name: String,
}

/// A row of the `MemberRef` table describing a method on another (possibly generic) type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRefRow {
    /// `TypeDef`, `TypeRef` or `TypeSpec` token of the declaring type
    pub parent: Token,
    /// Member name
    pub name: String,
    /// Signature used to find the member on its declaring type
    pub signature: SignatureMethod,
}

/// A row of the `MethodImpl` table: `body` explicitly implements `declaration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodImplRow {
    /// `MethodDef` token of the implementation, owned by the declaring type
    pub body: Token,
    /// `MethodDef` or `MemberRef` token of the overridden method
    pub declaration: Token,
}

/// A row of the `Property` table with its accessors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRow {
    /// Property name
    pub name: String,
    /// `MethodDef` token of the getter
    pub getter: Option<Token>,
    /// `MethodDef` token of the setter
    pub setter: Option<Token>,
}

/// A row of the `Event` table with its accessors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    /// Event name
    pub name: String,
    /// `MethodDef` token of the add accessor
    pub add: Option<Token>,
    /// `MethodDef` token of the remove accessor
    pub remove: Option<Token>,
}

/// Read-only access to the metadata tables of a single module
///
/// Implementations must be pure: the same token always yields the same row, and no call may
/// observe or cause mutation. The loader calls into the reader from many threads, outside of its
/// structural lock wherever possible.
pub trait MetadataReader: Send + Sync {
    /// Number of rows in the `TypeDef` table
    fn type_count(&self) -> u32;

    /// Number of rows in the `Field` table
    fn field_count(&self) -> u32;

    /// Number of rows in the `MethodDef` table
    fn method_count(&self) -> u32;

    /// Reads a `TypeDef` row
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_type_row(&self, token: Token) -> Result<TypeRow>;

    /// Reads a `Field` row
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `Field` token
    fn read_field_row(&self, token: Token) -> Result<FieldRow>;

    /// Reads a `MethodDef` row
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `MethodDef` token
    fn read_method_row(&self, token: Token) -> Result<MethodRow>;

    /// Directly declared interfaces of a type, in declaration order
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_interface_impl_list(&self, token: Token) -> Result<Vec<Token>>;

    /// Generic parameters of a type, ordered by `number`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_generic_params(&self, token: Token) -> Result<Vec<GenericParamRow>>;

    /// Explicit placement of a field, `None` if the field has no `FieldLayout` row
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `Field` token
    fn read_explicit_layout(&self, token: Token) -> Result<Option<ExplicitLayout>>;

    /// Packing and size overrides of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_class_layout(&self, token: Token) -> Result<Option<ClassLayout>>;

    /// Decodes a `TypeSpec` signature
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeSpec` token
    fn read_type_spec(&self, token: Token) -> Result<TypeSignature>;

    /// Reads a `TypeRef` row
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeRef` token
    fn read_type_ref(&self, token: Token) -> Result<TypeRefRow>;

    /// Reads a `MemberRef` row
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `MemberRef` token
    fn read_member_ref(&self, token: Token) -> Result<MemberRefRow>;

    /// Explicit overrides declared by a type
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_method_impls(&self, token: Token) -> Result<Vec<MethodImplRow>>;

    /// Enclosing type of a nested type
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_enclosing_type(&self, token: Token) -> Result<Option<Token>>;

    /// Properties declared by a type
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_properties(&self, token: Token) -> Result<Vec<PropertyRow>>;

    /// Events declared by a type
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `token` is not a valid `TypeDef` token
    fn read_events(&self, token: Token) -> Result<Vec<EventRow>>;

    /// Finds a top-level type definition by its full name
    fn lookup_type(&self, namespace: &str, name: &str) -> Option<Token>;
}
