//! Attribute flags read from metadata rows.
//!
//! Type, field and generic-parameter attributes are kept as raw `u32` constant modules, matching the
//! way they are stored in the tables. Method attributes are a [`bitflags`] set because the
//! dispatch builder combines and tests them constantly.
//!
//! # Key Components
//! - [`TypeAttributes`] - layout kind, interface, abstract and sealed bits
//! - [`FieldAttributes`] - access, static and literal bits
//! - [`GenericParamAttributes`] - variance and special constraints
//! - [`MethodAttributes`] - access, vtable layout and modifier bits

use bitflags::bitflags;

#[allow(non_snake_case)]
/// All possible flags for `TypeAttributes`
pub mod TypeAttributes {
    /// Mask for extracting type visibility information
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Type has no public scope
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Type has public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Mask for extracting class layout information
    pub const LAYOUT_MASK: u32 = 0x0000_0018;
    /// Class fields are automatically laid out by the runtime
    pub const AUTO_LAYOUT: u32 = 0x0000_0000;
    /// Class fields are laid out sequentially in declaration order
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    /// Field layout is explicitly specified using field offsets
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
    /// Class name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Initialize the class before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// All possible flags for `FieldAttributes`
pub mod FieldAttributes {
    /// These 3 bits contain the access level
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessibly by anyone who has visibility to this scope
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on type, else per instance
    pub const STATIC: u32 = 0x0010;
    /// Field can only be initialized, not written to after init
    pub const INIT_ONLY: u32 = 0x0020;
    /// Value is compile time constant, no storage is reserved
    pub const LITERAL: u32 = 0x0040;
    /// CLI provides 'special' behavior, depending upon the name of the field
    pub const RTSPECIAL_NAME: u32 = 0x0400;
    /// Field has RVA
    pub const HAS_FIELD_RVA: u32 = 0x0100;
}

#[allow(non_snake_case)]
/// All possible flags for `GenericParamAttributes`
pub mod GenericParamAttributes {
    /// Mask for the variance bits
    pub const VARIANCE_MASK: u32 = 0x0003;
    /// The generic parameter is covariant
    pub const COVARIANT: u32 = 0x0001;
    /// The generic parameter is contravariant
    pub const CONTRAVARIANT: u32 = 0x0002;
    /// Mask for the special constraint bits
    pub const SPECIAL_CONSTRAINT_MASK: u32 = 0x001C;
    /// The argument must be a reference type
    pub const REFERENCE_TYPE_CONSTRAINT: u32 = 0x0004;
    /// The argument must be a non-nullable value type
    pub const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT: u32 = 0x0008;
    /// The argument must have a public parameterless constructor
    pub const DEFAULT_CONSTRUCTOR_CONSTRAINT: u32 = 0x0010;
}

/// Bitmask for the method access bits
pub const METHOD_ACCESS_MASK: u32 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method attributes as stored in the `MethodDef` table
    pub struct MethodAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, depending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodAttributes {
    /// Raw access level (`PRIVATE`, `FAMILY`, `PUBLIC`, ...)
    #[must_use]
    pub fn access(&self) -> u32 {
        self.bits() & METHOD_ACCESS_MASK
    }

    /// True if the access level is exactly `public`
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.access() == MethodAttributes::PUBLIC.bits()
    }

    /// True for virtual, non-static methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.contains(MethodAttributes::VIRTUAL) && !self.contains(MethodAttributes::STATIC)
    }

    /// True if the method has no body
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.contains(MethodAttributes::ABSTRACT)
    }
}
