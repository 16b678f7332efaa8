//! # dotloader Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotloader library. Import this module to get quick access to the essential
//! types for describing metadata, loading types and querying their layout and dispatch data.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotloader operations
pub use crate::Error;

/// The result type used throughout dotloader
pub use crate::Result;

/// Target and policy configuration
pub use crate::{GcAwareLayout, LoaderConfig};

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The class loader and its counters
pub use crate::loader::{StatsSnapshot, TypeLoader};

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata tokens and table ids
pub use crate::metadata::token::{TableId, Token};

/// Attribute flags of metadata rows
pub use crate::metadata::flags::{
    FieldAttributes, GenericParamAttributes, MethodAttributes, TypeAttributes,
};

/// Decoded signatures
pub use crate::metadata::signature::{SignatureMethod, TypeSignature};

/// The reader trait and the in-memory builder
pub use crate::metadata::{builder::MetadataBuilder, reader::MetadataReader};

// ================================================================================================
// Type System
// ================================================================================================

/// Type nodes and their kinds
pub use crate::typesystem::{PrimitiveKind, TypeKind, TypeNode, TypeNodeRc, TypeNodeRef};

/// Members
pub use crate::typesystem::{Field, FieldRc, Method, MethodRc, MethodSignature};

/// Layout and dispatch data
pub use crate::typesystem::{
    DimConflict, FieldLayout, FieldOffset, InterfaceTable, StaticLayout, Vtable, VtableSlot,
};

/// Failures and lifecycle
pub use crate::typesystem::{Diagnostic, FailureKind, LifecycleFlags};

/// Modules and interface ids
pub use crate::typesystem::{InterfaceIdRegistry, ModuleId};
