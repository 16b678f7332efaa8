//! The type graph.
//!
//! This module holds the data model the loader builds and publishes: type nodes and their
//! lifecycle, members, layouts, dispatch tables, failure diagnostics, modules, and the registries
//! for nodes and interface ids. It contains no construction logic; see [`crate::loader`].
//!
//! # Key Components
//!
//! - [`TypeNode`] - One node of the graph, a definition, instance, array, pointer or parameter
//! - [`Lifecycle`] / [`LifecycleFlags`] - Per-node construction state with publish ordering
//! - [`TypeRegistry`] - Arena of all nodes plus module and module-set tables
//! - [`InterfaceIdRegistry`] - Allocator of interface ids
//! - [`CompressedBitmap`] - Run-length encoded interface membership bitmap
//! - [`Diagnostic`] / [`FailureKind`] - Causally chained failure records

mod bitmap;
mod diagnostic;
mod dispatch;
mod iid;
mod layout;
mod lifecycle;
mod member;
mod module;
mod node;
mod primitives;
mod registry;

pub use bitmap::{CompressedBitmap, IdBitSet};
pub use diagnostic::{Diagnostic, FailureKind};
pub use dispatch::{DimConflict, Dispatch, InterfaceTable, Vtable, VtableSlot};
pub use iid::{IdOwner, InterfaceIdRegistry, INITIAL_INTERFACE_IDS};
pub use layout::{FieldLayout, FieldOffset, StaticLayout};
pub use lifecycle::{Lifecycle, LifecycleFlags, Stage, StageState};
pub use member::{Event, Field, FieldRc, Method, MethodRc, MethodSignature, Property};
pub(crate) use module::{ArrayKey, PointerKey};
pub use module::{
    GenericInstantiationKey, Module, ModuleId, ModuleRc, ModuleSet, ModuleSetId, ModuleSetRc,
};
pub use node::{TypeHandle, TypeKind, TypeNode, TypeNodeRc, TypeNodeRef};
pub use primitives::PrimitiveKind;
pub use registry::TypeRegistry;
