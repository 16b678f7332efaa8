//! Published dispatch data of a type: vtable, interface table and default-method conflicts.

use std::{fmt, sync::Arc};

use crate::typesystem::{CompressedBitmap, MethodRc, TypeNodeRc};

/// One entry of a vtable
#[derive(Clone)]
pub enum VtableSlot {
    /// No implementation; only legal in abstract types and interfaces
    Empty,
    /// The method invoked through this slot
    Method(MethodRc),
    /// Two or more equally specific default implementations compete for this slot
    Conflicted,
}

impl VtableSlot {
    /// The method in this slot, if any
    #[must_use]
    pub fn method(&self) -> Option<&MethodRc> {
        match self {
            VtableSlot::Method(method) => Some(method),
            _ => None,
        }
    }

    /// True for [`VtableSlot::Empty`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, VtableSlot::Empty)
    }

    /// Same variant and, for methods, the same method node
    #[must_use]
    pub fn same_as(&self, other: &VtableSlot) -> bool {
        match (self, other) {
            (VtableSlot::Empty, VtableSlot::Empty)
            | (VtableSlot::Conflicted, VtableSlot::Conflicted) => true,
            (VtableSlot::Method(a), VtableSlot::Method(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for VtableSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VtableSlot::Empty => write!(f, "<empty>"),
            VtableSlot::Method(method) => write!(f, "{}", method.full_name()),
            VtableSlot::Conflicted => write!(f, "<conflict>"),
        }
    }
}

/// An immutable vtable, shared between types when identical
pub type Vtable = Arc<[VtableSlot]>;

/// The interfaces a type implements and where their slots start
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    /// Every interface implemented, directly or through inheritance
    pub interfaces: Vec<TypeNodeRc>,
    /// Vtable offset of each interface, parallel to `interfaces`; empty for interface types
    pub offsets: Vec<u32>,
    /// Bitmap of the interface ids in `interfaces`
    pub bitmap: CompressedBitmap,
}

impl InterfaceTable {
    /// Vtable offset of an interface, if the type implements it
    #[must_use]
    pub fn offset_of(&self, interface: &TypeNodeRc) -> Option<u32> {
        self.interfaces
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, interface))
            .and_then(|index| self.offsets.get(index).copied())
    }

    /// True if the interface is part of the table
    #[must_use]
    pub fn contains(&self, interface: &TypeNodeRc) -> bool {
        self.interfaces
            .iter()
            .any(|candidate| Arc::ptr_eq(candidate, interface))
    }
}

/// A vtable slot whose default implementations could not be ordered
#[derive(Debug, Clone)]
pub struct DimConflict {
    /// The conflicted slot
    pub slot: u32,
    /// The competing default implementations
    pub candidates: Vec<MethodRc>,
}

/// Everything the vtable stage publishes
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The vtable
    pub vtable: Vtable,
    /// Interface table with offsets and bitmap
    pub interfaces: InterfaceTable,
    /// Unresolved default implementation conflicts
    pub conflicts: Vec<DimConflict>,
}
