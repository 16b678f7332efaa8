//! Per-type construction state.
//!
//! Every type node advances through a fixed set of stages. Each stage is either not started,
//! claimed by the thread computing it, or published. Published data is
//! immutable: it is written into its `OnceLock` cell first and the stage flag is set afterwards
//! with release ordering, so a reader that observes the flag with an acquire load also observes
//! the data.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Lifecycle flags of a type node
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LifecycleFlags: u32 {
        /// The parent has been resolved (or the type is rootless)
        const PARENT_INITED = 0x0001;
        /// The declared interfaces have been resolved
        const INTERFACES_INITED = 0x0002;
        /// The supertype array and inheritance depth are available
        const SUPERTYPES_INITED = 0x0004;
        /// The field table has been read
        const FIELD_TABLE_INITED = 0x0008;
        /// The method table has been read
        const METHOD_TABLE_INITED = 0x0010;
        /// Properties and events have been read
        const PROPERTIES_INITED = 0x0020;
        /// Instance size, alignment and field offsets are available
        const SIZE_INITED = 0x0040;
        /// Static field layout is available
        const FIELDS_INITED = 0x0080;
        /// Vtable and interface offsets are available
        const VTABLE_COMPUTED = 0x0100;
        /// Fully initialized
        const INITED = 0x0200;
        /// The type failed to load, see its diagnostic
        const HAS_FAILURE = 0x8000;
    }
}

/// Construction stages, in the order a full initialization runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Resolve the parent type
    Parent,
    /// Resolve the declared interfaces
    Interfaces,
    /// Build the supertype array
    Supertypes,
    /// Read the field table
    FieldTable,
    /// Read the method table
    MethodTable,
    /// Read properties and events
    Properties,
    /// Compute the instance layout
    Size,
    /// Compute the static layout
    Fields,
    /// Build the vtable and interface table
    Vtable,
    /// Validate generic arguments and finish
    Init,
}

impl Stage {
    /// The flag published when this stage completes
    #[must_use]
    pub fn flag(self) -> LifecycleFlags {
        match self {
            Stage::Parent => LifecycleFlags::PARENT_INITED,
            Stage::Interfaces => LifecycleFlags::INTERFACES_INITED,
            Stage::Supertypes => LifecycleFlags::SUPERTYPES_INITED,
            Stage::FieldTable => LifecycleFlags::FIELD_TABLE_INITED,
            Stage::MethodTable => LifecycleFlags::METHOD_TABLE_INITED,
            Stage::Properties => LifecycleFlags::PROPERTIES_INITED,
            Stage::Size => LifecycleFlags::SIZE_INITED,
            Stage::Fields => LifecycleFlags::FIELDS_INITED,
            Stage::Vtable => LifecycleFlags::VTABLE_COMPUTED,
            Stage::Init => LifecycleFlags::INITED,
        }
    }
}

/// State of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Nobody started this stage
    Uninitialized,
    /// The stage is being computed
    Computing,
    /// The stage data is published and immutable
    Published,
}

/// Atomic lifecycle of one type node
#[derive(Debug, Default)]
pub struct Lifecycle {
    published: AtomicU32,
    computing: AtomicU32,
}

impl Lifecycle {
    /// Lifecycle of a node where nothing has been computed yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle of a node that is complete from the start
    #[must_use]
    pub fn completed() -> Self {
        Lifecycle {
            published: AtomicU32::new(LifecycleFlags::all().difference(LifecycleFlags::HAS_FAILURE).bits()),
            computing: AtomicU32::new(0),
        }
    }

    /// Snapshot of the published flags
    #[must_use]
    pub fn flags(&self) -> LifecycleFlags {
        LifecycleFlags::from_bits_truncate(self.published.load(Ordering::Acquire))
    }

    /// Check whether a stage was published
    #[must_use]
    pub fn is_published(&self, stage: Stage) -> bool {
        self.flags().contains(stage.flag())
    }

    /// Current state of a stage
    #[must_use]
    pub fn state(&self, stage: Stage) -> StageState {
        if self.is_published(stage) {
            StageState::Published
        } else if self.computing.load(Ordering::Acquire) & stage.flag().bits() != 0 {
            StageState::Computing
        } else {
            StageState::Uninitialized
        }
    }

    /// Move a stage from `Uninitialized` to `Computing`
    ///
    /// Returns false if the stage was already claimed or published.
    pub fn claim(&self, stage: Stage) -> bool {
        if self.is_published(stage) {
            return false;
        }
        let bit = stage.flag().bits();
        self.computing.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Drop a claim without publishing, e.g. because the type failed
    pub fn abandon(&self, stage: Stage) {
        self.computing
            .fetch_and(!stage.flag().bits(), Ordering::AcqRel);
    }

    /// Publish a stage; its data must already be written
    pub fn publish(&self, stage: Stage) {
        self.published
            .fetch_or(stage.flag().bits(), Ordering::Release);
        self.abandon(stage);
    }

    /// Set `HAS_FAILURE`
    pub fn mark_failed(&self) {
        self.published
            .fetch_or(LifecycleFlags::HAS_FAILURE.bits(), Ordering::Release);
    }

    /// Check `HAS_FAILURE`
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.flags().contains(LifecycleFlags::HAS_FAILURE)
    }
}
