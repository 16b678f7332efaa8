//! Counters of construction work, used to verify that every stage runs at most once per type.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Construction counters of a loader
#[derive(Debug, Default)]
pub struct LoaderStats {
    definitions_created: AtomicUsize,
    instances_created: AtomicUsize,
    supertypes_built: AtomicUsize,
    layouts_computed: AtomicUsize,
    vtables_built: AtomicUsize,
    vtables_shared: AtomicUsize,
    failures_recorded: AtomicUsize,
}

/// A point-in-time copy of [`LoaderStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Definition nodes created from metadata
    pub definitions_created: usize,
    /// Generic instance nodes created
    pub instances_created: usize,
    /// Supertype arrays built
    pub supertypes_built: usize,
    /// Instance layouts computed
    pub layouts_computed: usize,
    /// Vtables built, shared ones included
    pub vtables_built: usize,
    /// Vtables that reused the parent's table
    pub vtables_shared: usize,
    /// Failures recorded on type nodes
    pub failures_recorded: usize,
}

impl LoaderStats {
    pub(crate) fn definition_created(&self) {
        self.definitions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn instance_created(&self) {
        self.instances_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn supertypes_built(&self) {
        self.supertypes_built.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn layout_computed(&self) {
        self.layouts_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn vtable_built(&self, shared: bool) {
        self.vtables_built.fetch_add(1, Ordering::Relaxed);
        if shared {
            self.vtables_shared.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn failure_recorded(&self) {
        self.failures_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            definitions_created: self.definitions_created.load(Ordering::Relaxed),
            instances_created: self.instances_created.load(Ordering::Relaxed),
            supertypes_built: self.supertypes_built.load(Ordering::Relaxed),
            layouts_computed: self.layouts_computed.load(Ordering::Relaxed),
            vtables_built: self.vtables_built.load(Ordering::Relaxed),
            vtables_shared: self.vtables_shared.load(Ordering::Relaxed),
            failures_recorded: self.failures_recorded.load(Ordering::Relaxed),
        }
    }
}
