//! The type loader.
//!
//! [`TypeLoader`] turns metadata rows into a graph of [`TypeNode`]s and drives every node through
//! its construction stages on demand: parent, interfaces, supertypes, member tables, instance and
//! static layout, and dispatch tables. Stages are computed at most once per node and published
//! without locks for readers.
//!
//! # Construction protocol
//!
//! Every stage runs through the same protocol:
//!
//! 1. If the stage is already published, return immediately (lock-free fast path).
//! 2. Push the `(node, stage)` frame on the thread-local construction stack. If it is already on
//!    the stack, the caller re-entered a type it is still building and receives the partial node.
//! 3. Claim the stage with a compare-and-swap on the node's lifecycle. A thread that loses the
//!    claim and is not building anything else waits until the stage is committed. A thread that
//!    is already inside another construction never waits; it computes the stage itself and the
//!    first commit wins.
//! 4. Compute the stage without holding any loader-wide lock. Stage data goes into write-once
//!    cells, so a losing computation cannot overwrite the winner's.
//! 5. Take the structural lock, re-check for a committed winner or a recorded failure, then
//!    publish the stage flag with release ordering (or record the failure) and wake waiters.
//!
//! A stage that cannot be built does not unwind the caller. The problem is recorded on the node
//! as a [`Diagnostic`], and dependents record a `DependencyFailed` diagnostic chained to it. Use
//! sites observe the failure as [`crate::Error::TypeLoad`].
//!
//! # Key Components
//!
//! - `resolve` - token and signature resolution, definition shells, parents
//! - `members` - field, method, property and event tables
//! - `generics` - instantiation cache, argument validation, recording of incomplete instances
//! - `inflate` - substitution of generic arguments into types and methods
//! - `layout` - instance and static field layout
//! - `vtable` - interface tables and vtables
//! - `query` - dispatch and assignability queries

mod generics;
mod inflate;
mod layout;
mod members;
mod query;
mod resolve;
mod stats;
mod sync;
mod vtable;

pub use stats::{LoaderStats, StatsSnapshot};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use rayon::prelude::*;

use crate::{
    config::LoaderConfig,
    metadata::{
        reader::MetadataReader,
        token::{TableId, Token},
    },
    typesystem::{
        ArrayKey, Diagnostic, FailureKind, FieldLayout, InterfaceIdRegistry, ModuleId, ModuleRc,
        PointerKey, PrimitiveKind, Stage, StageState, StaticLayout, TypeNodeRc, TypeRegistry,
    },
    Error, Result,
};

pub(crate) use generics::Recording;
pub(crate) use inflate::GenericContext;
use sync::{ConstructionFrame, StageSignal, StructuralLock};

static NEXT_LOADER_ID: AtomicUsize = AtomicUsize::new(1);

/// Outcome of driving a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// The stage is published
    Done,
    /// The calling thread is still building this stage further up its stack
    InProgress,
}

type StageBuilder = fn(&TypeLoader, &TypeNodeRc) -> Result<()>;

/// Loads types from registered modules and builds their layouts and dispatch tables
///
/// A loader is `Send + Sync`; share it across threads behind an `Arc`. All construction is
/// idempotent: any number of threads may request the same type and stage concurrently, the work
/// happens once and every caller observes the same published result.
///
/// # Examples
///
/// ```rust
/// use dotloader::prelude::*;
///
/// let mut md = MetadataBuilder::new("App");
/// let point = md
///     .value_type("App", "Point")
///     .field("x", FieldAttributes::PUBLIC, TypeSignature::I4)
///     .field("y", FieldAttributes::PUBLIC, TypeSignature::I4)
///     .build();
///
/// let loader = TypeLoader::new();
/// let module = loader.register_module("App", md.build())?;
/// let node = loader.load(module, point)?;
/// assert_eq!(loader.instance_size(&node)?, 16 + 8);
/// # Ok::<(), dotloader::Error>(())
/// ```
pub struct TypeLoader {
    id: usize,
    config: LoaderConfig,
    registry: TypeRegistry,
    iids: InterfaceIdRegistry,
    lock: StructuralLock,
    signal: StageSignal,
    stats: LoaderStats,
    recording: Mutex<Recording>,
    core_arrays: Mutex<HashMap<ArrayKey, TypeNodeRc>>,
    core_pointers: Mutex<HashMap<PointerKey, TypeNodeRc>>,
}

impl TypeLoader {
    /// Create a loader with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    /// Create a loader for the given target configuration
    #[must_use]
    pub fn with_config(config: LoaderConfig) -> Self {
        TypeLoader {
            id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
            registry: TypeRegistry::new(&config),
            config,
            iids: InterfaceIdRegistry::new(),
            lock: StructuralLock::new(),
            signal: StageSignal::new(),
            stats: LoaderStats::default(),
            recording: Mutex::new(Recording::default()),
            core_arrays: Mutex::new(HashMap::new()),
            core_pointers: Mutex::new(HashMap::new()),
        }
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The node arena and module tables
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The interface id allocator
    #[must_use]
    pub fn interface_ids(&self) -> &InterfaceIdRegistry {
        &self.iids
    }

    /// Construction counters
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The node of a built-in primitive
    #[must_use]
    pub fn primitive(&self, kind: PrimitiveKind) -> TypeNodeRc {
        self.registry.primitive(kind)
    }

    /// Register a module and return its id
    ///
    /// ## Arguments
    /// * 'name'   - Name used by `TypeRef` scopes of other modules
    /// * 'reader' - The module's metadata
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a module with this name is already registered
    pub fn register_module(&self, name: &str, reader: Arc<dyn MetadataReader>) -> Result<ModuleId> {
        let module = self.registry.add_module(name, reader)?;
        log::debug!("registered module {} as {}", name, module.id);
        Ok(module.id)
    }

    /// A registered module
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<ModuleRc> {
        self.registry.module(id)
    }

    pub(crate) fn require_module(&self, id: ModuleId) -> Result<ModuleRc> {
        self.registry
            .module(id)
            .ok_or_else(|| Error::ModuleNotFound(id.to_string()))
    }

    /// Unload a module
    ///
    /// Drops every definition of the module, every generic instance whose module set contains
    /// it, and the constructed types over them, and releases the interface ids they introduced.
    /// Nodes still referenced from outside stay alive but are no longer reachable through the
    /// loader.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] if the module is not registered
    pub fn unload_module(&self, id: ModuleId) -> Result<()> {
        let _guard = self.lock.enter()?;
        let (module, sets) = self
            .registry
            .remove_module(id)
            .ok_or_else(|| Error::ModuleNotFound(id.to_string()))?;

        let mut released = self.iids.release(crate::typesystem::IdOwner::Module(id))?.len();
        for set in &sets {
            released += self
                .iids
                .release(crate::typesystem::IdOwner::ModuleSet(set.id))?
                .len();
        }

        log::debug!(
            "unloaded module {} ({} module sets, {} interface ids)",
            module.name,
            sets.len(),
            released
        );
        Ok(())
    }

    /// Resolve and fully initialize a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type or one of its dependencies failed, and the
    /// errors of [`TypeLoader::resolve`]
    pub fn load(&self, module: ModuleId, token: Token) -> Result<TypeNodeRc> {
        let node = self.resolve(module, token)?;
        self.init(&node)?;
        Ok(node)
    }

    /// Initialize every type definition of a module in parallel
    ///
    /// Returns the diagnostics of the types that failed; a failed type does not stop the others.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] for an unknown module and propagates
    /// synchronization errors
    pub fn load_module(&self, module: ModuleId) -> Result<Vec<Arc<Diagnostic>>> {
        let reader = self.require_module(module)?.reader.clone();
        let tokens: Vec<Token> = (1..=reader.type_count())
            .map(|row| Token::from_parts(TableId::TYPE_DEF, row))
            .collect();

        let failures: Vec<Option<Arc<Diagnostic>>> = tokens
            .par_iter()
            .map(|token| match self.load(module, *token) {
                Ok(_) => Ok(None),
                Err(Error::TypeLoad(diagnostic)) => Ok(Some(diagnostic)),
                Err(Error::Malformed { message, .. }) => Ok(Some(Arc::new(Diagnostic::new(
                    FailureKind::MetadataMalformed,
                    token.to_string(),
                    message,
                )))),
                Err(other) => Err(other),
            })
            .collect::<Result<_>>()?;

        Ok(failures.into_iter().flatten().collect())
    }

    /// Run every construction stage of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn init(&self, node: &TypeNodeRc) -> Result<()> {
        self.ensure_supertypes(node)?;
        self.ensure_fields(node)?;
        self.ensure_vtable(node)?;
        self.settle(self.ensure_stage(node, Stage::Init, Self::build_init))
    }

    /// Resolve the parent of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn ensure_parent(&self, node: &TypeNodeRc) -> Result<Option<TypeNodeRc>> {
        self.settle(self.ensure_stage(node, Stage::Parent, Self::build_parent))?;
        Ok(node.parent())
    }

    /// Resolve the declared interfaces of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn ensure_interfaces(&self, node: &TypeNodeRc) -> Result<()> {
        self.settle(self.ensure_stage(node, Stage::Interfaces, Self::build_interfaces))
    }

    /// Build the supertype array of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn ensure_supertypes(&self, node: &TypeNodeRc) -> Result<()> {
        self.settle(self.ensure_stage(node, Stage::Supertypes, Self::build_supertypes))
    }

    /// Compute the instance layout of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn ensure_size(&self, node: &TypeNodeRc) -> Result<()> {
        self.settle(self.ensure_stage(node, Stage::Size, Self::build_layout))
    }

    /// Compute the instance and static layout of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn ensure_fields(&self, node: &TypeNodeRc) -> Result<()> {
        self.ensure_size(node)?;
        self.settle(self.ensure_stage(node, Stage::Fields, Self::build_statics))
    }

    /// Build the vtable and interface table of a type
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn ensure_vtable(&self, node: &TypeNodeRc) -> Result<()> {
        self.settle(self.ensure_stage(node, Stage::Vtable, Self::build_dispatch))
    }

    /// Instance layout of a type, computing it if needed
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn layout<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n FieldLayout> {
        self.require_layout(node)
    }

    /// Static layout of a type, computing it if needed
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn static_layout<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n StaticLayout> {
        self.ensure_fields(node)?;
        node.statics
            .get()
            .ok_or_else(|| self.partial_error(node, Stage::Fields))
    }

    fn settle(&self, progress: Result<Progress>) -> Result<()> {
        progress.map(|_| ())
    }

    /// Drive one stage of a node through the construction protocol
    pub(crate) fn ensure_stage(
        &self,
        node: &TypeNodeRc,
        stage: Stage,
        build: StageBuilder,
    ) -> Result<Progress> {
        if node.lifecycle.is_published(stage) && !self.placeholder_parent(node, stage) {
            return Ok(Progress::Done);
        }
        if let Some(failure) = node.failure() {
            return Err(Error::TypeLoad(failure));
        }

        let frame = match ConstructionFrame::enter(
            self.id,
            node.handle,
            stage,
            self.config.max_recursion_depth,
        ) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(Progress::InProgress),
            Err(error) => return Err(Error::TypeLoad(self.fail_with(node, error)?)),
        };

        let claimed = loop {
            if let Some(failure) = node.failure() {
                return Err(Error::TypeLoad(failure));
            }
            if node.lifecycle.claim(stage) {
                break true;
            }
            let placeholder = self.placeholder_parent(node, stage);
            if node.lifecycle.is_published(stage) && !placeholder {
                return Ok(Progress::Done);
            }
            // Only a thread holding no other claim may block on the owner
            if ConstructionFrame::depth() > 1 {
                log::trace!("computing {:?} of {} alongside its owner", stage, node.full_name());
                break false;
            }

            // A placeholder parent is owned by the definition's parent resolution
            let (owner, owner_stage) = match node.generic_definition() {
                Some(definition) if placeholder => (definition.clone(), Stage::Parent),
                _ => (node.clone(), stage),
            };
            if placeholder && owner.lifecycle.state(owner_stage) != StageState::Computing {
                break false;
            }
            self.signal.wait_while(|| {
                owner.lifecycle.state(owner_stage) == StageState::Computing && !owner.has_failure()
            })?;
            if placeholder && self.placeholder_parent(node, stage) {
                break false;
            }
        };

        let result = build(self, node);
        drop(frame);
        self.commit(node, stage, claimed, result)
    }

    /// The published parent of `node` is a placeholder that another thread still has to fix up
    fn placeholder_parent(&self, node: &TypeNodeRc, stage: Stage) -> bool {
        stage == Stage::Parent
            && node.parent_defaulted.load(Ordering::Acquire)
            && node.generic_definition().is_some_and(|definition| {
                !ConstructionFrame::is_active(self.id, definition.handle, Stage::Parent)
            })
    }

    /// Publish a computed stage, or record its failure, unless another thread committed first
    fn commit(
        &self,
        node: &TypeNodeRc,
        stage: Stage,
        claimed: bool,
        result: Result<()>,
    ) -> Result<Progress> {
        let outcome = self.lock.enter().and_then(|_guard| {
            if node.lifecycle.is_published(stage) {
                return Ok(Progress::Done);
            }
            if let Some(failure) = node.failure() {
                return Err(Error::TypeLoad(failure));
            }
            match result {
                Ok(()) => {
                    node.lifecycle.publish(stage);
                    Ok(Progress::Done)
                }
                Err(error) => match self.fail_with(node, error) {
                    Ok(diagnostic) => Err(Error::TypeLoad(diagnostic)),
                    Err(other) => Err(other),
                },
            }
        });

        if claimed {
            node.lifecycle.abandon(stage);
        }
        self.signal.notify()?;
        outcome
    }

    /// Turn a construction error into a failure recorded on `node`
    ///
    /// Synchronization errors are not type failures and are passed through.
    pub(crate) fn fail_with(&self, node: &TypeNodeRc, error: Error) -> Result<Arc<Diagnostic>> {
        let name = node.full_name();
        let diagnostic = match error {
            Error::Violation { kind, message } => Diagnostic::new(kind, name, message),
            Error::Malformed { message, .. } => {
                Diagnostic::new(FailureKind::MetadataMalformed, name, message)
            }
            Error::TypeNotFound(token) => Diagnostic::new(
                FailureKind::MetadataMalformed,
                name,
                format!("token {} does not resolve to a type", token),
            ),
            Error::ModuleNotFound(module) => Diagnostic::new(
                FailureKind::MetadataMalformed,
                name,
                format!("referenced module {} is not registered", module),
            ),
            Error::GenericArity {
                definition,
                expected,
                actual,
            } => Diagnostic::new(
                FailureKind::MetadataMalformed,
                name,
                format!("{definition} expects {expected} type arguments, got {actual}"),
            ),
            Error::RecursionLimit(limit) => Diagnostic::new(
                FailureKind::CyclicDefinition,
                name,
                format!("construction nested deeper than {limit} types"),
            ),
            Error::TypeLoad(cause) => {
                if node
                    .failure()
                    .is_some_and(|existing| Arc::ptr_eq(&existing, &cause))
                {
                    return Ok(cause);
                }
                Diagnostic::new(
                    FailureKind::DependencyFailed,
                    name,
                    format!("depends on {}", cause.type_name),
                )
                .caused_by(cause)
            }
            other => return Err(other),
        };
        Ok(self.record_failure(node, diagnostic))
    }

    /// Store a diagnostic on a node; the first failure of a node wins
    pub(crate) fn record_failure(&self, node: &TypeNodeRc, diagnostic: Diagnostic) -> Arc<Diagnostic> {
        if let Some(existing) = node.failure() {
            return existing;
        }
        let (stored, first) = node.fail_first(diagnostic);
        if first {
            self.stats.failure_recorded();
            log::warn!("type load failure: {}", stored);
        }
        stored
    }

    fn partial_error(&self, node: &TypeNodeRc, stage: Stage) -> Error {
        violation!(
            CyclicDefinition,
            "{} requires its own {:?} stage while building it",
            node.full_name(),
            stage
        )
    }

    /// Instance layout, treating re-entry as a cycle
    pub(crate) fn require_layout<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n FieldLayout> {
        match self.ensure_stage(node, Stage::Size, Self::build_layout)? {
            Progress::Done => node
                .layout
                .get()
                .ok_or_else(|| self.partial_error(node, Stage::Size)),
            Progress::InProgress => Err(self.partial_error(node, Stage::Size)),
        }
    }

    /// Supertype array, treating re-entry as a cycle
    pub(crate) fn require_supertypes<'n>(
        &self,
        node: &'n TypeNodeRc,
    ) -> Result<&'n [TypeNodeRc]> {
        match self.ensure_stage(node, Stage::Supertypes, Self::build_supertypes)? {
            Progress::Done => node
                .supertypes()
                .ok_or_else(|| self.partial_error(node, Stage::Supertypes)),
            Progress::InProgress => Err(self.partial_error(node, Stage::Supertypes)),
        }
    }

    /// Parent, treating re-entry as a cycle
    pub(crate) fn require_parent(&self, node: &TypeNodeRc) -> Result<Option<TypeNodeRc>> {
        match self.ensure_stage(node, Stage::Parent, Self::build_parent)? {
            Progress::Done => Ok(node.parent()),
            Progress::InProgress => Err(self.partial_error(node, Stage::Parent)),
        }
    }

    /// Dispatch data, treating re-entry as a cycle
    pub(crate) fn require_dispatch<'n>(
        &self,
        node: &'n TypeNodeRc,
    ) -> Result<&'n crate::typesystem::Dispatch> {
        match self.ensure_stage(node, Stage::Vtable, Self::build_dispatch)? {
            Progress::Done => node
                .dispatch
                .get()
                .ok_or_else(|| self.partial_error(node, Stage::Vtable)),
            Progress::InProgress => Err(self.partial_error(node, Stage::Vtable)),
        }
    }

    fn build_supertypes(&self, node: &TypeNodeRc) -> Result<()> {
        let mut supertypes = match self.require_parent(node)? {
            Some(parent) => {
                if let Some(failure) = parent.failure() {
                    return Err(Error::TypeLoad(failure));
                }
                self.require_supertypes(&parent)?.to_vec()
            }
            None => Vec::new(),
        };
        supertypes.push(node.clone());

        if node.supertypes.set(Arc::from(supertypes)).is_ok() {
            self.stats.supertypes_built();
        }
        Ok(())
    }

    fn build_init(&self, node: &TypeNodeRc) -> Result<()> {
        if node.is_generic_instance() && self.config.validate_constraints && !node.is_open {
            self.check_constraints(node)?;
        }
        self.require_properties(node)?;
        Ok(())
    }
}

impl Default for TypeLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{builder::MetadataBuilder, flags::FieldAttributes, signature::TypeSignature},
        test::*,
    };
    use std::time::{Duration, Instant};

    #[test]
    fn test_metadata_reads_run_outside_the_structural_lock() {
        let mut md = MetadataBuilder::new("App");
        let left = md
            .class("App", "Left")
            .field("a", FieldAttributes::PUBLIC, TypeSignature::I4)
            .build();
        let right = md
            .class("App", "Right")
            .field("b", FieldAttributes::PUBLIC, TypeSignature::I8)
            .build();

        // Each field read holds on until a read of the other type is in flight too
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let metadata = {
            let inside = inside.clone();
            let peak = peak.clone();
            HookedMetadata::new(md.build()).on_field_read(move |_| {
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let deadline = Instant::now() + Duration::from_secs(5);
                while peak.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                    std::thread::yield_now();
                }
                inside.fetch_sub(1, Ordering::SeqCst);
            })
        };
        let loader = TypeLoader::new();
        let module = loader.register_module("App", Arc::new(metadata)).unwrap();

        std::thread::scope(|scope| {
            for token in [left, right] {
                let loader = &loader;
                scope.spawn(move || loader.load(module, token).unwrap());
            }
        });
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(loader.stats().layouts_computed, 2);
    }

    #[test]
    fn test_loader_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeLoader>();
    }

    #[test]
    fn test_init_publishes_every_stage() {
        let (loader, module, tokens) = load_fixture(simple_hierarchy);
        let derived = loader.load(module, tokens.derived).unwrap();
        let flags = derived.lifecycle_flags();
        assert!(flags.contains(crate::typesystem::LifecycleFlags::INITED));
        assert!(flags.contains(crate::typesystem::LifecycleFlags::VTABLE_COMPUTED));
        assert!(flags.contains(crate::typesystem::LifecycleFlags::FIELDS_INITED));
        assert!(!derived.has_failure());
    }

    #[test]
    fn test_stages_run_once() {
        let (loader, module, tokens) = load_fixture(simple_hierarchy);
        let derived = loader.load(module, tokens.derived).unwrap();
        let before = loader.stats();
        loader.init(&derived).unwrap();
        loader.ensure_vtable(&derived).unwrap();
        loader.ensure_size(&derived).unwrap();
        assert_eq!(loader.stats(), before);
    }

    #[test]
    fn test_load_module_reports_failures() {
        let (loader, module, _) = load_fixture(broken_layouts);
        let failures = loader.load_module(module).unwrap();
        assert!(!failures.is_empty());
        assert!(failures
            .iter()
            .any(|diagnostic| diagnostic.root_cause().kind == FailureKind::LayoutViolation));
    }

    #[test]
    fn test_unload_module_releases_everything() {
        let (loader, module, tokens) = load_fixture(simple_hierarchy);
        let derived = loader.load(module, tokens.derived).unwrap();
        let iface = derived.interface_table().unwrap().interfaces[0].clone();
        let id = iface.interface_id().unwrap();
        assert!(loader.interface_ids().is_allocated(id).unwrap());

        let before = loader.registry().len();
        loader.unload_module(module).unwrap();
        assert!(loader.module(module).is_none());
        assert!(loader.registry().len() < before);
        assert!(!loader.interface_ids().is_allocated(id).unwrap());
        assert!(matches!(
            loader.resolve(module, tokens.derived),
            Err(Error::ModuleNotFound(_))
        ));
    }
}
