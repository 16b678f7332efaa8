//! Interface tables and vtables.
//!
//! A class definition's dispatch data is built by [`VtableBuilder`], a small state machine that
//! walks through the stages of [`VtableStage`]:
//!
//! 1. **InterfacesFlattened** - the parent's interfaces keep their offsets; declared interfaces
//!    follow, each with the interfaces it inherits, without duplicates.
//! 2. **SlotsReserved** - the parent's vtable is the prefix. Virtual methods either reuse the
//!    slot of the ancestor method they override or get a fresh slot. Interfaces new to this type
//!    get a block of slots each.
//! 3. **OverridesApplied** - explicit overrides, implicit name and signature matches, inherited
//!    implementations and default interface methods fill the interface slots. Class virtuals
//!    are installed and replaced methods are propagated.
//! 4. **ConflictsResolved** - competing default implementations are reduced to the most specific
//!    one. Slots where no single candidate wins are marked [`VtableSlot::Conflicted`].
//! 5. **Published** - concrete types must have every slot filled. A table equal to the parent's
//!    reuses the parent's allocation.
//!
//! Interfaces only number their own virtual methods. Generic instances, arrays, pointers and
//! generic parameters derive their dispatch data from the definition or the parent.

use std::{collections::HashMap, iter, sync::Arc};

use crate::{
    loader::{GenericContext, TypeLoader},
    metadata::{
        flags::MethodAttributes,
        token::{TableId, Token},
    },
    typesystem::{
        CompressedBitmap, DimConflict, Dispatch, InterfaceTable, MethodRc, MethodSignature,
        ModuleRc, TypeKind, TypeNodeRc, Vtable, VtableSlot,
    },
    Error, Result,
};

/// Progress of a vtable under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum VtableStage {
    NotStarted,
    InterfacesFlattened,
    SlotsReserved,
    OverridesApplied,
    ConflictsResolved,
    Published,
}

/// Identity of a method node, for override bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MethodKey(usize);

impl MethodKey {
    fn of(method: &MethodRc) -> Self {
        MethodKey(Arc::as_ptr(method) as usize)
    }
}

fn declared_by_interface(method: &MethodRc) -> bool {
    method
        .declaring_type()
        .is_some_and(|declaring| declaring.is_interface())
}

/// An explicit override: `body` implements `declaration`
struct ExplicitOverride {
    declaration: MethodRc,
    body: MethodRc,
}

/// An interface slot filled by name and signature matching
struct ImplicitMatch {
    method: MethodRc,
    position: usize,
    interface_method: MethodRc,
}

struct VtableBuilder<'a> {
    loader: &'a TypeLoader,
    node: &'a TypeNodeRc,
    stage: VtableStage,
    methods: &'a [MethodRc],
    supertypes: &'a [TypeNodeRc],
    parent_dispatch: Option<&'a Dispatch>,
    interfaces: Vec<TypeNodeRc>,
    offsets: Vec<u32>,
    inherited_interfaces: usize,
    slots: Vec<VtableSlot>,
    overrides: Vec<ExplicitOverride>,
    override_map: HashMap<MethodKey, MethodRc>,
    candidates: HashMap<MethodKey, (MethodRc, Vec<MethodRc>)>,
    implicit: Vec<ImplicitMatch>,
    conflicts: Vec<DimConflict>,
}

impl<'a> VtableBuilder<'a> {
    fn new(loader: &'a TypeLoader, node: &'a TypeNodeRc) -> Result<Self> {
        Ok(VtableBuilder {
            loader,
            node,
            stage: VtableStage::NotStarted,
            methods: loader.require_methods(node)?,
            supertypes: loader.require_supertypes(node)?,
            parent_dispatch: None,
            interfaces: Vec::new(),
            offsets: Vec::new(),
            inherited_interfaces: 0,
            slots: Vec::new(),
            overrides: Vec::new(),
            override_map: HashMap::new(),
            candidates: HashMap::new(),
            implicit: Vec::new(),
            conflicts: Vec::new(),
        })
    }

    fn advance(&mut self, stage: VtableStage) {
        log::trace!(
            "vtable of {}: {:?} -> {:?}",
            self.node.full_name(),
            self.stage,
            stage
        );
        self.stage = stage;
    }

    fn build(mut self, parent: Option<&'a TypeNodeRc>) -> Result<Dispatch> {
        self.flatten_interfaces(parent)?;
        self.advance(VtableStage::InterfacesFlattened);

        self.reserve_slots()?;
        self.advance(VtableStage::SlotsReserved);

        self.overrides = self.loader.explicit_overrides(self.node)?;
        for entry in &self.overrides {
            self.verify_override(entry)?;
        }
        self.apply_overrides()?;
        self.advance(VtableStage::OverridesApplied);

        self.resolve_conflicts()?;
        self.advance(VtableStage::ConflictsResolved);

        self.check_concrete()?;
        for (position, slot) in self.slots.iter().enumerate() {
            if let VtableSlot::Method(method) = slot {
                if method.declaring.points_to(self.node) {
                    let _ = method.slot.set(position as u32);
                }
            }
        }

        let bitmap = self.loader.interface_bitmap(&self.interfaces)?;
        let vtable = self.loader.share_or_allocate(self.node, self.slots)?;
        log::trace!(
            "vtable of {}: {:?} -> {:?}",
            self.node.full_name(),
            self.stage,
            VtableStage::Published
        );
        Ok(Dispatch {
            vtable,
            interfaces: InterfaceTable {
                interfaces: self.interfaces,
                offsets: self.offsets,
                bitmap,
            },
            conflicts: self.conflicts,
        })
    }

    fn flatten_interfaces(&mut self, parent: Option<&'a TypeNodeRc>) -> Result<()> {
        if let Some(parent) = parent {
            if let Some(failure) = parent.failure() {
                return Err(Error::TypeLoad(failure));
            }
            let inherited = self.loader.require_dispatch(parent)?;
            self.interfaces = inherited.interfaces.interfaces.clone();
            self.offsets = inherited.interfaces.offsets.clone();
            self.slots = inherited.vtable.to_vec();
            self.parent_dispatch = Some(inherited);
        }
        self.inherited_interfaces = self.interfaces.len();

        for declared in self.loader.require_interfaces(self.node)? {
            self.loader
                .flatten_interface(declared, &mut self.interfaces)?;
        }
        for interface in &self.interfaces[self.inherited_interfaces..] {
            self.loader.require_dispatch(interface)?;
        }
        Ok(())
    }

    /// Slot of the nearest ancestor method this method overrides
    fn inherited_slot(&self, method: &MethodRc) -> Result<Option<u32>> {
        for ancestor in self.supertypes.iter().rev().skip(1) {
            let found = self
                .loader
                .require_methods(ancestor)?
                .iter()
                .find(|candidate| candidate.is_virtual() && candidate.matches(method))
                .and_then(|candidate| candidate.slot());
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// The method implements a method of one of the flattened interfaces by name and signature
    fn implements_interface_method(&self, method: &MethodRc) -> Result<bool> {
        for interface in &self.interfaces {
            if self
                .loader
                .require_methods(interface)?
                .iter()
                .any(|candidate| candidate.is_virtual() && candidate.matches(method))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reserve_slots(&mut self) -> Result<()> {
        for method in self.methods.iter().filter(|method| method.is_virtual()) {
            if !method.flags.contains(MethodAttributes::NEW_SLOT) {
                if let Some(slot) = self.inherited_slot(method)? {
                    log::trace!("{} reuses slot {}", method.full_name(), slot);
                    let _ = method.slot.set(slot);
                    continue;
                }
            }
            if method
                .flags
                .contains(MethodAttributes::NEW_SLOT | MethodAttributes::FINAL)
                && self.implements_interface_method(method)?
            {
                log::trace!("{} only implements an interface", method.full_name());
                continue;
            }

            let slot = self.slots.len() as u32;
            log::trace!("{} gets new slot {}", method.full_name(), slot);
            let _ = method.slot.set(slot);
            self.slots.push(VtableSlot::Empty);
        }

        for interface in &self.interfaces[self.inherited_interfaces..] {
            let offset = self.slots.len() as u32;
            let count = self
                .loader
                .require_methods(interface)?
                .iter()
                .filter(|method| method.is_virtual())
                .count();
            log::trace!(
                "{} starts at offset {} with {} slots",
                interface.full_name(),
                offset,
                count
            );
            self.offsets.push(offset);
            self.slots
                .extend(iter::repeat(VtableSlot::Empty).take(count));
        }
        Ok(())
    }

    /// `base` is `derived`, one of its ancestors or one of its interfaces
    fn derives_from(&self, base: &TypeNodeRc, derived: &TypeNodeRc) -> Result<bool> {
        if Arc::ptr_eq(base, derived) {
            return Ok(true);
        }
        if Arc::ptr_eq(derived, self.node) {
            return Ok(self
                .interfaces
                .iter()
                .chain(self.supertypes)
                .any(|candidate| Arc::ptr_eq(candidate, base)));
        }
        self.loader.is_assignable_from(base, derived)
    }

    fn verify_override(&self, entry: &ExplicitOverride) -> Result<()> {
        let ExplicitOverride { declaration, body } = entry;
        if !body.declaring.points_to(self.node) {
            return Err(malformed_error!(
                "override body {} does not belong to {}",
                body.full_name(),
                self.node.full_name()
            ));
        }
        if declaration.flags.contains(MethodAttributes::STATIC)
            != body.flags.contains(MethodAttributes::STATIC)
        {
            return Err(malformed_error!(
                "{} and {} differ in static-ness",
                body.full_name(),
                declaration.full_name()
            ));
        }
        if !body.is_virtual() {
            return Err(malformed_error!(
                "override body {} is not virtual",
                body.full_name()
            ));
        }
        if !declaration.is_virtual() {
            return Err(malformed_error!(
                "overridden method {} is not virtual",
                declaration.full_name()
            ));
        }
        let declaring = declaration.declaring_type().ok_or_else(|| {
            malformed_error!("declaring type of {} was unloaded", declaration.name)
        })?;
        if !self.derives_from(&declaring, self.node)? {
            return Err(malformed_error!(
                "{} overrides {}, which it does not inherit",
                self.node.full_name(),
                declaration.full_name()
            ));
        }
        Ok(())
    }

    /// Absolute vtable position of a virtual method of an ancestor or interface
    fn position_of(&self, method: &MethodRc) -> Result<usize> {
        let slot = method
            .slot()
            .ok_or_else(|| malformed_error!("{} has no vtable slot", method.full_name()))?;
        let declaring = method.declaring_type().ok_or_else(|| {
            malformed_error!("declaring type of {} was unloaded", method.name)
        })?;

        let position = if declaring.is_interface() {
            let index = self
                .interfaces
                .iter()
                .position(|interface| Arc::ptr_eq(interface, &declaring))
                .ok_or_else(|| {
                    malformed_error!(
                        "{} does not implement {}",
                        self.node.full_name(),
                        declaring.full_name()
                    )
                })?;
            self.offsets[index] + slot
        } else {
            slot
        };

        let position = position as usize;
        if position >= self.slots.len() {
            return Err(malformed_error!(
                "slot {} of {} is outside the vtable",
                position,
                method.full_name()
            ));
        }
        Ok(position)
    }

    fn apply_override(&mut self, declaration: &MethodRc, body: &MethodRc) -> Result<()> {
        let position = self.position_of(declaration)?;

        // A class implementation is never displaced by a default interface method
        if declared_by_interface(body) {
            if let VtableSlot::Method(existing) = &self.slots[position] {
                if !declared_by_interface(existing) {
                    return Ok(());
                }
            }
        }

        log::trace!(
            "slot {}: {} overrides {}",
            position,
            body.full_name(),
            declaration.full_name()
        );
        self.slots[position] = VtableSlot::Method(body.clone());

        let key = MethodKey::of(declaration);
        if let Some(previous) = self.override_map.insert(key, body.clone()) {
            let (_, candidates) = self
                .candidates
                .entry(key)
                .or_insert_with(|| (declaration.clone(), Vec::new()));
            let own_default = (!declaration.is_abstract()).then(|| declaration.clone());
            for candidate in [Some(body.clone()), Some(previous), own_default]
                .into_iter()
                .flatten()
            {
                if !candidates.iter().any(|seen| Arc::ptr_eq(seen, &candidate)) {
                    candidates.push(candidate);
                }
            }
        }
        Ok(())
    }

    /// A public virtual method of this type with the name and signature of `interface_method`
    fn implicit_implementation(&self, interface_method: &MethodRc) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|method| {
                method.is_virtual() && method.flags.is_public() && method.matches(interface_method)
            })
            .cloned()
    }

    /// The most recently introduced class method of the parent's vtable that matches
    fn inherited_implementation(&self, interface_method: &MethodRc) -> Option<MethodRc> {
        let parent = self.parent_dispatch?;
        parent.vtable.iter().rev().find_map(|slot| {
            slot.method()
                .filter(|method| !declared_by_interface(method) && method.matches(interface_method))
                .cloned()
        })
    }

    fn apply_overrides(&mut self) -> Result<()> {
        // Default implementations that interfaces provide for methods of other interfaces
        for interface in self.interfaces.clone() {
            for entry in self.loader.explicit_overrides(&interface)? {
                self.apply_override(&entry.declaration, &entry.body)?;
            }
        }

        let overrides = std::mem::take(&mut self.overrides);
        for entry in overrides
            .iter()
            .filter(|entry| declared_by_interface(&entry.declaration))
        {
            self.apply_override(&entry.declaration, &entry.body)?;
        }

        for (index, interface) in self.interfaces.clone().iter().enumerate() {
            let offset = self.offsets[index] as usize;
            for interface_method in self
                .loader
                .require_methods(interface)?
                .iter()
                .filter(|method| method.is_virtual())
            {
                let Some(slot) = interface_method.slot() else {
                    continue;
                };
                let position = offset + slot as usize;
                let key = MethodKey::of(interface_method);
                if self
                    .override_map
                    .get(&key)
                    .is_some_and(|body| !declared_by_interface(body))
                {
                    continue;
                }

                if let Some(method) = self.implicit_implementation(interface_method) {
                    log::trace!(
                        "slot {}: {} implements {}",
                        position,
                        method.full_name(),
                        interface_method.full_name()
                    );
                    self.slots[position] = VtableSlot::Method(method.clone());
                    self.candidates.remove(&key);
                    self.implicit.push(ImplicitMatch {
                        method,
                        position,
                        interface_method: interface_method.clone(),
                    });
                    continue;
                }
                if !self.slots[position].is_empty() {
                    continue;
                }
                if let Some(method) = self.inherited_implementation(interface_method) {
                    log::trace!(
                        "slot {}: inherited {} implements {}",
                        position,
                        method.full_name(),
                        interface_method.full_name()
                    );
                    self.slots[position] = VtableSlot::Method(method);
                } else if !interface_method.is_abstract() {
                    log::trace!(
                        "slot {}: default {}",
                        position,
                        interface_method.full_name()
                    );
                    self.slots[position] = VtableSlot::Method(interface_method.clone());
                }
            }
        }

        for method in self.methods.iter().filter(|method| method.is_virtual()) {
            let Some(slot) = method.slot.get().map(|slot| *slot as usize) else {
                continue;
            };
            if let VtableSlot::Method(previous) = &self.slots[slot] {
                if !Arc::ptr_eq(previous, method) {
                    self.override_map
                        .insert(MethodKey::of(previous), method.clone());
                }
            }
            self.slots[slot] = VtableSlot::Method(method.clone());
        }

        for entry in overrides
            .iter()
            .filter(|entry| !declared_by_interface(&entry.declaration))
        {
            let position = self.position_of(&entry.declaration)?;
            log::trace!(
                "slot {}: {} explicitly overrides {}",
                position,
                entry.body.full_name(),
                entry.declaration.full_name()
            );
            self.slots[position] = VtableSlot::Method(entry.body.clone());
            self.override_map
                .insert(MethodKey::of(&entry.declaration), entry.body.clone());
        }
        self.overrides = overrides;

        if !self.override_map.is_empty() {
            let limit = self.override_map.len();
            for slot in &mut self.slots {
                let VtableSlot::Method(method) = slot else {
                    continue;
                };
                let mut current = method.clone();
                for _ in 0..limit {
                    match self.override_map.get(&MethodKey::of(&current)) {
                        Some(next) if !Arc::ptr_eq(next, &current) => current = next.clone(),
                        _ => break,
                    }
                }
                if !Arc::ptr_eq(&current, method) {
                    *slot = VtableSlot::Method(current);
                }
            }
        }
        Ok(())
    }

    /// `candidate` is dominated by a different, more specific one among `all`
    fn less_specific(&self, candidate: &MethodRc, all: &[MethodRc]) -> Result<bool> {
        let Some(declaring) = candidate.declaring_type() else {
            return Ok(true);
        };
        for other in all {
            if Arc::ptr_eq(other, candidate) {
                continue;
            }
            let Some(other_declaring) = other.declaring_type() else {
                continue;
            };
            if !Arc::ptr_eq(&declaring, &other_declaring)
                && self.derives_from(&declaring, &other_declaring)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_conflicts(&mut self) -> Result<()> {
        let mut pending: Vec<(usize, Vec<MethodRc>)> = Vec::new();
        for (declaration, candidates) in std::mem::take(&mut self.candidates).into_values() {
            pending.push((self.position_of(&declaration)?, candidates));
        }
        pending.sort_by_key(|(position, _)| *position);

        for (position, candidates) in pending {
            let mut remaining = Vec::new();
            for candidate in &candidates {
                if !self.less_specific(candidate, &candidates)? {
                    remaining.push(candidate.clone());
                }
            }

            if let [winner] = remaining.as_slice() {
                log::trace!("slot {}: {} is most specific", position, winner.full_name());
                self.slots[position] = VtableSlot::Method(winner.clone());
            } else {
                log::trace!("slot {}: {} candidates conflict", position, remaining.len());
                self.slots[position] = VtableSlot::Conflicted;
                self.conflicts.push(DimConflict {
                    slot: position as u32,
                    candidates: remaining,
                });
            }
        }

        self.ambiguous_implicit_matches()?;

        // Conflicts inherited unchanged from the parent
        if let Some(parent) = self.parent_dispatch {
            for inherited in &parent.conflicts {
                let position = inherited.slot as usize;
                if matches!(self.slots.get(position), Some(VtableSlot::Conflicted))
                    && !self
                        .conflicts
                        .iter()
                        .any(|conflict| conflict.slot == inherited.slot)
                {
                    self.conflicts.push(inherited.clone());
                }
            }
        }
        self.conflicts.sort_by_key(|conflict| conflict.slot);
        Ok(())
    }

    /// One method of the type matching default methods of unrelated interfaces
    fn ambiguous_implicit_matches(&mut self) -> Result<()> {
        let mut groups: Vec<(MethodKey, Vec<usize>)> = Vec::new();
        for (index, found) in self.implicit.iter().enumerate() {
            let key = MethodKey::of(&found.method);
            match groups.iter_mut().find(|(seen, _)| *seen == key) {
                Some((_, members)) => members.push(index),
                None => groups.push((key, vec![index])),
            }
        }

        for (_, members) in groups {
            let method = &self.implicit[members[0]].method;
            if members.len() < 2
                || self
                    .overrides
                    .iter()
                    .any(|entry| Arc::ptr_eq(&entry.body, method))
            {
                continue;
            }

            let defaults: Vec<&ImplicitMatch> = members
                .iter()
                .map(|index| &self.implicit[*index])
                .filter(|found| !found.interface_method.is_abstract())
                .collect();
            let mut ambiguous: Vec<usize> = Vec::new();
            for (i, first) in defaults.iter().enumerate() {
                for second in &defaults[i + 1..] {
                    let (Some(a), Some(b)) = (
                        first.interface_method.declaring_type(),
                        second.interface_method.declaring_type(),
                    ) else {
                        continue;
                    };
                    if !self.derives_from(&a, &b)? && !self.derives_from(&b, &a)? {
                        for position in [first.position, second.position] {
                            if !ambiguous.contains(&position) {
                                ambiguous.push(position);
                            }
                        }
                    }
                }
            }

            if ambiguous.is_empty() {
                continue;
            }
            let candidates: Vec<MethodRc> = defaults
                .iter()
                .filter(|found| ambiguous.contains(&found.position))
                .map(|found| found.interface_method.clone())
                .collect();
            for position in ambiguous {
                log::trace!(
                    "slot {}: {} matches several default implementations",
                    position,
                    method.full_name()
                );
                self.slots[position] = VtableSlot::Conflicted;
                self.conflicts.push(DimConflict {
                    slot: position as u32,
                    candidates: candidates.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_concrete(&self) -> Result<()> {
        if self.node.is_abstract() {
            return Ok(());
        }
        for (position, slot) in self.slots.iter().enumerate() {
            match slot {
                VtableSlot::Empty => {
                    return Err(violation!(
                        DispatchUnsatisfied,
                        "{} leaves {} unimplemented",
                        self.node.full_name(),
                        self.describe_slot(position)
                    ))
                }
                VtableSlot::Method(method) if method.is_abstract() => {
                    return Err(violation!(
                        DispatchUnsatisfied,
                        "{} does not implement abstract {}",
                        self.node.full_name(),
                        method.full_name()
                    ))
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn describe_slot(&self, position: usize) -> String {
        for (index, interface) in self.interfaces.iter().enumerate() {
            let offset = self.offsets[index] as usize;
            if let Some(method) = interface.methods().and_then(|methods| {
                methods
                    .iter()
                    .filter(|method| method.is_virtual())
                    .find(|method| method.slot().is_some_and(|slot| offset + slot as usize == position))
            }) {
                return method.full_name();
            }
        }
        format!("slot {position}")
    }
}

impl TypeLoader {
    pub(crate) fn build_dispatch(&self, node: &TypeNodeRc) -> Result<()> {
        self.require_supertypes(node)?;
        let dispatch = match &node.kind {
            TypeKind::GenericInstance { definition, args } => {
                self.instance_dispatch(node, definition, args)?
            }
            TypeKind::Definition { .. } if node.is_interface() => self.interface_dispatch(node)?,
            TypeKind::Definition { .. } => {
                let parent = self.require_parent(node)?;
                VtableBuilder::new(self, node)?.build(parent.as_ref())?
            }
            TypeKind::Array { .. } | TypeKind::Pointer { .. } | TypeKind::GenericParameter { .. } => {
                self.inherited_dispatch(node)?
            }
        };

        let shared = node
            .parent()
            .and_then(|parent| parent.vtable().cloned())
            .is_some_and(|parent| Arc::ptr_eq(&parent, &dispatch.vtable));
        log::debug!(
            "vtable of {}: {} slots, {} interfaces{}",
            node.full_name(),
            dispatch.vtable.len(),
            dispatch.interfaces.interfaces.len(),
            if shared { ", shared with parent" } else { "" }
        );
        if node.dispatch.set(dispatch).is_ok() {
            self.stats.vtable_built(shared);
        }
        Ok(())
    }

    /// Append `interface` and the interfaces it inherits, pre-order, skipping known ones
    pub(crate) fn flatten_interface(
        &self,
        interface: &TypeNodeRc,
        out: &mut Vec<TypeNodeRc>,
    ) -> Result<()> {
        if out.iter().any(|seen| Arc::ptr_eq(seen, interface)) {
            return Ok(());
        }
        if let Some(failure) = interface.failure() {
            return Err(Error::TypeLoad(failure));
        }
        out.push(interface.clone());
        for inherited in self.require_interfaces(interface)? {
            self.flatten_interface(inherited, out)?;
        }
        Ok(())
    }

    fn interface_bitmap(&self, interfaces: &[TypeNodeRc]) -> Result<CompressedBitmap> {
        let ids = interfaces
            .iter()
            .map(|interface| self.iids.assign(interface))
            .collect::<Result<Vec<_>>>()?;
        Ok(CompressedBitmap::from_ids(ids))
    }

    /// The parent's vtable if `slots` equals it, a new table otherwise
    fn share_or_allocate(&self, node: &TypeNodeRc, slots: Vec<VtableSlot>) -> Result<Vtable> {
        if self.config.share_vtables {
            if let Some(parent) = node.parent() {
                let inherited = &self.require_dispatch(&parent)?.vtable;
                if inherited.len() == slots.len()
                    && inherited.iter().zip(&slots).all(|(a, b)| a.same_as(b))
                {
                    return Ok(inherited.clone());
                }
            }
        }
        Ok(Vtable::from(slots))
    }

    fn interface_dispatch(&self, node: &TypeNodeRc) -> Result<Dispatch> {
        let mut interfaces = vec![node.clone()];
        for declared in self.require_interfaces(node)? {
            self.flatten_interface(declared, &mut interfaces)?;
        }

        for (slot, method) in self
            .require_methods(node)?
            .iter()
            .filter(|method| method.is_virtual())
            .enumerate()
        {
            let _ = method.slot.set(slot as u32);
        }

        Ok(Dispatch {
            vtable: Vtable::from(Vec::new()),
            interfaces: InterfaceTable {
                bitmap: self.interface_bitmap(&interfaces)?,
                interfaces,
                offsets: Vec::new(),
            },
            conflicts: Vec::new(),
        })
    }

    fn inherited_dispatch(&self, node: &TypeNodeRc) -> Result<Dispatch> {
        let vtable = match self.require_parent(node)? {
            Some(parent) => self.require_dispatch(&parent)?.vtable.clone(),
            None => Vtable::from(Vec::new()),
        };

        let mut interfaces = Vec::new();
        if node.is_generic_parameter() {
            for constraint in self.param_constraints(node)? {
                if constraint.is_interface() {
                    self.flatten_interface(constraint, &mut interfaces)?;
                }
            }
        }

        Ok(Dispatch {
            vtable,
            interfaces: InterfaceTable {
                bitmap: self.interface_bitmap(&interfaces)?,
                interfaces,
                offsets: Vec::new(),
            },
            conflicts: Vec::new(),
        })
    }

    /// Positional copy of the definition's dispatch data, inflated into the instance
    fn instance_dispatch(
        &self,
        node: &TypeNodeRc,
        definition: &TypeNodeRc,
        args: &[TypeNodeRc],
    ) -> Result<Dispatch> {
        let source = self.require_dispatch(definition)?;
        let context = GenericContext::new(definition, args);

        let mut interfaces: Vec<TypeNodeRc> = Vec::new();
        let mut offsets = Vec::new();
        for (index, interface) in source.interfaces.interfaces.iter().enumerate() {
            let inflated = self.inflate(interface, &context)?;
            if let Some(failure) = inflated.failure() {
                return Err(Error::TypeLoad(failure));
            }
            // Interfaces that collapse into one keep the first offset
            if interfaces.iter().any(|seen| Arc::ptr_eq(seen, &inflated)) {
                continue;
            }
            interfaces.push(inflated);
            if let Some(offset) = source.interfaces.offsets.get(index) {
                offsets.push(*offset);
            }
        }

        let slots = source
            .vtable
            .iter()
            .map(|slot| match slot {
                VtableSlot::Method(method) => {
                    Ok(VtableSlot::Method(self.inflate_method(method, &context)?))
                }
                other => Ok(other.clone()),
            })
            .collect::<Result<Vec<_>>>()?;

        let conflicts = source
            .conflicts
            .iter()
            .map(|conflict| {
                Ok(DimConflict {
                    slot: conflict.slot,
                    candidates: conflict
                        .candidates
                        .iter()
                        .map(|method| self.inflate_method(method, &context))
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Dispatch {
            vtable: self.share_or_allocate(node, slots)?,
            interfaces: InterfaceTable {
                bitmap: self.interface_bitmap(&interfaces)?,
                interfaces,
                offsets,
            },
            conflicts,
        })
    }

    /// Explicit overrides declared by a type, inflated for generic instances
    fn explicit_overrides(&self, node: &TypeNodeRc) -> Result<Vec<ExplicitOverride>> {
        let (definition, context) = match &node.kind {
            TypeKind::GenericInstance { definition, args } => {
                (definition, Some(GenericContext::new(definition, args)))
            }
            _ => (node, None),
        };
        let TypeKind::Definition { token, .. } = &definition.kind else {
            return Ok(Vec::new());
        };
        if definition.primitive.is_some() {
            return Ok(Vec::new());
        }

        let module = self.require_module(definition.module)?;
        let methods = self.require_methods(definition)?;
        let mut overrides = Vec::new();
        for row in module.reader.read_method_impls(*token)? {
            let body = methods
                .iter()
                .find(|method| method.token == row.body)
                .cloned()
                .ok_or_else(|| {
                    malformed_error!(
                        "override body {} is not a method of {}",
                        row.body,
                        definition.full_name()
                    )
                })?;
            let declaration = self.resolve_method(&module, definition, row.declaration)?;
            overrides.push(match &context {
                Some(context) => ExplicitOverride {
                    declaration: self.inflate_method(&declaration, context)?,
                    body: self.inflate_method(&body, context)?,
                },
                None => ExplicitOverride { declaration, body },
            });
        }
        Ok(overrides)
    }

    /// Resolve a `MethodDef` or `MemberRef` token seen from the definition `owner`
    fn resolve_method(&self, module: &ModuleRc, owner: &TypeNodeRc, token: Token) -> Result<MethodRc> {
        match token.table() {
            TableId::METHOD_DEF => {
                let mut scope: Vec<TypeNodeRc> = self.require_supertypes(owner)?.to_vec();
                let mut interfaces = Vec::new();
                for ty in &scope {
                    for interface in self.require_interfaces(ty)? {
                        self.flatten_interface(interface, &mut interfaces)?;
                    }
                }
                scope.extend(interfaces);

                for ty in scope.iter().rev() {
                    let source = ty.generic_definition().unwrap_or(ty);
                    if source.module != module.id {
                        continue;
                    }
                    if let Some(method) = self
                        .require_methods(ty)?
                        .iter()
                        .find(|method| method.token == token)
                    {
                        return Ok(method.clone());
                    }
                }
                Err(malformed_error!(
                    "method {} is not visible from {}",
                    token,
                    owner.full_name()
                ))
            }
            TableId::MEMBER_REF => {
                let row = module.reader.read_member_ref(token)?;
                let target = self.resolve_token(module, row.parent, owner.generic_params())?;
                if let Some(failure) = target.failure() {
                    return Err(Error::TypeLoad(failure));
                }

                let definition = target.generic_definition().unwrap_or(&target).clone();
                let params = definition.generic_params();
                let signature = MethodSignature {
                    has_this: row.signature.has_this,
                    generic_count: row.signature.param_count_generic,
                    return_type: self.resolve_sig(module, &row.signature.return_type, params)?,
                    params: row
                        .signature
                        .params
                        .iter()
                        .map(|param| self.resolve_sig(module, param, params))
                        .collect::<Result<Vec<_>>>()?,
                };
                let index = self
                    .require_methods(&definition)?
                    .iter()
                    .position(|method| method.name == row.name && method.signature == signature)
                    .ok_or_else(|| {
                        malformed_error!(
                            "{} has no method {} matching {:?}",
                            definition.full_name(),
                            row.name,
                            signature
                        )
                    })?;
                self.require_methods(&target)?
                    .get(index)
                    .cloned()
                    .ok_or_else(|| malformed_error!("{} lost method {}", target.full_name(), index))
            }
            _ => Err(malformed_error!("token {} does not name a method", token)),
        }
    }
}
