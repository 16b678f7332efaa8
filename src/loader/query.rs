//! Dispatch and assignability queries.
//!
//! These are the entry points a runtime uses once types are loaded: slot lookup for virtual
//! calls, interface offsets for interface dispatch, type compatibility checks for casts, and
//! access to stored failures. Each query builds the stages it needs and surfaces a failed type
//! as [`Error::TypeLoad`].

use std::sync::Arc;

use crate::{
    loader::TypeLoader,
    typesystem::{
        Diagnostic, DimConflict, MethodRc, PrimitiveKind, TypeKind, TypeNodeRc, Vtable, VtableSlot,
    },
    Error, Result,
};

impl TypeLoader {
    /// The vtable of a type, building it if needed
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if the type failed to load
    pub fn vtable(&self, node: &TypeNodeRc) -> Result<Vtable> {
        Ok(self.require_dispatch(node)?.vtable.clone())
    }

    /// Index into the vtable of `node` that dispatches `method`
    ///
    /// Class methods keep the slot they were given in their declaring type. Interface methods
    /// are found at the interface's offset in `node` plus their slot within the interface.
    ///
    /// ## Arguments
    /// * 'node'   - The receiver type
    /// * 'method' - A virtual method of an ancestor of `node` or of an interface it implements
    ///
    /// # Errors
    /// Returns [`Error::NotVirtual`] for methods without a slot, [`Error::NotImplemented`] if
    /// `node` does not inherit the method, and [`Error::TypeLoad`] for failed types
    pub fn vtable_slot(&self, node: &TypeNodeRc, method: &MethodRc) -> Result<u32> {
        if !method.is_virtual() {
            return Err(Error::NotVirtual(method.full_name()));
        }
        let dispatch = self.require_dispatch(node)?;
        let declaring = method
            .declaring_type()
            .ok_or_else(|| malformed_error!("declaring type of {} was unloaded", method.name))?;
        self.require_dispatch(&declaring)?;
        let slot = method
            .slot()
            .ok_or_else(|| Error::NotVirtual(method.full_name()))?;

        let not_implemented = || Error::NotImplemented {
            type_name: node.full_name(),
            declaring: declaring.full_name(),
        };
        if declaring.is_interface() {
            if node.is_interface() {
                return if dispatch.interfaces.contains(&declaring) {
                    Ok(slot)
                } else {
                    Err(not_implemented())
                };
            }
            let offset = dispatch
                .interfaces
                .offset_of(&declaring)
                .ok_or_else(not_implemented)?;
            return Ok(offset + slot);
        }

        if self
            .require_supertypes(node)?
            .iter()
            .any(|ancestor| Arc::ptr_eq(ancestor, &declaring))
        {
            Ok(slot)
        } else {
            Err(not_implemented())
        }
    }

    /// Vtable offset of `interface` in `node`, `None` if it is not implemented
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if the type failed to load
    pub fn interface_offset(&self, node: &TypeNodeRc, interface: &TypeNodeRc) -> Result<Option<u32>> {
        Ok(self.require_dispatch(node)?.interfaces.offset_of(interface))
    }

    /// The implementation a virtual call of `method` on a `node` receiver runs
    ///
    /// # Errors
    /// Returns [`Error::DispatchConflict`] for a slot with competing default implementations,
    /// [`Error::AbstractSlot`] for a slot without a body, and the errors of
    /// [`TypeLoader::vtable_slot`]
    pub fn resolve_virtual_call(&self, node: &TypeNodeRc, method: &MethodRc) -> Result<MethodRc> {
        let slot = self.vtable_slot(node, method)?;
        let abstract_slot = || Error::AbstractSlot {
            type_name: node.full_name(),
            slot,
        };

        if node.is_interface() {
            return if method.is_abstract() {
                Err(abstract_slot())
            } else {
                Ok(method.clone())
            };
        }

        match self.require_dispatch(node)?.vtable.get(slot as usize) {
            Some(VtableSlot::Method(target)) if !target.is_abstract() => Ok(target.clone()),
            Some(VtableSlot::Method(_) | VtableSlot::Empty) => Err(abstract_slot()),
            Some(VtableSlot::Conflicted) => Err(Error::DispatchConflict {
                type_name: node.full_name(),
                slot,
            }),
            None => Err(malformed_error!(
                "slot {} is outside the vtable of {}",
                slot,
                node.full_name()
            )),
        }
    }

    /// Default implementation conflicts of a type
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if the type failed to load
    pub fn dim_conflicts<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [DimConflict]> {
        Ok(self.require_dispatch(node)?.conflicts.as_slice())
    }

    /// The failure stored on a type, if any
    #[must_use]
    pub fn has_failure(&self, node: &TypeNodeRc) -> Option<Arc<Diagnostic>> {
        node.failure()
    }

    /// True if a value of type `candidate` can be stored in a location of type `target`
    ///
    /// Classes are checked against the supertype array, interfaces against the interface
    /// bitmap. Arrays of reference types are covariant in their element type; arrays of value
    /// types require identical elements. A generic parameter is assignable wherever one of its
    /// constraints is.
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if either type failed to load
    pub fn is_assignable_from(&self, target: &TypeNodeRc, candidate: &TypeNodeRc) -> Result<bool> {
        if Arc::ptr_eq(target, candidate) {
            return Ok(true);
        }
        for node in [target, candidate] {
            if let Some(failure) = node.failure() {
                return Err(Error::TypeLoad(failure));
            }
        }
        if target.is_pointer() || candidate.is_pointer() {
            return Ok(false);
        }
        if target.primitive == Some(PrimitiveKind::Object) {
            return Ok(true);
        }

        if candidate.is_generic_parameter() {
            for constraint in self.param_constraints(candidate)? {
                if self.is_assignable_from(target, constraint)? {
                    return Ok(true);
                }
            }
        }

        if let (
            TypeKind::Array {
                element: target_element,
                rank: target_rank,
                bounded: target_bounded,
            },
            TypeKind::Array {
                element,
                rank,
                bounded,
            },
        ) = (&target.kind, &candidate.kind)
        {
            if target_rank != rank || target_bounded != bounded {
                return Ok(false);
            }
            if target_element.is_value_type()
                || element.is_value_type()
                || target_element.is_pointer()
                || element.is_pointer()
            {
                return Ok(Arc::ptr_eq(target_element, element));
            }
            return self.is_assignable_from(target_element, element);
        }

        if target.is_interface() {
            let interfaces = &self.require_dispatch(candidate)?.interfaces;
            return Ok(target
                .interface_id()
                .is_some_and(|id| interfaces.bitmap.contains(id) && interfaces.contains(target)));
        }

        let depth = self.require_supertypes(target)?.len();
        Ok(self
            .require_supertypes(candidate)?
            .get(depth - 1)
            .is_some_and(|ancestor| Arc::ptr_eq(ancestor, target)))
    }
}
