//! Substitution of generic arguments.
//!
//! Inflating a type replaces the generic parameters of one definition with concrete arguments
//! and re-canonicalizes everything built on top of them, so the result is always the same node
//! the loader would produce by resolving the substituted signature directly. Closed types are
//! returned unchanged.

use std::sync::Arc;

use crate::{
    loader::TypeLoader,
    typesystem::{MethodRc, TypeKind, TypeNodeRc},
    Result,
};

/// Maps the generic parameters of `definition` to `args`
#[derive(Clone, Copy)]
pub(crate) struct GenericContext<'a> {
    pub(crate) definition: &'a TypeNodeRc,
    pub(crate) args: &'a [TypeNodeRc],
}

impl<'a> GenericContext<'a> {
    pub(crate) fn new(definition: &'a TypeNodeRc, args: &'a [TypeNodeRc]) -> Self {
        GenericContext { definition, args }
    }

    /// The context of a generic instance, `None` for any other node
    pub(crate) fn of(instance: &'a TypeNodeRc) -> Option<Self> {
        match &instance.kind {
            TypeKind::GenericInstance { definition, args } => Some(GenericContext::new(definition, args)),
            _ => None,
        }
    }
}

impl TypeLoader {
    /// Substitute the arguments of `context` into `ty`
    pub(crate) fn inflate(&self, ty: &TypeNodeRc, context: &GenericContext<'_>) -> Result<TypeNodeRc> {
        if !ty.is_open {
            return Ok(ty.clone());
        }

        match &ty.kind {
            TypeKind::GenericParameter {
                owner: Some(owner),
                index,
                ..
            } if owner.points_to(context.definition) => {
                context.args.get(*index as usize).cloned().ok_or_else(|| {
                    malformed_error!(
                        "{} has no argument for parameter {}",
                        context.definition.full_name(),
                        index
                    )
                })
            }
            TypeKind::GenericParameter { .. } => Ok(ty.clone()),
            TypeKind::GenericInstance { definition, args } => {
                let inflated = args
                    .iter()
                    .map(|arg| self.inflate(arg, context))
                    .collect::<Result<Vec<_>>>()?;
                if inflated.iter().zip(args).all(|(a, b)| Arc::ptr_eq(a, b)) {
                    return Ok(ty.clone());
                }
                self.instantiate_node(definition, &inflated)
            }
            TypeKind::Array {
                element,
                rank,
                bounded,
            } => {
                let inflated = self.inflate(element, context)?;
                if Arc::ptr_eq(&inflated, element) {
                    return Ok(ty.clone());
                }
                self.array_of(&inflated, *rank, *bounded)
            }
            TypeKind::Pointer { pointee, managed } => {
                let inflated = self.inflate(pointee, context)?;
                if Arc::ptr_eq(&inflated, pointee) {
                    return Ok(ty.clone());
                }
                self.pointer_to(&inflated, *managed)
            }
            // The definition named inside its own context stands for its open instance
            TypeKind::Definition { .. } if Arc::ptr_eq(ty, context.definition) => {
                self.instantiate_node(ty, context.args)
            }
            TypeKind::Definition { .. } => Ok(ty.clone()),
        }
    }

    /// The method of the inflated declaring type that corresponds to `method`
    pub(crate) fn inflate_method(
        &self,
        method: &MethodRc,
        context: &GenericContext<'_>,
    ) -> Result<MethodRc> {
        let Some(declaring) = method.declaring_type() else {
            return Ok(method.clone());
        };
        if !declaring.is_open {
            return Ok(method.clone());
        }

        let target = self.inflate(&declaring, context)?;
        if Arc::ptr_eq(&target, &declaring) {
            return Ok(method.clone());
        }
        self.require_methods(&target)?
            .get(method.index)
            .cloned()
            .ok_or_else(|| {
                malformed_error!(
                    "{} has no method at index {}",
                    target.full_name(),
                    method.index
                )
            })
    }
}
