//! Decoded type and method signatures as handed over by a [`crate::metadata::reader::MetadataReader`].
//!
//! Signatures reference other types by module-local [`Token`]. The loader resolves them into
//! canonical type nodes, so two signatures naming the same type through different tokens compare
//! equal once resolved.

use crate::{metadata::token::Token, typesystem::PrimitiveKind};

/// A type as it appears inside a field, method, or `TypeSpec` signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    /// void, only valid as a return type
    #[default]
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// System.String
    String,
    /// System.Object
    Object,
    /// System.TypedReference
    TypedByRef,
    /// An unmanaged pointer to a type
    Ptr(Box<TypeSignature>),
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// A value type, `TypeDef`, `TypeRef` or primitive token
    ValueType(Token),
    /// A reference type, `TypeDef`, `TypeRef` or primitive token
    Class(Token),
    /// Generic type parameter by position
    GenericParamType(u32),
    /// Generic method parameter by position
    GenericParamMethod(u32),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Single dimension, zero based array
    SzArray(Box<TypeSignature>),
    /// Multi dimensional array
    Array {
        /// Element type
        element: Box<TypeSignature>,
        /// Number of dimensions
        rank: u32,
    },
}

impl TypeSignature {
    /// Maps a primitive signature element onto its built-in kind
    #[must_use]
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        Some(match self {
            TypeSignature::Void => PrimitiveKind::Void,
            TypeSignature::Boolean => PrimitiveKind::Boolean,
            TypeSignature::Char => PrimitiveKind::Char,
            TypeSignature::I1 => PrimitiveKind::I1,
            TypeSignature::U1 => PrimitiveKind::U1,
            TypeSignature::I2 => PrimitiveKind::I2,
            TypeSignature::U2 => PrimitiveKind::U2,
            TypeSignature::I4 => PrimitiveKind::I4,
            TypeSignature::U4 => PrimitiveKind::U4,
            TypeSignature::I8 => PrimitiveKind::I8,
            TypeSignature::U8 => PrimitiveKind::U8,
            TypeSignature::R4 => PrimitiveKind::R4,
            TypeSignature::R8 => PrimitiveKind::R8,
            TypeSignature::I => PrimitiveKind::I,
            TypeSignature::U => PrimitiveKind::U,
            TypeSignature::String => PrimitiveKind::String,
            TypeSignature::Object => PrimitiveKind::Object,
            TypeSignature::TypedByRef => PrimitiveKind::TypedReference,
            _ => return None,
        })
    }

    /// Shorthand for `GenericInst(Class(definition), args)`
    #[must_use]
    pub fn generic_class(definition: Token, args: Vec<TypeSignature>) -> Self {
        TypeSignature::GenericInst(Box::new(TypeSignature::Class(definition)), args)
    }

    /// Shorthand for a single dimensional array of `element`
    #[must_use]
    pub fn sz_array(element: TypeSignature) -> Self {
        TypeSignature::SzArray(Box::new(element))
    }
}

/// A method signature (II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// Used to encode the keyword instance in the calling convention
    pub has_this: bool,
    /// Number of method level generic parameters
    pub param_count_generic: u32,
    /// The return type of this method
    pub return_type: TypeSignature,
    /// The parameters of this method
    pub params: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// An instance method signature with the given return and parameter types
    #[must_use]
    pub fn instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            param_count_generic: 0,
            return_type,
            params,
        }
    }

    /// `void M()` as an instance method
    #[must_use]
    pub fn void_instance() -> Self {
        Self::instance(TypeSignature::Void, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::TableId;

    #[test]
    fn test_primitive_mapping() {
        assert_eq!(TypeSignature::I4.primitive(), Some(PrimitiveKind::I4));
        assert_eq!(TypeSignature::Object.primitive(), Some(PrimitiveKind::Object));
        assert_eq!(
            TypeSignature::Class(Token::from_parts(TableId::TYPE_DEF, 1)).primitive(),
            None
        );
    }

    #[test]
    fn test_generic_class_shorthand() {
        let def = Token::from_parts(TableId::TYPE_DEF, 3);
        let sig = TypeSignature::generic_class(def, vec![TypeSignature::I4]);
        match sig {
            TypeSignature::GenericInst(base, args) => {
                assert_eq!(*base, TypeSignature::Class(def));
                assert_eq!(args, vec![TypeSignature::I4]);
            }
            _ => panic!("expected a generic instance"),
        }
    }
}
