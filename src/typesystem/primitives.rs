//! Built-in primitive types.
//!
//! The loader owns one node per [`PrimitiveKind`], created together with the registry and fully
//! initialized from the start. Metadata refers to them through artificial tokens in the
//! [`TableId::PRIMITIVE`] table, the same way the element types of a signature do.

use strum::{EnumCount, EnumIter};

use crate::metadata::token::{TableId, Token};

/// Built-in types the loader knows without metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum PrimitiveKind {
    /// System.Object - root of the hierarchy
    Object,
    /// System.ValueType - base class for value types
    ValueType,
    /// System.Enum - base class for enumerations
    Enum,
    /// System.Array - base class for arrays
    Array,
    /// System.String - immutable string of UTF-16 characters
    String,
    /// System.Void - represents no value
    Void,
    /// System.Boolean - true/false value
    Boolean,
    /// System.Char - UTF-16 code unit
    Char,
    /// System.SByte - signed 8-bit integer
    I1,
    /// System.Byte - unsigned 8-bit integer
    U1,
    /// System.Int16 - signed 16-bit integer
    I2,
    /// System.UInt16 - unsigned 16-bit integer
    U2,
    /// System.Int32 - signed 32-bit integer
    I4,
    /// System.UInt32 - unsigned 32-bit integer
    U4,
    /// System.Int64 - signed 64-bit integer
    I8,
    /// System.UInt64 - unsigned 64-bit integer
    U8,
    /// System.Single - 32-bit floating point
    R4,
    /// System.Double - 64-bit floating point
    R8,
    /// System.IntPtr - native sized signed integer
    I,
    /// System.UIntPtr - native sized unsigned integer
    U,
    /// System.TypedReference - a managed pointer paired with a type handle
    TypedReference,
}

impl PrimitiveKind {
    /// Get the token for this type
    #[must_use]
    pub fn token(&self) -> Token {
        Token::from_parts(TableId::PRIMITIVE, *self as u32 + 1)
    }

    /// Map an artificial primitive token back onto its kind
    #[must_use]
    pub fn from_token(token: Token) -> Option<Self> {
        use strum::IntoEnumIterator;

        if token.table() != TableId::PRIMITIVE {
            return None;
        }
        PrimitiveKind::iter().find(|kind| kind.token() == token)
    }

    /// Namespace and simple name of the built-in type
    #[must_use]
    pub fn name(&self) -> (&'static str, &'static str) {
        let name = match self {
            PrimitiveKind::Object => "Object",
            PrimitiveKind::ValueType => "ValueType",
            PrimitiveKind::Enum => "Enum",
            PrimitiveKind::Array => "Array",
            PrimitiveKind::String => "String",
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::I1 => "SByte",
            PrimitiveKind::U1 => "Byte",
            PrimitiveKind::I2 => "Int16",
            PrimitiveKind::U2 => "UInt16",
            PrimitiveKind::I4 => "Int32",
            PrimitiveKind::U4 => "UInt32",
            PrimitiveKind::I8 => "Int64",
            PrimitiveKind::U8 => "UInt64",
            PrimitiveKind::R4 => "Single",
            PrimitiveKind::R8 => "Double",
            PrimitiveKind::I => "IntPtr",
            PrimitiveKind::U => "UIntPtr",
            PrimitiveKind::TypedReference => "TypedReference",
        };
        ("System", name)
    }

    /// Base type of the built-in, `None` only for `System.Object`
    #[must_use]
    pub fn parent(&self) -> Option<PrimitiveKind> {
        match self {
            PrimitiveKind::Object => None,
            PrimitiveKind::ValueType | PrimitiveKind::Array | PrimitiveKind::String => {
                Some(PrimitiveKind::Object)
            }
            _ => Some(PrimitiveKind::ValueType),
        }
    }

    /// True for the primitives whose instances are values rather than references
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Object
                | PrimitiveKind::ValueType
                | PrimitiveKind::Enum
                | PrimitiveKind::Array
                | PrimitiveKind::String
        )
    }

    /// Unboxed size and natural alignment of a primitive value type
    ///
    /// ## Arguments
    /// * 'pointer_size' - Size of native integers on the target
    #[must_use]
    pub fn value_size(&self, pointer_size: u32) -> Option<u32> {
        Some(match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Boolean | PrimitiveKind::I1 | PrimitiveKind::U1 => 1,
            PrimitiveKind::Char | PrimitiveKind::I2 | PrimitiveKind::U2 => 2,
            PrimitiveKind::I4 | PrimitiveKind::U4 | PrimitiveKind::R4 => 4,
            PrimitiveKind::I8 | PrimitiveKind::U8 | PrimitiveKind::R8 => 8,
            PrimitiveKind::I | PrimitiveKind::U => pointer_size,
            PrimitiveKind::TypedReference => pointer_size * 2,
            _ => return None,
        })
    }

    /// True if the native representation equals the managed one
    ///
    /// `bool` and `char` need marshaling, `TypedReference` holds a managed pointer.
    #[must_use]
    pub fn is_blittable(&self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Boolean
                | PrimitiveKind::Char
                | PrimitiveKind::String
                | PrimitiveKind::TypedReference
        )
    }

    /// Abstract built-ins cannot be instantiated directly
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::ValueType | PrimitiveKind::Enum | PrimitiveKind::Array
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_primitive_tokens_round_trip() {
        for kind in PrimitiveKind::iter() {
            assert_eq!(PrimitiveKind::from_token(kind.token()), Some(kind));
        }
        assert_eq!(PrimitiveKind::COUNT, PrimitiveKind::iter().count());
        assert_eq!(PrimitiveKind::from_token(Token::from_parts(TableId::TYPE_DEF, 1)), None);
    }

    #[test]
    fn test_primitive_hierarchy() {
        assert_eq!(PrimitiveKind::Object.parent(), None);
        assert_eq!(PrimitiveKind::String.parent(), Some(PrimitiveKind::Object));
        assert_eq!(PrimitiveKind::I4.parent(), Some(PrimitiveKind::ValueType));
        assert_eq!(PrimitiveKind::Enum.parent(), Some(PrimitiveKind::ValueType));
    }

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(PrimitiveKind::Boolean.value_size(8), Some(1));
        assert_eq!(PrimitiveKind::R8.value_size(4), Some(8));
        assert_eq!(PrimitiveKind::I.value_size(4), Some(4));
        assert_eq!(PrimitiveKind::U.value_size(8), Some(8));
        assert_eq!(PrimitiveKind::Object.value_size(8), None);
        assert!(PrimitiveKind::I4.is_value_type());
        assert!(!PrimitiveKind::String.is_value_type());
        assert!(!PrimitiveKind::Boolean.is_blittable());
    }
}
