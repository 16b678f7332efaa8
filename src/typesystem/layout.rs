//! Published memory layout of a type.

use crate::typesystem::{FieldRc, TypeNodeRc};

/// Placement of one field
#[derive(Debug, Clone)]
pub struct FieldOffset {
    /// The field
    pub field: FieldRc,
    /// Byte offset; instance offsets include the object header
    pub offset: u32,
    /// Size of the field storage
    pub size: u32,
    /// Alignment the offset was rounded to
    pub align: u32,
    /// The field itself is a traced reference
    pub is_reference: bool,
}

/// Instance layout of a type
#[derive(Debug, Clone)]
pub struct FieldLayout {
    /// Boxed size including the object header
    pub instance_size: u32,
    /// Minimum alignment of the instance data
    pub min_align: u32,
    /// Native representation equals the managed one
    pub blittable: bool,
    /// Some field, own or inherited, holds a traced reference
    pub has_references: bool,
    /// Instance fields declared by this type, in layout order
    pub fields: Vec<FieldOffset>,
    /// Size was fixed by a `ClassLayout` row
    pub explicit_size: bool,
    /// Underlying integral type of an enum
    pub underlying: Option<TypeNodeRc>,
    /// Element size of an array type, 0 otherwise
    pub element_size: u32,
}

impl FieldLayout {
    /// Size of the instance data without the header
    #[must_use]
    pub fn value_size(&self, header: u32) -> u32 {
        self.instance_size.saturating_sub(header)
    }

    /// Placement of a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldOffset> {
        self.fields.iter().find(|offset| offset.field.name == name)
    }
}

/// Static storage layout of a type
#[derive(Debug, Clone, Default)]
pub struct StaticLayout {
    /// Size of the static storage block
    pub class_size: u32,
    /// Some static field holds a traced reference
    pub has_references: bool,
    /// Static fields and their offsets inside the block
    pub fields: Vec<FieldOffset>,
}
