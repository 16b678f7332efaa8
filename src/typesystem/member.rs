//! Members of a type: fields, methods, properties and events.
//!
//! Member tables are read lazily from the metadata the first time the loader needs them. For a
//! generic instance they are produced by inflating the definition's members, so the member at
//! index `i` of an instance always corresponds to the member at index `i` of its definition.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    metadata::{
        flags::{FieldAttributes, MethodAttributes},
        token::Token,
    },
    typesystem::{TypeNodeRc, TypeNodeRef},
};

/// A reference-counted field
pub type FieldRc = Arc<Field>;
/// A reference-counted method
pub type MethodRc = Arc<Method>;

/// A field of a type
pub struct Field {
    /// Metadata token, shared between a definition and its instances
    pub token: Token,
    /// Field name
    pub name: String,
    /// `FieldAttributes` bitmask
    pub flags: u32,
    /// Resolved field type
    pub field_type: TypeNodeRc,
    /// Position in the declaring type's field table
    pub index: usize,
    /// The type declaring the field
    pub declaring: TypeNodeRef,
}

impl Field {
    /// Static fields live in the static storage of the type
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// Literal fields are compile-time constants and take no storage
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags & FieldAttributes::LITERAL != 0
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("type", &self.field_type.full_name())
            .finish()
    }
}

/// A method signature with every type resolved to its canonical node
///
/// Two signatures are equal when their types are the same nodes.
#[derive(Clone)]
pub struct MethodSignature {
    /// Instance method
    pub has_this: bool,
    /// Number of method-level generic parameters
    pub generic_count: u32,
    /// Return type
    pub return_type: TypeNodeRc,
    /// Parameter types
    pub params: Vec<TypeNodeRc>,
}

impl PartialEq for MethodSignature {
    fn eq(&self, other: &Self) -> bool {
        self.has_this == other.has_this
            && self.generic_count == other.generic_count
            && Arc::ptr_eq(&self.return_type, &other.return_type)
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl Eq for MethodSignature {}

impl fmt::Debug for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.full_name()).collect();
        write!(
            f,
            "{} ({})",
            self.return_type.full_name(),
            params.join(", ")
        )
    }
}

/// A method of a type
pub struct Method {
    /// Metadata token, shared between a definition and its instances
    pub token: Token,
    /// Method name
    pub name: String,
    /// Method attributes
    pub flags: MethodAttributes,
    /// Resolved signature
    pub signature: MethodSignature,
    /// Position in the declaring type's method table
    pub index: usize,
    /// The type declaring the method
    pub declaring: TypeNodeRef,
    /// For a method of a generic instance, the method of the definition it was inflated from
    pub generic_definition: Option<MethodRc>,
    pub(crate) slot: OnceLock<u32>,
}

impl Method {
    /// Create a method without a slot
    #[must_use]
    pub fn new(
        token: Token,
        name: String,
        flags: MethodAttributes,
        signature: MethodSignature,
        index: usize,
        declaring: TypeNodeRef,
    ) -> Self {
        Method {
            token,
            name,
            flags,
            signature,
            index,
            declaring,
            generic_definition: None,
            slot: OnceLock::new(),
        }
    }

    /// The vtable slot of a virtual method
    ///
    /// For class methods this is the slot in the vtable of every type deriving from the declaring
    /// type. For interface methods it is the index relative to the interface's offset. Methods of
    /// generic instances share the slot of their definition.
    #[must_use]
    pub fn slot(&self) -> Option<u32> {
        self.slot.get().copied().or_else(|| {
            self.generic_definition
                .as_ref()
                .and_then(|definition| definition.slot())
        })
    }

    /// Virtual and not static
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.is_virtual()
    }

    /// Abstract, without a body
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    /// Same name and same resolved signature
    #[must_use]
    pub fn matches(&self, other: &Method) -> bool {
        self.name == other.name && self.signature == other.signature
    }

    /// The declaring type, if it is still loaded
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeNodeRc> {
        self.declaring.upgrade()
    }

    /// `Declaring::Name` for diagnostics
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.declaring.upgrade() {
            Some(declaring) => format!("{}::{}", declaring.full_name(), self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.full_name())
            .field("signature", &self.signature)
            .field("slot", &self.slot())
            .finish()
    }
}

/// A property and its accessors
#[derive(Debug, Clone)]
pub struct Property {
    /// Property name
    pub name: String,
    /// The `get_` accessor
    pub getter: Option<MethodRc>,
    /// The `set_` accessor
    pub setter: Option<MethodRc>,
}

/// An event and its accessors
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name
    pub name: String,
    /// The `add_` accessor
    pub add: Option<MethodRc>,
    /// The `remove_` accessor
    pub remove: Option<MethodRc>,
}
