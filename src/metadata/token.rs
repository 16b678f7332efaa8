//! Metadata tokens and the table identifiers the loader understands.
//!
//! A token is a 32-bit value whose high byte selects a metadata table and whose low 24 bits
//! select a 1-based row inside that table. Built-in primitive types use the artificial
//! [`TableId::PRIMITIVE`] table so metadata can reference them without a `TypeRef` row.

use std::fmt;
use std::hash::{Hash, Hasher};

#[allow(non_snake_case)]
/// Table identifiers stored in the high byte of a [`Token`]
pub mod TableId {
    /// `TypeRef` table, resolved by name through another module
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeDef` table, definitions owned by the reading module
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table, used by explicit overrides on generic instances
    pub const MEMBER_REF: u8 = 0x0A;
    /// `TypeSpec` table, signature-described types such as generic instances
    pub const TYPE_SPEC: u8 = 0x1B;
    /// Artificial table for built-in primitive types
    pub const PRIMITIVE: u8 = 0xF0;
}

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table identifier and a row index
    ///
    /// ## Arguments
    /// * `table` - One of the [`TableId`] constants
    /// * `row`   - The 1-based row, only the low 24 bits are kept
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into `table`
    #[must_use]
    pub fn is_table(&self, table: u8) -> bool {
        self.table() == table && self.row() != 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
