//! In-memory metadata tables with a fluent builder.
//!
//! [`MetadataBuilder`] assembles the rows of one module programmatically and freezes them into an
//! [`InMemoryMetadata`], which implements [`MetadataReader`]. It backs dynamically generated
//! modules and the test-suite; fields and methods are appended to their global tables while their
//! owning type is being built, so the contiguous `field_range`/`method_range` invariant of real
//! metadata holds.
//!
//! # Example
//!
//! ```rust
//! use dotloader::metadata::{builder::MetadataBuilder, flags::MethodAttributes, signature::SignatureMethod};
//!
//! let mut md = MetadataBuilder::new("App");
//! let base = md
//!     .class("App", "Base")
//!     .method(
//!         "M",
//!         MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
//!         SignatureMethod::void_instance(),
//!     )
//!     .build();
//! let metadata = md.build();
//! assert_eq!(dotloader::metadata::reader::MetadataReader::type_count(metadata.as_ref()), 1);
//! # let _ = base;
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    metadata::{
        flags::{MethodAttributes, TypeAttributes},
        reader::{
            ClassLayout, EventRow, ExplicitLayout, FieldRow, GenericParamRow, MemberRefRow,
            MetadataReader, MethodImplRow, MethodRow, PropertyRow, TypeRefRow, TypeRow,
        },
        signature::{SignatureMethod, TypeSignature},
        token::{TableId, Token},
    },
    typesystem::PrimitiveKind,
    Result,
};

/// Collects the rows of one module
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    name: String,
    types: Vec<TypeRow>,
    fields: Vec<FieldRow>,
    methods: Vec<MethodRow>,
    interface_impls: HashMap<u32, Vec<Token>>,
    generic_params: HashMap<u32, Vec<GenericParamRow>>,
    explicit_layouts: HashMap<u32, ExplicitLayout>,
    class_layouts: HashMap<u32, ClassLayout>,
    type_specs: Vec<TypeSignature>,
    type_refs: Vec<TypeRefRow>,
    member_refs: Vec<MemberRefRow>,
    method_impls: HashMap<u32, Vec<MethodImplRow>>,
    enclosing: HashMap<u32, Token>,
    properties: HashMap<u32, Vec<PropertyRow>>,
    events: HashMap<u32, Vec<EventRow>>,
}

impl MetadataBuilder {
    /// Create an empty module named `name`
    ///
    /// ## Arguments
    /// * 'name' - Module name, used by `TypeRef` scopes of other modules
    pub fn new(name: &str) -> Self {
        MetadataBuilder {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Token the next call to [`MetadataBuilder::type_def`] will receive
    #[must_use]
    pub fn next_type_token(&self) -> Token {
        Token::from_parts(TableId::TYPE_DEF, self.types.len() as u32 + 1)
    }

    /// Start a type definition with raw flags and no parent
    ///
    /// ## Arguments
    /// * 'namespace' - Namespace of the new type
    /// * 'name'      - Simple name of the new type
    pub fn type_def(&mut self, namespace: &str, name: &str) -> TypeDefBuilder<'_> {
        let token = self.next_type_token();
        let field_start = self.fields.len() as u32 + 1;
        let method_start = self.methods.len() as u32 + 1;
        self.types.push(TypeRow::default());

        TypeDefBuilder {
            row: TypeRow {
                name: name.to_string(),
                namespace: namespace.to_string(),
                flags: TypeAttributes::PUBLIC,
                parent_token: Token::default(),
                field_range: field_start..field_start,
                method_range: method_start..method_start,
            },
            token,
            md: self,
        }
    }

    /// Start a class deriving from `System.Object`
    pub fn class(&mut self, namespace: &str, name: &str) -> TypeDefBuilder<'_> {
        self.type_def(namespace, name)
            .extends(PrimitiveKind::Object.token())
    }

    /// Start a sequential value type deriving from `System.ValueType`
    pub fn value_type(&mut self, namespace: &str, name: &str) -> TypeDefBuilder<'_> {
        self.type_def(namespace, name)
            .flags(
                TypeAttributes::PUBLIC | TypeAttributes::SEQUENTIAL_LAYOUT | TypeAttributes::SEALED,
            )
            .extends(PrimitiveKind::ValueType.token())
    }

    /// Start an interface
    pub fn interface(&mut self, namespace: &str, name: &str) -> TypeDefBuilder<'_> {
        self.type_def(namespace, name).flags(
            TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
        )
    }

    /// Register a `TypeSpec` and return its token
    pub fn type_spec(&mut self, signature: TypeSignature) -> Token {
        self.type_specs.push(signature);
        Token::from_parts(TableId::TYPE_SPEC, self.type_specs.len() as u32)
    }

    /// Register a `TypeRef` into module `scope` and return its token
    pub fn type_ref(&mut self, scope: &str, namespace: &str, name: &str) -> Token {
        self.type_refs.push(TypeRefRow {
            scope: scope.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Token::from_parts(TableId::TYPE_REF, self.type_refs.len() as u32)
    }

    /// Register a `MemberRef` to a method of `parent` and return its token
    pub fn member_ref(&mut self, parent: Token, name: &str, signature: SignatureMethod) -> Token {
        self.member_refs.push(MemberRefRow {
            parent,
            name: name.to_string(),
            signature,
        });
        Token::from_parts(TableId::MEMBER_REF, self.member_refs.len() as u32)
    }

    /// Rewrite the parent of an already built type
    ///
    /// Needed to express forward references, e.g. a cyclic inheritance chain.
    pub fn set_extends(&mut self, ty: Token, parent: Token) {
        if let Some(row) = self.types.get_mut(ty.row().saturating_sub(1) as usize) {
            row.parent_token = parent;
        }
    }

    /// Freeze the collected rows
    #[must_use]
    pub fn build(self) -> Arc<InMemoryMetadata> {
        let by_name = self
            .types
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.enclosing.contains_key(&(*index as u32 + 1)))
            .map(|(index, row)| {
                (
                    (row.namespace.clone(), row.name.clone()),
                    Token::from_parts(TableId::TYPE_DEF, index as u32 + 1),
                )
            })
            .collect();

        Arc::new(InMemoryMetadata {
            by_name,
            tables: self,
        })
    }
}

/// Builds a single `TypeDef` row together with its members
pub struct TypeDefBuilder<'a> {
    md: &'a mut MetadataBuilder,
    row: TypeRow,
    token: Token,
}

impl TypeDefBuilder<'_> {
    /// Token this type will be registered under
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// Replace the raw `TypeAttributes`
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.row.flags = flags;
        self
    }

    /// Add bits to the raw `TypeAttributes`
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.row.flags |= flags;
        self
    }

    /// Set the parent token
    #[must_use]
    pub fn extends(mut self, parent: Token) -> Self {
        self.row.parent_token = parent;
        self
    }

    /// Declare an implemented interface
    #[must_use]
    pub fn implements(self, interface: Token) -> Self {
        self.md
            .interface_impls
            .entry(self.token.row())
            .or_default()
            .push(interface);
        self
    }

    /// Declare an unconstrained generic parameter
    #[must_use]
    pub fn generic_param(self, name: &str) -> Self {
        self.generic_param_with(name, 0, Vec::new())
    }

    /// Declare a generic parameter with flags and type constraints
    #[must_use]
    pub fn generic_param_with(self, name: &str, flags: u32, constraints: Vec<Token>) -> Self {
        let params = self.md.generic_params.entry(self.token.row()).or_default();
        params.push(GenericParamRow {
            number: params.len() as u16,
            name: name.to_string(),
            flags,
            constraints,
        });
        self
    }

    /// Mark this type as nested in `enclosing`
    #[must_use]
    pub fn nested_in(mut self, enclosing: Token) -> Self {
        self.row.namespace.clear();
        self.md.enclosing.insert(self.token.row(), enclosing);
        self
    }

    /// Attach a `ClassLayout` row
    #[must_use]
    pub fn class_layout(self, packing_size: u32, class_size: u32) -> Self {
        self.md.class_layouts.insert(
            self.token.row(),
            ClassLayout {
                packing_size,
                class_size,
            },
        );
        self
    }

    /// Append a field and return its token
    pub fn add_field(&mut self, name: &str, flags: u32, signature: TypeSignature) -> Token {
        self.md.fields.push(FieldRow {
            name: name.to_string(),
            flags,
            signature,
        });
        self.row.field_range.end = self.md.fields.len() as u32 + 1;
        Token::from_parts(TableId::FIELD, self.md.fields.len() as u32)
    }

    /// Append a field
    #[must_use]
    pub fn field(mut self, name: &str, flags: u32, signature: TypeSignature) -> Self {
        self.add_field(name, flags, signature);
        self
    }

    /// Append a field with an explicit offset
    #[must_use]
    pub fn field_at(mut self, name: &str, flags: u32, signature: TypeSignature, offset: i64) -> Self {
        let token = self.add_field(name, flags, signature);
        self.md
            .explicit_layouts
            .insert(token.row(), ExplicitLayout { offset, size: None });
        self
    }

    /// Append a field with an explicit offset and declared extent
    #[must_use]
    pub fn field_at_sized(
        mut self,
        name: &str,
        flags: u32,
        signature: TypeSignature,
        offset: i64,
        size: u32,
    ) -> Self {
        let token = self.add_field(name, flags, signature);
        self.md.explicit_layouts.insert(
            token.row(),
            ExplicitLayout {
                offset,
                size: Some(size),
            },
        );
        self
    }

    /// Append a method and return its token
    pub fn add_method(
        &mut self,
        name: &str,
        flags: MethodAttributes,
        signature: SignatureMethod,
    ) -> Token {
        self.md.methods.push(MethodRow {
            name: name.to_string(),
            flags: flags.bits(),
            signature,
        });
        self.row.method_range.end = self.md.methods.len() as u32 + 1;
        Token::from_parts(TableId::METHOD_DEF, self.md.methods.len() as u32)
    }

    /// Append a method
    #[must_use]
    pub fn method(mut self, name: &str, flags: MethodAttributes, signature: SignatureMethod) -> Self {
        self.add_method(name, flags, signature);
        self
    }

    /// Declare that `body` explicitly implements `declaration`
    #[must_use]
    pub fn override_method(self, body: Token, declaration: Token) -> Self {
        self.md
            .method_impls
            .entry(self.token.row())
            .or_default()
            .push(MethodImplRow { body, declaration });
        self
    }

    /// Declare a property
    #[must_use]
    pub fn property(self, name: &str, getter: Option<Token>, setter: Option<Token>) -> Self {
        self.md
            .properties
            .entry(self.token.row())
            .or_default()
            .push(PropertyRow {
                name: name.to_string(),
                getter,
                setter,
            });
        self
    }

    /// Declare an event
    #[must_use]
    pub fn event(self, name: &str, add: Option<Token>, remove: Option<Token>) -> Self {
        self.md
            .events
            .entry(self.token.row())
            .or_default()
            .push(EventRow {
                name: name.to_string(),
                add,
                remove,
            });
        self
    }

    /// Store the row and return the type's token
    pub fn build(self) -> Token {
        let index = self.token.row() as usize - 1;
        self.md.types[index] = self.row;
        self.token
    }
}

/// Frozen module tables produced by [`MetadataBuilder::build`]
#[derive(Debug)]
pub struct InMemoryMetadata {
    tables: MetadataBuilder,
    by_name: HashMap<(String, String), Token>,
}

impl InMemoryMetadata {
    /// Name of the module
    #[must_use]
    pub fn name(&self) -> &str {
        &self.tables.name
    }

    fn row_index(token: Token, table: u8, len: usize) -> Result<usize> {
        if token.table() != table || token.row() == 0 || token.row() as usize > len {
            return Err(malformed_error!(
                "Token {} is out of range for table 0x{:02x} ({} rows)",
                token,
                table,
                len
            ));
        }
        Ok(token.row() as usize - 1)
    }

    fn type_index(&self, token: Token) -> Result<usize> {
        Self::row_index(token, TableId::TYPE_DEF, self.tables.types.len())
    }
}

impl MetadataReader for InMemoryMetadata {
    fn type_count(&self) -> u32 {
        self.tables.types.len() as u32
    }

    fn field_count(&self) -> u32 {
        self.tables.fields.len() as u32
    }

    fn method_count(&self) -> u32 {
        self.tables.methods.len() as u32
    }

    fn read_type_row(&self, token: Token) -> Result<TypeRow> {
        let index = self.type_index(token)?;
        Ok(self.tables.types[index].clone())
    }

    fn read_field_row(&self, token: Token) -> Result<FieldRow> {
        let index = Self::row_index(token, TableId::FIELD, self.tables.fields.len())?;
        Ok(self.tables.fields[index].clone())
    }

    fn read_method_row(&self, token: Token) -> Result<MethodRow> {
        let index = Self::row_index(token, TableId::METHOD_DEF, self.tables.methods.len())?;
        Ok(self.tables.methods[index].clone())
    }

    fn read_interface_impl_list(&self, token: Token) -> Result<Vec<Token>> {
        self.type_index(token)?;
        Ok(self
            .tables
            .interface_impls
            .get(&token.row())
            .cloned()
            .unwrap_or_default())
    }

    fn read_generic_params(&self, token: Token) -> Result<Vec<GenericParamRow>> {
        self.type_index(token)?;
        Ok(self
            .tables
            .generic_params
            .get(&token.row())
            .cloned()
            .unwrap_or_default())
    }

    fn read_explicit_layout(&self, token: Token) -> Result<Option<ExplicitLayout>> {
        Self::row_index(token, TableId::FIELD, self.tables.fields.len())?;
        Ok(self.tables.explicit_layouts.get(&token.row()).copied())
    }

    fn read_class_layout(&self, token: Token) -> Result<Option<ClassLayout>> {
        self.type_index(token)?;
        Ok(self.tables.class_layouts.get(&token.row()).copied())
    }

    fn read_type_spec(&self, token: Token) -> Result<TypeSignature> {
        let index = Self::row_index(token, TableId::TYPE_SPEC, self.tables.type_specs.len())?;
        Ok(self.tables.type_specs[index].clone())
    }

    fn read_type_ref(&self, token: Token) -> Result<TypeRefRow> {
        let index = Self::row_index(token, TableId::TYPE_REF, self.tables.type_refs.len())?;
        Ok(self.tables.type_refs[index].clone())
    }

    fn read_member_ref(&self, token: Token) -> Result<MemberRefRow> {
        let index = Self::row_index(token, TableId::MEMBER_REF, self.tables.member_refs.len())?;
        Ok(self.tables.member_refs[index].clone())
    }

    fn read_method_impls(&self, token: Token) -> Result<Vec<MethodImplRow>> {
        self.type_index(token)?;
        Ok(self
            .tables
            .method_impls
            .get(&token.row())
            .cloned()
            .unwrap_or_default())
    }

    fn read_enclosing_type(&self, token: Token) -> Result<Option<Token>> {
        self.type_index(token)?;
        Ok(self.tables.enclosing.get(&token.row()).copied())
    }

    fn read_properties(&self, token: Token) -> Result<Vec<PropertyRow>> {
        self.type_index(token)?;
        Ok(self
            .tables
            .properties
            .get(&token.row())
            .cloned()
            .unwrap_or_default())
    }

    fn read_events(&self, token: Token) -> Result<Vec<EventRow>> {
        self.type_index(token)?;
        Ok(self
            .tables
            .events
            .get(&token.row())
            .cloned()
            .unwrap_or_default())
    }

    fn lookup_type(&self, namespace: &str, name: &str) -> Option<Token> {
        self.by_name
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }
}
