//! Shared fixtures for unit tests
//!
//! Each fixture fills a [`MetadataBuilder`] with a small type universe and returns the tokens the
//! tests refer to. [`load_fixture`] registers the result with a fresh loader.

mod fixtures;

pub use fixtures::*;

use std::sync::Arc;

use crate::{
    metadata::{
        builder::{InMemoryMetadata, MetadataBuilder},
        reader::{
            ClassLayout, EventRow, ExplicitLayout, FieldRow, GenericParamRow, MemberRefRow,
            MetadataReader, MethodImplRow, MethodRow, PropertyRow, TypeRefRow, TypeRow,
        },
        signature::TypeSignature,
        token::Token,
    },
    typesystem::ModuleId,
    Result, TypeLoader,
};

/// Tokens of the interesting types of a fixture; unused entries stay null
#[derive(Debug, Default, Clone, Copy)]
pub struct Tokens {
    pub shape: Token,
    pub base: Token,
    pub derived: Token,
    pub list: Token,
    pub sorted_list: Token,
    pub struct_only: Token,
    pub overlapping: Token,
    pub recursive: Token,
    pub dependent: Token,
    pub first: Token,
    pub second: Token,
    pub single: Token,
    pub ambiguous: Token,
}

/// Build a fixture into a module named `App` of a new default loader
pub fn load_fixture(fixture: fn(&mut MetadataBuilder) -> Tokens) -> (TypeLoader, ModuleId, Tokens) {
    init_logging();
    let mut md = MetadataBuilder::new("App");
    let tokens = fixture(&mut md);
    let loader = TypeLoader::new();
    let module = loader.register_module("App", md.build()).unwrap();
    (loader, module, tokens)
}

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type TypeRowPatch = Box<dyn Fn(TypeRow) -> TypeRow + Send + Sync>;
type FieldReadHook = Box<dyn Fn(Token) + Send + Sync>;

/// Reader forwarding to an [`InMemoryMetadata`], with hooks to tamper with `TypeDef` rows and to
/// observe field reads
pub struct HookedMetadata {
    inner: Arc<InMemoryMetadata>,
    type_row: Option<TypeRowPatch>,
    field_read: Option<FieldReadHook>,
}

impl HookedMetadata {
    pub fn new(inner: Arc<InMemoryMetadata>) -> Self {
        HookedMetadata {
            inner,
            type_row: None,
            field_read: None,
        }
    }

    pub fn patch_type_rows(
        mut self,
        patch: impl Fn(TypeRow) -> TypeRow + Send + Sync + 'static,
    ) -> Self {
        self.type_row = Some(Box::new(patch));
        self
    }

    pub fn on_field_read(mut self, hook: impl Fn(Token) + Send + Sync + 'static) -> Self {
        self.field_read = Some(Box::new(hook));
        self
    }
}

impl MetadataReader for HookedMetadata {
    fn type_count(&self) -> u32 {
        self.inner.type_count()
    }

    fn field_count(&self) -> u32 {
        self.inner.field_count()
    }

    fn method_count(&self) -> u32 {
        self.inner.method_count()
    }

    fn read_type_row(&self, token: Token) -> Result<TypeRow> {
        let row = self.inner.read_type_row(token)?;
        Ok(match &self.type_row {
            Some(patch) => patch(row),
            None => row,
        })
    }

    fn read_field_row(&self, token: Token) -> Result<FieldRow> {
        if let Some(hook) = &self.field_read {
            hook(token);
        }
        self.inner.read_field_row(token)
    }

    fn read_method_row(&self, token: Token) -> Result<MethodRow> {
        self.inner.read_method_row(token)
    }

    fn read_interface_impl_list(&self, token: Token) -> Result<Vec<Token>> {
        self.inner.read_interface_impl_list(token)
    }

    fn read_generic_params(&self, token: Token) -> Result<Vec<GenericParamRow>> {
        self.inner.read_generic_params(token)
    }

    fn read_explicit_layout(&self, token: Token) -> Result<Option<ExplicitLayout>> {
        self.inner.read_explicit_layout(token)
    }

    fn read_class_layout(&self, token: Token) -> Result<Option<ClassLayout>> {
        self.inner.read_class_layout(token)
    }

    fn read_type_spec(&self, token: Token) -> Result<TypeSignature> {
        self.inner.read_type_spec(token)
    }

    fn read_type_ref(&self, token: Token) -> Result<TypeRefRow> {
        self.inner.read_type_ref(token)
    }

    fn read_member_ref(&self, token: Token) -> Result<MemberRefRow> {
        self.inner.read_member_ref(token)
    }

    fn read_method_impls(&self, token: Token) -> Result<Vec<MethodImplRow>> {
        self.inner.read_method_impls(token)
    }

    fn read_enclosing_type(&self, token: Token) -> Result<Option<Token>> {
        self.inner.read_enclosing_type(token)
    }

    fn read_properties(&self, token: Token) -> Result<Vec<PropertyRow>> {
        self.inner.read_properties(token)
    }

    fn read_events(&self, token: Token) -> Result<Vec<EventRow>> {
        self.inner.read_events(token)
    }

    fn lookup_type(&self, namespace: &str, name: &str) -> Option<Token> {
        self.inner.lookup_type(namespace, name)
    }
}
