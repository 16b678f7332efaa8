//! Member tables.
//!
//! Definitions read their fields, methods, properties and events from metadata, resolving member
//! signatures in the context of their own generic parameters. Generic instances never touch the
//! metadata: they inflate the definition's tables member by member, keeping indices aligned.

use std::{ops::Range, sync::Arc};

use crate::{
    loader::{GenericContext, Progress, TypeLoader},
    metadata::{
        flags::MethodAttributes,
        token::{TableId, Token},
    },
    typesystem::{
        Event, Field, FieldRc, Method, MethodRc, MethodSignature, Property, Stage, TypeKind,
        TypeNodeRc, TypeNodeRef,
    },
    Result,
};

/// A member list of a `TypeDef` row, checked against the size of the member table
fn member_rows(
    list: &Range<u32>,
    rows: u32,
    table: &str,
    owner: &TypeNodeRc,
) -> Result<Range<u32>> {
    if list.start == list.end {
        return Ok(list.clone());
    }
    if list.start == 0 || list.start > list.end || list.end > rows.saturating_add(1) {
        return Err(malformed_error!(
            "{} list {}..{} of {} exceeds the {} table ({} rows)",
            table,
            list.start,
            list.end,
            owner.full_name(),
            table,
            rows
        ));
    }
    Ok(list.clone())
}

impl TypeLoader {
    /// Fields of a type, reading them if needed
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn fields<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [FieldRc]> {
        self.require_fields(node)
    }

    /// Methods of a type, reading them if needed
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn methods<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [MethodRc]> {
        self.require_methods(node)
    }

    /// Properties of a type, reading them if needed
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn properties<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [Property]> {
        self.require_properties(node)?;
        Ok(node.properties().unwrap_or(&[]))
    }

    /// Events of a type, reading them if needed
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn events<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [Event]> {
        self.require_properties(node)?;
        Ok(node.events().unwrap_or(&[]))
    }

    /// A method of a type by name
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn find_method(&self, node: &TypeNodeRc, name: &str) -> Result<Option<MethodRc>> {
        Ok(self
            .require_methods(node)?
            .iter()
            .find(|method| method.name == name)
            .cloned())
    }

    pub(crate) fn require_fields<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [FieldRc]> {
        match self.ensure_stage(node, Stage::FieldTable, Self::build_field_table)? {
            Progress::Done => Ok(node.fields().unwrap_or(&[])),
            Progress::InProgress => Err(violation!(
                CyclicDefinition,
                "fields of {} depend on themselves",
                node.full_name()
            )),
        }
    }

    pub(crate) fn require_methods<'n>(&self, node: &'n TypeNodeRc) -> Result<&'n [MethodRc]> {
        match self.ensure_stage(node, Stage::MethodTable, Self::build_method_table)? {
            Progress::Done => Ok(node.methods().unwrap_or(&[])),
            Progress::InProgress => Err(violation!(
                CyclicDefinition,
                "methods of {} depend on themselves",
                node.full_name()
            )),
        }
    }

    pub(crate) fn require_properties(&self, node: &TypeNodeRc) -> Result<()> {
        self.ensure_stage(node, Stage::Properties, Self::build_properties)
            .map(|_| ())
    }

    fn build_field_table(&self, node: &TypeNodeRc) -> Result<()> {
        let fields = match &node.kind {
            TypeKind::Definition { token, .. } if node.primitive.is_none() => {
                let module = self.require_module(node.module)?;
                let row = module.reader.read_type_row(*token)?;
                let rows =
                    member_rows(&row.field_range, module.reader.field_count(), "Field", node)?;
                let mut fields = Vec::with_capacity(rows.len());
                for (index, row_index) in rows.enumerate() {
                    let token = Token::from_parts(TableId::FIELD, row_index);
                    let field = module.reader.read_field_row(token)?;
                    let field_type =
                        self.resolve_sig(&module, &field.signature, node.generic_params())?;
                    fields.push(Arc::new(Field {
                        token,
                        name: field.name,
                        flags: field.flags,
                        field_type,
                        index,
                        declaring: TypeNodeRef::new(node),
                    }));
                }
                fields
            }
            TypeKind::GenericInstance { definition, args } => {
                let context = GenericContext::new(definition, args);
                self.require_fields(definition)?
                    .iter()
                    .map(|field| {
                        Ok(Arc::new(Field {
                            token: field.token,
                            name: field.name.clone(),
                            flags: field.flags,
                            field_type: self.inflate(&field.field_type, &context)?,
                            index: field.index,
                            declaring: TypeNodeRef::new(node),
                        }))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            _ => Vec::new(),
        };

        let _ = node.fields.set(fields);
        Ok(())
    }

    fn build_method_table(&self, node: &TypeNodeRc) -> Result<()> {
        let methods = match &node.kind {
            TypeKind::Definition { token, .. } if node.primitive.is_none() => {
                let module = self.require_module(node.module)?;
                let row = module.reader.read_type_row(*token)?;
                let params = node.generic_params();
                let rows = member_rows(
                    &row.method_range,
                    module.reader.method_count(),
                    "MethodDef",
                    node,
                )?;
                let mut methods = Vec::with_capacity(rows.len());
                for (index, row_index) in rows.enumerate() {
                    let token = Token::from_parts(TableId::METHOD_DEF, row_index);
                    let method = module.reader.read_method_row(token)?;
                    let signature = MethodSignature {
                        has_this: method.signature.has_this,
                        generic_count: method.signature.param_count_generic,
                        return_type: self.resolve_sig(
                            &module,
                            &method.signature.return_type,
                            params,
                        )?,
                        params: method
                            .signature
                            .params
                            .iter()
                            .map(|param| self.resolve_sig(&module, param, params))
                            .collect::<Result<Vec<_>>>()?,
                    };
                    methods.push(Arc::new(Method::new(
                        token,
                        method.name,
                        MethodAttributes::from_bits_truncate(method.flags),
                        signature,
                        index,
                        TypeNodeRef::new(node),
                    )));
                }
                methods
            }
            TypeKind::GenericInstance { definition, args } => {
                let context = GenericContext::new(definition, args);
                self.require_methods(definition)?
                    .iter()
                    .map(|method| {
                        let signature = MethodSignature {
                            has_this: method.signature.has_this,
                            generic_count: method.signature.generic_count,
                            return_type: self.inflate(&method.signature.return_type, &context)?,
                            params: method
                                .signature
                                .params
                                .iter()
                                .map(|param| self.inflate(param, &context))
                                .collect::<Result<Vec<_>>>()?,
                        };
                        let mut inflated = Method::new(
                            method.token,
                            method.name.clone(),
                            method.flags,
                            signature,
                            method.index,
                            TypeNodeRef::new(node),
                        );
                        inflated.generic_definition = Some(method.clone());
                        Ok(Arc::new(inflated))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            _ => Vec::new(),
        };

        let _ = node.methods.set(methods);
        Ok(())
    }

    fn build_properties(&self, node: &TypeNodeRc) -> Result<()> {
        let (properties, events) = match &node.kind {
            TypeKind::Definition { token, .. } if node.primitive.is_none() => {
                let module = self.require_module(node.module)?;
                let methods = self.require_methods(node)?;
                let by_token = |token: Option<Token>| {
                    token.and_then(|token| {
                        methods.iter().find(|method| method.token == token).cloned()
                    })
                };

                let properties = module
                    .reader
                    .read_properties(*token)?
                    .into_iter()
                    .map(|row| Property {
                        name: row.name,
                        getter: by_token(row.getter),
                        setter: by_token(row.setter),
                    })
                    .collect();
                let events = module
                    .reader
                    .read_events(*token)?
                    .into_iter()
                    .map(|row| Event {
                        name: row.name,
                        add: by_token(row.add),
                        remove: by_token(row.remove),
                    })
                    .collect();
                (properties, events)
            }
            TypeKind::GenericInstance { definition, .. } => {
                self.require_properties(definition)?;
                let methods = self.require_methods(node)?;
                let remap = |method: &Option<MethodRc>| {
                    method
                        .as_ref()
                        .and_then(|method| methods.get(method.index).cloned())
                };

                let properties = definition
                    .properties()
                    .unwrap_or(&[])
                    .iter()
                    .map(|property| Property {
                        name: property.name.clone(),
                        getter: remap(&property.getter),
                        setter: remap(&property.setter),
                    })
                    .collect();
                let events = definition
                    .events()
                    .unwrap_or(&[])
                    .iter()
                    .map(|event| Event {
                        name: event.name.clone(),
                        add: remap(&event.add),
                        remove: remap(&event.remove),
                    })
                    .collect();
                (properties, events)
            }
            _ => (Vec::new(), Vec::new()),
        };

        let _ = node.properties.set(properties);
        let _ = node.events.set(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{builder::MetadataBuilder, flags::FieldAttributes, signature::TypeSignature},
        test::*,
        typesystem::{FailureKind, PrimitiveKind},
        Error,
    };

    #[test]
    fn test_member_list_outside_the_table_is_malformed() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Holder")
            .field("value", FieldAttributes::PUBLIC, TypeSignature::I4)
            .build();
        let metadata = HookedMetadata::new(md.build()).patch_type_rows(|mut row| {
            row.field_range = 1..u32::MAX;
            row.method_range = 5..2;
            row
        });
        let loader = TypeLoader::new();
        let module = loader.register_module("App", Arc::new(metadata)).unwrap();
        let node = loader.resolve(module, token).unwrap();

        let Err(Error::TypeLoad(diagnostic)) = loader.fields(&node) else {
            panic!("a field list past the end of the table must fail");
        };
        assert_eq!(diagnostic.kind, FailureKind::MetadataMalformed);
        assert!(diagnostic.message.contains("Field table"), "{}", diagnostic.message);
        assert!(matches!(loader.methods(&node), Err(Error::TypeLoad(_))));
    }

    #[test]
    fn test_instance_members_are_inflated() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let list = loader.resolve(module, tokens.list).unwrap();
        let int = loader.primitive(PrimitiveKind::I4);
        let list_int = loader.instantiate(&list, &[int.clone()]).unwrap();

        let fields = loader.fields(&list_int).unwrap();
        let items = fields.iter().find(|field| field.name == "items").unwrap();
        assert_eq!(items.field_type.full_name(), "System.Int32[]");

        let add = loader.find_method(&list_int, "Add").unwrap().unwrap();
        assert!(Arc::ptr_eq(&add.signature.params[0], &int));
        let definition_add = add.generic_definition.as_ref().unwrap();
        assert_eq!(definition_add.index, add.index);
        assert!(definition_add.signature.params[0].is_generic_parameter());
    }

    #[test]
    fn test_properties_map_to_accessors() {
        let (loader, module, tokens) = load_fixture(generic_collections);
        let list = loader.resolve(module, tokens.list).unwrap();
        let list_string = loader
            .instantiate(&list, &[loader.primitive(PrimitiveKind::String)])
            .unwrap();

        let properties = loader.properties(&list_string).unwrap();
        let count = properties.iter().find(|p| p.name == "Count").unwrap();
        let getter = count.getter.as_ref().unwrap();
        assert_eq!(getter.name, "get_Count");
        assert!(getter.declaring.points_to(&list_string));
        assert!(count.setter.is_none());

        let events = loader.events(&list_string).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].add.as_ref().unwrap().name, "add_Changed");
    }
}
