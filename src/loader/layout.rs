//! Instance and static field layout.
//!
//! Instance layout starts where the parent's instance ends and places the type's own instance
//! fields according to its layout kind:
//!
//! - **Auto** - fields may be reordered. With GC-aware layout enabled, fields holding references
//!   are placed first so the collector scans one contiguous run.
//! - **Sequential** - declaration order.
//! - **Explicit** - every field carries its own offset; overlapping fields are checked so that a
//!   reference is never aliased by plain data.
//!
//! Offsets of instance fields include the object header, so the offsets of a value type are the
//! offsets in its boxed form.

use crate::{
    loader::TypeLoader,
    metadata::{flags::TypeAttributes, token::Token},
    typesystem::{
        FieldLayout, FieldOffset, FieldRc, ModuleRc, PrimitiveKind, StaticLayout, TypeKind,
        TypeNodeRc,
    },
    Error, Result,
};

/// Packing sizes at or above this value are rejected
const MAX_PACKING: u32 = 256;

/// Storage requirements of a field of some type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldMetrics {
    size: u32,
    align: u32,
    /// The field itself is a traced reference
    is_reference: bool,
    /// The field is or contains a traced reference
    has_references: bool,
    blittable: bool,
}

/// A byte range claimed by an explicit-layout field, relative to the start of the type's own
/// fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    start: u64,
    end: u64,
    reference: bool,
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

impl TypeLoader {
    /// Boxed instance size of a type, including the object header
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeLoad`] if the type failed to load
    pub fn instance_size(&self, node: &TypeNodeRc) -> Result<u32> {
        Ok(self.require_layout(node)?.instance_size)
    }

    /// The module and token that describe a definition or the definition behind an instance
    fn metadata_source(&self, node: &TypeNodeRc) -> Result<Option<(ModuleRc, Token)>> {
        let definition = match &node.kind {
            TypeKind::GenericInstance { definition, .. } => definition,
            _ => node,
        };
        match (&definition.kind, definition.primitive) {
            (TypeKind::Definition { token, .. }, None) => {
                Ok(Some((self.require_module(definition.module)?, *token)))
            }
            _ => Ok(None),
        }
    }

    fn field_metrics(&self, ty: &TypeNodeRc) -> Result<FieldMetrics> {
        let pointer = self.config.pointer_size;
        let reference = FieldMetrics {
            size: pointer,
            align: pointer,
            is_reference: true,
            has_references: true,
            blittable: false,
        };

        match &ty.kind {
            TypeKind::Pointer { managed: true, .. } => Ok(reference),
            TypeKind::Pointer { managed: false, .. } => Ok(FieldMetrics {
                size: pointer,
                align: pointer,
                is_reference: false,
                has_references: false,
                blittable: true,
            }),
            TypeKind::GenericParameter { .. } => Ok(reference),
            _ if ty.primitive == Some(PrimitiveKind::Void) => Err(violation!(
                LayoutViolation,
                "a field cannot have type {}",
                ty.full_name()
            )),
            _ if ty.is_value_type() => {
                if let Some(failure) = ty.failure() {
                    return Err(Error::TypeLoad(failure));
                }
                let layout = self.require_layout(ty)?;
                Ok(FieldMetrics {
                    size: layout.value_size(self.config.object_header_size),
                    align: layout.min_align.max(1),
                    is_reference: false,
                    has_references: layout.has_references,
                    blittable: layout.blittable,
                })
            }
            _ => Ok(reference),
        }
    }

    /// Offsets of every reference inside the unboxed value of `ty`, relative to its start
    fn reference_offsets(&self, ty: &TypeNodeRc, base: u32, out: &mut Vec<u32>) -> Result<()> {
        let header = self.config.object_header_size;
        let layout = self.require_layout(ty)?;
        for placed in &layout.fields {
            let offset = base + placed.offset.saturating_sub(header);
            if placed.is_reference {
                out.push(offset);
            } else if placed.field.field_type.is_value_type()
                && self
                    .require_layout(&placed.field.field_type)?
                    .has_references
            {
                self.reference_offsets(&placed.field.field_type, offset, out)?;
            }
        }
        Ok(())
    }

    pub(crate) fn build_layout(&self, node: &TypeNodeRc) -> Result<()> {
        let header = self.config.object_header_size;
        let pointer = self.config.pointer_size;

        let layout = match &node.kind {
            TypeKind::Array { element, .. } => {
                let element = self.field_metrics(element)?;
                FieldLayout {
                    instance_size: header + pointer * 2,
                    min_align: pointer,
                    blittable: false,
                    has_references: element.has_references,
                    fields: Vec::new(),
                    explicit_size: false,
                    underlying: None,
                    element_size: element.size,
                }
            }
            TypeKind::Pointer { managed, .. } => FieldLayout {
                instance_size: header + pointer,
                min_align: pointer,
                blittable: !managed,
                has_references: *managed,
                fields: Vec::new(),
                explicit_size: false,
                underlying: None,
                element_size: 0,
            },
            TypeKind::GenericParameter { .. } => FieldLayout {
                instance_size: header,
                min_align: pointer,
                blittable: false,
                has_references: false,
                fields: Vec::new(),
                explicit_size: false,
                underlying: None,
                element_size: 0,
            },
            TypeKind::Definition { .. } | TypeKind::GenericInstance { .. } => {
                self.type_layout(node)?
            }
        };

        log::debug!(
            "layout of {}: {} bytes, align {}, {} fields",
            node.full_name(),
            layout.instance_size,
            layout.min_align,
            layout.fields.len()
        );
        if node.layout.set(layout).is_ok() {
            self.stats.layout_computed();
        }
        Ok(())
    }

    fn type_layout(&self, node: &TypeNodeRc) -> Result<FieldLayout> {
        let header = self.config.object_header_size;
        let pointer = self.config.pointer_size;

        let (mut size, mut min_align, mut blittable, mut has_references) =
            match self.require_parent(node)? {
                Some(parent) => {
                    if let Some(failure) = parent.failure() {
                        return Err(Error::TypeLoad(failure));
                    }
                    let inherited = self.require_layout(&parent)?;
                    (
                        inherited.instance_size,
                        inherited.min_align,
                        inherited.blittable,
                        inherited.has_references,
                    )
                }
                None => (header, 1, true, false),
            };
        let base = size;

        let source = self.metadata_source(node)?;
        let class_layout = match &source {
            Some((module, token)) => module.reader.read_class_layout(*token)?,
            None => None,
        }
        .unwrap_or_default();
        if class_layout.packing_size >= MAX_PACKING {
            return Err(violation!(
                LayoutViolation,
                "packing size {} is out of range",
                class_layout.packing_size
            ));
        }
        let packing = match class_layout.packing_size {
            0 => u32::MAX,
            packing => packing,
        };

        let fields: Vec<FieldRc> = self
            .require_fields(node)?
            .iter()
            .filter(|field| !field.is_static())
            .cloned()
            .collect();
        let metrics = fields
            .iter()
            .map(|field| self.field_metrics(&field.field_type))
            .collect::<Result<Vec<_>>>()?;

        let is_value_type = node.is_value_type();
        let layout_kind = node.layout_kind();
        if layout_kind == TypeAttributes::AUTO_LAYOUT && !fields.is_empty() {
            blittable = false;
        }
        if metrics.iter().any(|m| !m.blittable) {
            blittable = false;
        }
        if metrics.iter().any(|m| m.has_references) {
            has_references = true;
        }

        let mut placed = Vec::with_capacity(fields.len());
        if layout_kind == TypeAttributes::EXPLICIT_LAYOUT {
            let Some((module, _)) = &source else {
                return Err(malformed_error!(
                    "{} has explicit layout but no metadata",
                    node.full_name()
                ));
            };
            let ceiling = self.own_field_ceiling(is_value_type, base);
            let mut claims: Vec<Claim> = Vec::new();
            for (field, m) in fields.iter().zip(&metrics) {
                let declared = module
                    .reader
                    .read_explicit_layout(field.token)?
                    .ok_or_else(|| {
                        violation!(
                            LayoutViolation,
                            "field {} of an explicit layout type has no offset",
                            field.name
                        )
                    })?;
                let relative = u32::try_from(declared.offset).map_err(|_| {
                    violation!(
                        LayoutViolation,
                        "field {} has invalid offset {}",
                        field.name,
                        declared.offset
                    )
                })?;
                let extent = declared.size.unwrap_or(m.size);
                if extent < m.size {
                    return Err(violation!(
                        LayoutViolation,
                        "field {} declares {} bytes but needs {}",
                        field.name,
                        extent,
                        m.size
                    ));
                }
                if u64::from(relative) + u64::from(extent) > ceiling {
                    return Err(violation!(
                        LayoutViolation,
                        "field {} at offset {} with {} bytes exceeds the size limit",
                        field.name,
                        relative,
                        extent
                    ));
                }
                // Bounded by the ceiling, so the sums below cannot overflow
                let offset = base + relative;
                if m.has_references && offset % pointer != 0 {
                    return Err(violation!(
                        LayoutViolation,
                        "reference field {} at offset {} is not pointer aligned",
                        field.name,
                        relative
                    ));
                }

                let mut references = Vec::new();
                if m.is_reference {
                    references.push(0);
                } else if m.has_references {
                    self.reference_offsets(&field.field_type, 0, &mut references)?;
                }
                self.claim_range(&mut claims, relative, extent, &references, &field.name)?;

                size = size.max(offset + extent);
                let align = m.align.min(packing);
                min_align = min_align.max(align);
                placed.push(FieldOffset {
                    field: field.clone(),
                    offset,
                    size: extent,
                    align,
                    is_reference: m.is_reference,
                });
            }
        } else {
            let clustered = layout_kind == TypeAttributes::AUTO_LAYOUT
                && match self.config.gc_aware_layout {
                    crate::config::GcAwareLayout::Disabled => false,
                    crate::config::GcAwareLayout::ReferenceTypes => !is_value_type,
                    crate::config::GcAwareLayout::All => true,
                };
            let mut order: Vec<usize> = (0..fields.len()).collect();
            if clustered {
                order.sort_by_key(|&index| !metrics[index].has_references);
            }

            for index in order {
                let m = metrics[index];
                let mut align = m.align.min(packing);
                if m.has_references {
                    align = align.max(pointer);
                }
                let offset = align_up(size, align);
                size = offset.checked_add(m.size).ok_or_else(|| {
                    violation!(
                        LayoutViolation,
                        "{} is too large to lay out",
                        node.full_name()
                    )
                })?;
                min_align = min_align.max(align);
                placed.push(FieldOffset {
                    field: fields[index].clone(),
                    offset,
                    size: m.size,
                    align,
                    is_reference: m.is_reference,
                });
            }
        }

        let mut explicit_size = false;
        if class_layout.class_size > 0 {
            size = size.max(header.saturating_add(class_layout.class_size));
            explicit_size = true;
        }
        if is_value_type && size == header {
            // Empty structs still occupy a byte
            size = header + 1;
        }
        if !explicit_size {
            size = align_up(size, min_align);
        }
        if size > self.config.max_instance_size {
            return Err(violation!(
                LayoutViolation,
                "instance size {} of {} exceeds the size limit",
                size,
                node.full_name()
            ));
        }

        if is_value_type {
            let value_size = size - header;
            if value_size == 0 || value_size > self.config.max_value_type_size {
                return Err(violation!(
                    LayoutViolation,
                    "value type size {} is out of range",
                    value_size
                ));
            }
        }

        let underlying = if node.is_enum() {
            let first = fields.first().ok_or_else(|| {
                malformed_error!("enum {} has no value field", node.full_name())
            })?;
            Some(first.field_type.clone())
        } else {
            None
        };

        Ok(FieldLayout {
            instance_size: size,
            min_align,
            blittable,
            has_references,
            fields: placed,
            explicit_size,
            underlying,
            element_size: 0,
        })
    }

    /// Bytes available to a type's own fields after `base`
    fn own_field_ceiling(&self, is_value_type: bool, base: u32) -> u64 {
        let header = u64::from(self.config.object_header_size);
        let instance = u64::from(self.config.max_instance_size).saturating_sub(u64::from(base));
        if is_value_type {
            let value = (u64::from(self.config.max_value_type_size) + header)
                .saturating_sub(u64::from(base));
            instance.min(value)
        } else {
            instance
        }
    }

    /// Record the bytes of one explicit-layout field, rejecting overlap of a reference with data
    ///
    /// `references` holds the offsets of the references inside the field, relative to `start`.
    fn claim_range(
        &self,
        claims: &mut Vec<Claim>,
        start: u32,
        extent: u32,
        references: &[u32],
        name: &str,
    ) -> Result<()> {
        let pointer = u64::from(self.config.pointer_size);
        let start = u64::from(start);
        let end = start + u64::from(extent);

        let mut sorted: Vec<u64> = references
            .iter()
            .map(|&offset| start + u64::from(offset))
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut pieces = Vec::with_capacity(sorted.len() * 2 + 1);
        let mut cursor = start;
        for reference in sorted {
            if reference > cursor {
                pieces.push(Claim {
                    start: cursor,
                    end: reference,
                    reference: false,
                });
            }
            let reference_end = (reference + pointer).min(end);
            pieces.push(Claim {
                start: reference.max(cursor),
                end: reference_end,
                reference: true,
            });
            cursor = cursor.max(reference_end);
        }
        if cursor < end {
            pieces.push(Claim {
                start: cursor,
                end,
                reference: false,
            });
        }

        for piece in &pieces {
            let clash = claims.iter().find(|claim| {
                claim.start < piece.end
                    && piece.start < claim.end
                    && claim.reference != piece.reference
            });
            if let Some(claim) = clash {
                return Err(violation!(
                    LayoutViolation,
                    "field {} overlaps a reference with data at offset {}",
                    name,
                    claim.start.max(piece.start)
                ));
            }
        }
        claims.extend(pieces);
        Ok(())
    }

    pub(crate) fn build_statics(&self, node: &TypeNodeRc) -> Result<()> {
        let statics: Vec<FieldRc> = match &node.kind {
            TypeKind::Definition { .. } | TypeKind::GenericInstance { .. } => self
                .require_fields(node)?
                .iter()
                .filter(|field| field.is_static() && !field.is_literal())
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let mut offset = 0;
        let mut has_references = false;
        let mut fields = Vec::with_capacity(statics.len());
        for field in statics {
            let m = self.field_metrics(&field.field_type)?;
            let align = if m.has_references {
                m.align.max(self.config.pointer_size)
            } else {
                m.align
            };
            let placed = align_up(offset, align);
            offset = placed + m.size;
            has_references |= m.has_references;
            fields.push(FieldOffset {
                field,
                offset: placed,
                size: m.size,
                align,
                is_reference: m.is_reference,
            });
        }

        let class_size = if !fields.is_empty() && offset == 0 { 8 } else { offset };
        let _ = node.statics.set(StaticLayout {
            class_size,
            has_references,
            fields,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GcAwareLayout, LoaderConfig},
        metadata::{builder::MetadataBuilder, flags::FieldAttributes, signature::TypeSignature},
        typesystem::FailureKind,
    };

    const PUBLIC: u32 = FieldAttributes::PUBLIC;

    fn load(md: MetadataBuilder, config: LoaderConfig, token: Token) -> (TypeLoader, Result<TypeNodeRc>) {
        let loader = TypeLoader::with_config(config);
        let module = loader.register_module("App", md.build()).unwrap();
        let result = loader.load(module, token);
        (loader, result)
    }

    #[test]
    fn test_sequential_struct() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Mixed")
            .field("a", PUBLIC, TypeSignature::U1)
            .field("b", PUBLIC, TypeSignature::I4)
            .field("c", PUBLIC, TypeSignature::I2)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert_eq!(layout.field("a").unwrap().offset, 16);
        assert_eq!(layout.field("b").unwrap().offset, 20);
        assert_eq!(layout.field("c").unwrap().offset, 24);
        assert_eq!(layout.min_align, 4);
        assert_eq!(layout.instance_size, 28);
        assert!(layout.blittable);
        assert!(!layout.has_references);
    }

    #[test]
    fn test_packing_caps_alignment() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Packed")
            .class_layout(1, 0)
            .field("a", PUBLIC, TypeSignature::U1)
            .field("b", PUBLIC, TypeSignature::I8)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let layout = node.unwrap().layout().unwrap().clone();
        assert_eq!(layout.field("b").unwrap().offset, 17);
        assert_eq!(layout.instance_size, 25);
    }

    #[test]
    fn test_gc_aware_clustering() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Node")
            .field("flag", PUBLIC, TypeSignature::Boolean)
            .field("next", PUBLIC, TypeSignature::Object)
            .field("count", PUBLIC, TypeSignature::I4)
            .field("name", PUBLIC, TypeSignature::String)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert_eq!(layout.fields[0].field.name, "next");
        assert_eq!(layout.fields[1].field.name, "name");
        assert_eq!(layout.field("next").unwrap().offset, 16);
        assert_eq!(layout.field("name").unwrap().offset, 24);
        assert!(layout.has_references);
        assert!(!layout.blittable);

        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Node")
            .field("flag", PUBLIC, TypeSignature::Boolean)
            .field("next", PUBLIC, TypeSignature::Object)
            .build();
        let (_, node) = load(
            md,
            LoaderConfig::default().with_gc_aware_layout(GcAwareLayout::Disabled),
            token,
        );
        let node = node.unwrap();
        assert_eq!(node.layout().unwrap().fields[0].field.name, "flag");
        assert_eq!(node.layout().unwrap().field("next").unwrap().offset, 24);
    }

    #[test]
    fn test_derived_fields_follow_parent() {
        let mut md = MetadataBuilder::new("App");
        let base = md
            .class("App", "Base")
            .field("x", PUBLIC, TypeSignature::I4)
            .build();
        let derived = md
            .class("App", "Derived")
            .extends(base)
            .field("y", PUBLIC, TypeSignature::I8)
            .build();
        let (loader, node) = load(md, LoaderConfig::default(), derived);
        let node = node.unwrap();
        let base = node.parent().unwrap();
        let base_size = loader.instance_size(&base).unwrap();
        assert_eq!(base_size, 24);
        let y = node.layout().unwrap().field("y").unwrap();
        assert!(y.offset >= base_size);
        assert_eq!(y.offset % 8, 0);
    }

    #[test]
    fn test_empty_struct_has_one_byte() {
        let mut md = MetadataBuilder::new("App");
        let token = md.value_type("App", "Empty").build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert_eq!(node.unwrap().layout().unwrap().value_size(16), 1);
    }

    #[test]
    fn test_explicit_union() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Union")
            .flags(
                TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            )
            .field_at("i", PUBLIC, TypeSignature::I4, 0)
            .field_at("f", PUBLIC, TypeSignature::R4, 0)
            .field_at("l", PUBLIC, TypeSignature::I8, 0)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert!(layout.fields.iter().all(|placed| placed.offset == 16));
        assert_eq!(layout.value_size(16), 8);
    }

    #[test]
    fn test_explicit_reference_overlap_is_rejected() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Bad")
            .flags(
                TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            )
            .field_at("o", PUBLIC, TypeSignature::Object, 0)
            .field_at("i", PUBLIC, TypeSignature::I8, 0)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let Err(Error::TypeLoad(diagnostic)) = node else {
            panic!("overlapping a reference with data must fail");
        };
        assert_eq!(diagnostic.kind, FailureKind::LayoutViolation);
    }

    #[test]
    fn test_explicit_misaligned_reference() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Bad")
            .with_flags(TypeAttributes::EXPLICIT_LAYOUT)
            .field_at("o", PUBLIC, TypeSignature::Object, 4)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert!(matches!(
            node,
            Err(Error::TypeLoad(diagnostic)) if diagnostic.kind == FailureKind::LayoutViolation
        ));
    }

    #[test]
    fn test_explicit_references_may_alias() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Alias")
            .with_flags(TypeAttributes::EXPLICIT_LAYOUT)
            .field_at("a", PUBLIC, TypeSignature::Object, 0)
            .field_at("b", PUBLIC, TypeSignature::String, 0)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert_eq!(node.unwrap().layout().unwrap().instance_size, 24);
    }

    #[test]
    fn test_explicit_offset_near_limit_is_rejected() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Far")
            .with_flags(TypeAttributes::EXPLICIT_LAYOUT)
            .field_at("x", PUBLIC, TypeSignature::I4, i64::from(u32::MAX - 4))
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert!(matches!(
            node,
            Err(Error::TypeLoad(diagnostic)) if diagnostic.kind == FailureKind::LayoutViolation
        ));
    }

    #[test]
    fn test_explicit_offset_beyond_value_type_ceiling() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Huge")
            .flags(
                TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            )
            .field_at("x", PUBLIC, TypeSignature::I4, 1 << 30)
            .build();
        let started = std::time::Instant::now();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert!(matches!(
            node,
            Err(Error::TypeLoad(diagnostic)) if diagnostic.kind == FailureKind::LayoutViolation
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_explicit_class_offset_within_limit() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Sparse")
            .with_flags(TypeAttributes::EXPLICIT_LAYOUT)
            .field_at("head", PUBLIC, TypeSignature::Object, 0)
            .field_at("tail", PUBLIC, TypeSignature::I8, 1 << 20)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert_eq!(layout.field("tail").unwrap().offset, 16 + (1 << 20));
        assert_eq!(layout.instance_size, 16 + (1 << 20) + 8);

        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Sparse")
            .with_flags(TypeAttributes::EXPLICIT_LAYOUT)
            .field_at("tail", PUBLIC, TypeSignature::I8, 1 << 30)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert!(matches!(
            node,
            Err(Error::TypeLoad(diagnostic)) if diagnostic.kind == FailureKind::LayoutViolation
        ));
    }

    #[test]
    fn test_explicit_data_over_nested_reference() {
        let mut md = MetadataBuilder::new("App");
        let inner = md
            .value_type("App", "Inner")
            .field("count", PUBLIC, TypeSignature::I8)
            .field("name", PUBLIC, TypeSignature::String)
            .build();
        let token = md
            .value_type("App", "Outer")
            .flags(
                TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            )
            .field_at("inner", PUBLIC, TypeSignature::ValueType(inner), 0)
            .field_at("count", PUBLIC, TypeSignature::I8, 0)
            .field_at("spill", PUBLIC, TypeSignature::I8, 8)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let Err(Error::TypeLoad(diagnostic)) = node else {
            panic!("data over the nested reference must fail");
        };
        assert_eq!(diagnostic.kind, FailureKind::LayoutViolation);
        assert!(diagnostic.message.contains("spill"), "{}", diagnostic.message);
    }

    #[test]
    fn test_explicit_size_too_small() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Short")
            .flags(
                TypeAttributes::PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            )
            .field_at_sized("l", PUBLIC, TypeSignature::I8, 0, 4)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert!(matches!(
            node,
            Err(Error::TypeLoad(diagnostic)) if diagnostic.kind == FailureKind::LayoutViolation
        ));
    }

    #[test]
    fn test_class_size_enlarges() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .value_type("App", "Buffer")
            .class_layout(0, 30)
            .field("a", PUBLIC, TypeSignature::I4)
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert!(layout.explicit_size);
        assert_eq!(layout.value_size(16), 30);
    }

    #[test]
    fn test_invalid_packing() {
        let mut md = MetadataBuilder::new("App");
        let token = md.value_type("App", "P").class_layout(256, 0).build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        assert!(matches!(
            node,
            Err(Error::TypeLoad(diagnostic)) if diagnostic.kind == FailureKind::LayoutViolation
        ));
    }

    #[test]
    fn test_recursive_struct_is_cyclic() {
        let mut md = MetadataBuilder::new("App");
        let token = md.next_type_token();
        md.value_type("App", "Loop")
            .field("inner", PUBLIC, TypeSignature::ValueType(token))
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let Err(Error::TypeLoad(diagnostic)) = node else {
            panic!("a struct containing itself cannot be laid out");
        };
        assert_eq!(diagnostic.root_cause().kind, FailureKind::CyclicDefinition);
    }

    #[test]
    fn test_enum_underlying_type() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .type_def("App", "Color")
            .flags(TypeAttributes::PUBLIC | TypeAttributes::SEALED)
            .extends(PrimitiveKind::Enum.token())
            .field("value__", PUBLIC, TypeSignature::U1)
            .field(
                "Red",
                FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::LITERAL,
                TypeSignature::U1,
            )
            .build();
        let (_, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert_eq!(
            layout.underlying.as_ref().unwrap().primitive,
            Some(PrimitiveKind::U1)
        );
        assert_eq!(layout.value_size(16), 1);
        assert_eq!(node.static_layout().unwrap().class_size, 0);
    }

    #[test]
    fn test_static_layout() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Counters")
            .field("hits", FieldAttributes::STATIC, TypeSignature::I4)
            .field("cache", FieldAttributes::STATIC, TypeSignature::Object)
            .field("instance", PUBLIC, TypeSignature::I4)
            .build();
        let (loader, node) = load(md, LoaderConfig::default(), token);
        let node = node.unwrap();
        let statics = loader.static_layout(&node).unwrap();
        assert_eq!(statics.fields.len(), 2);
        assert_eq!(statics.fields[0].offset, 0);
        assert_eq!(statics.fields[1].offset, 8);
        assert_eq!(statics.class_size, 16);
        assert!(statics.has_references);
        assert_eq!(node.layout().unwrap().fields.len(), 1);
    }

    #[test]
    fn test_arrays_record_element_size() {
        let loader = TypeLoader::new();
        let int = loader.primitive(PrimitiveKind::I4);
        let ints = loader.array_of(&int, 1, false).unwrap();
        let layout = loader.layout(&ints).unwrap();
        assert_eq!(layout.element_size, 4);
        assert!(!layout.has_references);

        let strings = loader
            .array_of(&loader.primitive(PrimitiveKind::String), 1, false)
            .unwrap();
        let layout = loader.layout(&strings).unwrap();
        assert_eq!(layout.element_size, 8);
        assert!(layout.has_references);
    }

    #[test]
    fn test_32bit_target() {
        let mut md = MetadataBuilder::new("App");
        let token = md
            .class("App", "Pair")
            .field("a", PUBLIC, TypeSignature::Object)
            .field("b", PUBLIC, TypeSignature::I4)
            .build();
        let (_, node) = load(md, LoaderConfig::target_32bit(), token);
        let node = node.unwrap();
        let layout = node.layout().unwrap();
        assert_eq!(layout.field("a").unwrap().offset, 8);
        assert_eq!(layout.field("b").unwrap().offset, 12);
        assert_eq!(layout.instance_size, 16);
    }
}
