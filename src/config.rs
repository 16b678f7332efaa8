//! Loader configuration
//!
//! [`LoaderConfig`] describes the target the layouts are computed for and the limits that keep
//! construction of pathological metadata finite. It is a small `Copy` value handed to
//! [`crate::TypeLoader::with_config`]; every loader keeps its own copy.

/// Which types get their reference fields clustered by the two-pass layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcAwareLayout {
    /// Always lay out fields in declaration order
    Disabled,
    /// Cluster reference fields of auto-layout reference types
    ReferenceTypes,
    /// Cluster reference fields of all auto-layout types, value types included
    All,
}

/// Configuration for type loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Size of a managed reference and native integer, 4 or 8
    pub pointer_size: u32,

    /// Size of the header that precedes the instance data of every object
    pub object_header_size: u32,

    /// Two-pass clustering of fields that contain references
    pub gc_aware_layout: GcAwareLayout,

    /// Sanity ceiling for the unboxed size of a value type
    pub max_value_type_size: u32,

    /// Sanity ceiling for the boxed instance size of any type, header included
    pub max_instance_size: u32,

    /// Maximum number of nested constructions on one thread before a type is considered
    /// cyclic (default: 64)
    pub max_recursion_depth: usize,

    /// Maximum nesting depth of generic type arguments (default: 32)
    pub max_generic_depth: usize,

    /// Reuse the parent's vtable when a type neither adds nor overrides slots
    pub share_vtables: bool,

    /// Check generic arguments against their parameter constraints
    pub validate_constraints: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            object_header_size: 16,
            gc_aware_layout: GcAwareLayout::ReferenceTypes,
            max_value_type_size: 1024 * 1024,
            max_instance_size: 256 * 1024 * 1024,
            max_recursion_depth: 64,
            max_generic_depth: 32,
            share_vtables: true,
            validate_constraints: true,
        }
    }
}

impl LoaderConfig {
    /// Configuration for a 32-bit target
    #[must_use]
    pub fn target_32bit() -> Self {
        Self {
            pointer_size: 4,
            object_header_size: 8,
            ..Self::default()
        }
    }

    /// Packs fields in declaration order and keeps every vtable private
    ///
    /// Useful when layouts must be predictable from the metadata alone, e.g. when comparing
    /// against a native compiler.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            gc_aware_layout: GcAwareLayout::Disabled,
            share_vtables: false,
            ..Self::default()
        }
    }

    /// All checks enabled, with tighter limits
    #[must_use]
    pub fn strict() -> Self {
        Self {
            gc_aware_layout: GcAwareLayout::All,
            max_value_type_size: 64 * 1024,
            max_instance_size: 16 * 1024 * 1024,
            max_recursion_depth: 32,
            max_generic_depth: 16,
            ..Self::default()
        }
    }

    /// Override the pointer size, keeping the header at two pointers
    #[must_use]
    pub fn with_pointer_size(mut self, pointer_size: u32) -> Self {
        self.pointer_size = pointer_size;
        self.object_header_size = pointer_size * 2;
        self
    }

    /// Override the GC-aware layout mode
    #[must_use]
    pub fn with_gc_aware_layout(mut self, mode: GcAwareLayout) -> Self {
        self.gc_aware_layout = mode;
        self
    }

    /// Override the recursion limit
    #[must_use]
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Override the generic nesting limit
    #[must_use]
    pub fn with_max_generic_depth(mut self, depth: usize) -> Self {
        self.max_generic_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_config_presets() {
        let default = LoaderConfig::default();
        assert_eq!(default.pointer_size, 8);
        assert_eq!(default.object_header_size, 16);
        assert_eq!(default.gc_aware_layout, GcAwareLayout::ReferenceTypes);
        assert!(default.share_vtables);

        let small = LoaderConfig::target_32bit();
        assert_eq!(small.pointer_size, 4);
        assert_eq!(small.object_header_size, 8);

        let compact = LoaderConfig::compact();
        assert_eq!(compact.gc_aware_layout, GcAwareLayout::Disabled);
        assert!(!compact.share_vtables);

        let strict = LoaderConfig::strict();
        assert_eq!(strict.gc_aware_layout, GcAwareLayout::All);
        assert!(strict.max_recursion_depth < default.max_recursion_depth);
        assert!(strict.max_instance_size < default.max_instance_size);
    }

    #[test]
    fn test_loader_config_builders() {
        let config = LoaderConfig::default()
            .with_pointer_size(4)
            .with_gc_aware_layout(GcAwareLayout::All)
            .with_max_generic_depth(4);
        assert_eq!(config.object_header_size, 8);
        assert_eq!(config.gc_aware_layout, GcAwareLayout::All);
        assert_eq!(config.max_generic_depth, 4);
    }
}
