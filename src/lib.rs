// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotloader
//!
//! The class loader of a managed runtime. `dotloader` turns ECMA-335 style type metadata into a
//! graph of runtime types, on demand and from any number of threads:
//!
//! - **Type graph** - one canonical node per definition, generic instance, array and pointer
//!   type, each driven through its construction stages at most once
//! - **Generic instantiation** - interned instances keyed by definition and arguments, lazy
//!   parents, constraint validation
//! - **Field layout** - sequential, automatic (reference clustering) and explicit layouts with
//!   packing, explicit sizes and overlap validation
//! - **Dispatch** - vtables with override resolution, interface offsets, default interface
//!   methods with most-specific selection, and structural vtable sharing
//! - **Interface identity** - process-wide interface ids and compressed membership bitmaps
//!
//! Types that cannot be built do not abort loading. The problem is recorded on the type as a
//! causally chained [`Diagnostic`] and reported as [`Error::TypeLoad`] wherever the type is used.
//!
//! ## Quick Start
//!
//! ```rust
//! use dotloader::prelude::*;
//!
//! let mut md = MetadataBuilder::new("App");
//! let shape = md
//!     .interface("App", "IShape")
//!     .method(
//!         "Area",
//!         MethodAttributes::PUBLIC
//!             | MethodAttributes::VIRTUAL
//!             | MethodAttributes::NEW_SLOT
//!             | MethodAttributes::ABSTRACT,
//!         SignatureMethod::instance(TypeSignature::R8, vec![]),
//!     )
//!     .build();
//! let circle = md
//!     .class("App", "Circle")
//!     .implements(shape)
//!     .field("radius", FieldAttributes::PUBLIC, TypeSignature::R8)
//!     .method(
//!         "Area",
//!         MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT,
//!         SignatureMethod::instance(TypeSignature::R8, vec![]),
//!     )
//!     .build();
//!
//! let loader = TypeLoader::new();
//! let module = loader.register_module("App", md.build())?;
//! let circle = loader.load(module, circle)?;
//! let shape = loader.resolve(module, shape)?;
//!
//! assert!(loader.is_assignable_from(&shape, &circle)?);
//! assert_eq!(loader.interface_offset(&circle, &shape)?, Some(1));
//! assert_eq!(loader.instance_size(&circle)?, 16 + 8);
//! # Ok::<(), dotloader::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - tokens, flags, signatures, the [`metadata::reader::MetadataReader`] trait
//!   and an in-memory [`metadata::builder::MetadataBuilder`]
//! - [`typesystem`] - the published data model: nodes, members, layouts, vtables, diagnostics
//! - [`loader`] - the [`TypeLoader`] and its construction engines
//! - [`config`] - target and policy knobs in [`LoaderConfig`]
//! - [`prelude`] - convenient re-exports

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotloader::prelude::*;
///
/// let loader = TypeLoader::with_config(LoaderConfig::target_32bit());
/// let int = loader.primitive(PrimitiveKind::I4);
/// assert_eq!(loader.instance_size(&int)?, 8 + 4);
/// # Ok::<(), dotloader::Error>(())
/// ```
pub mod prelude;

/// Loader configuration
pub mod config;

/// The metadata the loader consumes
pub mod metadata;

/// The runtime type graph
pub mod typesystem;

/// Construction of types, layouts and dispatch tables
pub mod loader;

/// `dotloader` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotloader` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for the categories.
pub use error::Error;

pub use config::{GcAwareLayout, LoaderConfig};
pub use loader::{LoaderStats, StatsSnapshot, TypeLoader};
pub use typesystem::{Diagnostic, FailureKind, PrimitiveKind, TypeNodeRc};
