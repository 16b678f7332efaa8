//! Metadata boundary of the loader.
//!
//! This module defines what the loader consumes: tokens, attribute flags, decoded signatures and
//! the [`reader::MetadataReader`] trait. The loader treats metadata as an opaque, read-only
//! external format; [`builder`] provides an in-memory implementation.
//!
//! # Key Components
//! - [`token::Token`] - table/row addressing
//! - [`flags`] - type, field, method and generic parameter attributes
//! - [`signature::TypeSignature`] / [`signature::SignatureMethod`] - decoded signatures
//! - [`reader::MetadataReader`] - row lookup by token
//! - [`builder::MetadataBuilder`] - fluent construction of in-memory modules

/// In-memory metadata tables and their builder
pub mod builder;
/// Attribute flags of metadata rows
pub mod flags;
/// The reader trait and its row types
pub mod reader;
/// Decoded type and method signatures
pub mod signature;
/// Metadata tokens
pub mod token;
