use std::sync::Arc;

use thiserror::Error;

use crate::{metadata::token::Token, typesystem::Diagnostic};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };
    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! violation {
    ($kind:ident, $msg:expr) => {
        crate::Error::Violation {
            kind: crate::typesystem::FailureKind::$kind,
            message: $msg.to_string(),
        }
    };
    ($kind:ident, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Violation {
            kind: crate::typesystem::FailureKind::$kind,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Load-time problems of an individual type are not reported through this enum while the type is
/// being built. They are recorded on the type node as a [`Diagnostic`] and only surface as
/// [`Error::TypeLoad`] when a caller actually uses the broken type.
///
/// # Error Categories
///
/// ## Metadata Errors
/// - [`Error::Malformed`] - Bad token or out-of-range row reported by a metadata reader
/// - [`Error::TypeNotFound`] - A token does not name any known type
/// - [`Error::ModuleNotFound`] - A `TypeRef` scope or module id is not registered
///
/// ## Use-site Errors
/// - [`Error::TypeLoad`] - The type failed to load; carries the stored diagnostic
/// - [`Error::DispatchConflict`] - A conflicted vtable slot was invoked
/// - [`Error::NotVirtual`] - A dispatch query named a non-virtual method
/// - [`Error::NotImplemented`] - A dispatch query named a method the type does not inherit
/// - [`Error::GenericArity`] - Wrong number of type arguments for an instantiation
/// - [`Error::AbstractSlot`] - An empty slot of an abstract type was invoked
///
/// ## Internal Errors
/// - [`Error::Violation`] - A construction rule was broken, recorded on the type being built
/// - [`Error::RecursionLimit`] - Maximum construction depth exceeded
/// - [`Error::LockError`] - Thread synchronization failure
///
/// # Examples
///
/// ```rust
/// use dotloader::{Error, FailureKind};
///
/// fn report(error: &Error) -> String {
///     match error {
///         Error::TypeLoad(diagnostic) if diagnostic.kind == FailureKind::DispatchUnsatisfied => {
///             format!("missing implementation: {}", diagnostic)
///         }
///         other => other.to_string(),
///     }
/// }
/// # let _ = report;
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata is damaged and could not be interpreted.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
    /// Failed to find a type for a token.
    ///
    /// The associated [`Token`] identifies which type was not found.
    #[error("Failed to find type - {0}")]
    TypeNotFound(Token),
    /// A module name or id is not registered with the loader.
    #[error("Module is not registered - {0}")]
    ModuleNotFound(String),
    /// The type failed to load.
    ///
    /// Carries the causally-chained diagnostic recorded on the type node when construction
    /// failed. Every later use of the type returns the same diagnostic.
    #[error("Type failed to load: {0}")]
    TypeLoad(Arc<Diagnostic>),
    /// A vtable slot with more than one equally specific default implementation was invoked.
    #[error("Ambiguous default implementation for slot {slot} of {type_name}")]
    DispatchConflict {
        /// Full name of the type owning the vtable
        type_name: String,
        /// The conflicted slot index
        slot: u32,
    },
    /// A dispatch query named a method that has no vtable slot.
    #[error("Method {0} is not virtual")]
    NotVirtual(String),
    /// A dispatch query named a method of a type that is neither an ancestor nor an implemented
    /// interface of the queried type.
    #[error("{type_name} neither inherits nor implements {declaring}")]
    NotImplemented {
        /// Full name of the queried type
        type_name: String,
        /// Full name of the method's declaring type
        declaring: String,
    },
    /// A dispatch query hit an empty slot of an abstract type.
    #[error("Slot {slot} of abstract type {type_name} has no implementation")]
    AbstractSlot {
        /// Full name of the type owning the vtable
        type_name: String,
        /// The empty slot index
        slot: u32,
    },
    /// A construction rule was broken while building a type.
    ///
    /// Raised inside the loader's construction engines and converted into a [`Diagnostic`] of
    /// the given kind on the type under construction.
    #[error("{kind}: {message}")]
    Violation {
        /// Failure category recorded on the type
        kind: crate::typesystem::FailureKind,
        /// Human readable reason
        message: String,
    },
    /// Wrong number of type arguments for a generic definition, or the definition is not generic.
    #[error("{definition} expects {expected} type arguments, got {actual}")]
    GenericArity {
        /// Full name of the definition
        definition: String,
        /// Number of declared generic parameters
        expected: usize,
        /// Number of supplied arguments
        actual: usize,
    },
    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}
