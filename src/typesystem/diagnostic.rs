//! Failure records attached to type nodes.
//!
//! A type that cannot be built is not torn down: it keeps its place in the graph, flagged with
//! `HAS_FAILURE`, and carries a [`Diagnostic`]. Diagnostics chain to the diagnostic of the
//! dependency that caused them, so a failure deep in a hierarchy can be explained from any of the
//! types that inherited it.

use std::{fmt, sync::Arc};

use strum::{Display, EnumIter};

/// Why a type failed to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum FailureKind {
    /// Bad token or out-of-range index in the metadata
    MetadataMalformed,
    /// The parent chain or field graph recurses into itself
    CyclicDefinition,
    /// Explicit offset conflicts, alignment violations, oversized value types
    LayoutViolation,
    /// An interface or abstract method has no implementation in a concrete type
    DispatchUnsatisfied,
    /// Ambiguous default interface implementations
    DispatchConflict,
    /// A generic argument violates its parameter's constraints
    GenericArgumentInvalid,
    /// Something the type depends on failed first
    DependencyFailed,
}

/// A causally-chained failure reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Failure category
    pub kind: FailureKind,
    /// Full name of the type the failure was recorded on
    pub type_name: String,
    /// Human readable reason
    pub message: String,
    /// Failure of the dependency that caused this one
    pub cause: Option<Arc<Diagnostic>>,
}

impl Diagnostic {
    /// Create a diagnostic without a cause
    pub fn new(kind: FailureKind, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            type_name: type_name.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the diagnostic of the dependency that failed first
    #[must_use]
    pub fn caused_by(mut self, cause: Arc<Diagnostic>) -> Self {
        self.cause = Some(cause);
        self
    }

    /// The innermost diagnostic of the chain
    #[must_use]
    pub fn root_cause(&self) -> &Diagnostic {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }

    /// Iterate the chain starting at this diagnostic
    pub fn chain(&self) -> impl Iterator<Item = &Diagnostic> {
        std::iter::successors(Some(self), |diagnostic| diagnostic.cause.as_deref())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.kind, self.type_name, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {})", cause)?;
        }
        Ok(())
    }
}
