//! Error types for walker compilation and traversal.

use std::fmt;

use crate::kind::Kind;
use crate::shape::Shape;

/// Errors surfaced while compiling a walker or during a traversal.
///
/// Configuration gaps and handler failures are errors; handler defects
/// (writing through a non-addressable slot, indexing out of range,
/// walking an invalid field or a nil pointer) panic instead.
pub enum WalkError {
    /// No compile callback registered for a kind the type graph needs.
    UnregisteredKind {
        kind: Kind,
        shape: &'static Shape,
    },
    /// A nested field path stepped into a non-struct shape.
    NotAStruct { shape: &'static Shape },
    /// A registered field index is outside the declared field list.
    FieldIndexOutOfBounds {
        index: usize,
        field_count: usize,
        shape: &'static Shape,
    },
    /// A dynamic slot was walked while empty.
    NilDynamic { shape: &'static Shape },
    /// An error raised by a handler, propagated unchanged.
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl WalkError {
    /// Wraps a handler-originated error.
    pub fn custom(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        WalkError::Handler(err.into())
    }
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkError::UnregisteredKind { kind, shape } => {
                write!(
                    f,
                    "no compile callback registered for kind {kind} (required by {shape})"
                )
            }
            WalkError::NotAStruct { shape } => {
                write!(f, "field path steps into {shape}, which is not a struct")
            }
            WalkError::FieldIndexOutOfBounds {
                index,
                field_count,
                shape,
            } => {
                write!(
                    f,
                    "field index {index} out of bounds for {shape} ({field_count} fields)"
                )
            }
            WalkError::NilDynamic { shape } => {
                write!(f, "walked an empty dynamic value of type {shape}")
            }
            WalkError::Handler(err) => write!(f, "handler error: {err}"),
        }
    }
}

impl fmt::Debug for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for WalkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WalkError::Handler(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<fmt::Error> for WalkError {
    fn from(err: fmt::Error) -> Self {
        WalkError::custom(err)
    }
}
