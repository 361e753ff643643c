//! Error type for the query execution core.
//!
//! The engine this core was modeled on threads a `RC` result-code enum
//! through every call (`open`/`next`/`close`, binder steps, expression
//! evaluation) and compares it against a success sentinel at every call
//! site. Here the same set of outcomes is expressed as a proper
//! `std::error::Error` via [`thiserror`], propagated with `?` instead of
//! checked by hand.

use crate::value::AttrType;
use thiserror::Error;

/// All failure modes the core can produce.
///
/// Variant names echo the original result-code vocabulary (`RECORD_EOF`,
/// `SCHEMA_FIELD_MISSING`, ...) so a reader already familiar with that
/// vocabulary can map one to the other directly.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Not a failure in the ordinary sense: signals "no more rows" from an
    /// iterator-style `next()`. Kept as an error variant (rather than an
    /// `Option`/`bool`) because it must flow through the same `?`-propagated
    /// call chains as genuine failures, and several operators (NOT IN,
    /// EXISTS) inspect it explicitly.
    #[error("record stream exhausted")]
    RecordEof,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("field not found: {0}")]
    SchemaFieldMissing(String),

    #[error("field type mismatch: expected {expected:?}, found {found:?}")]
    SchemaFieldTypeMismatch { expected: AttrType, found: AttrType },

    #[error("table does not exist: {0}")]
    SchemaTableNotExist(String),

    #[error("duplicate key on record")]
    RecordDuplicateKey,

    #[error("invalid record key")]
    RecordInvalidKey,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True for the sentinel that means "iterator exhausted", as opposed to
    /// a genuine failure. Operators use this to distinguish a clean end of
    /// stream from an error they must propagate.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::RecordEof)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
