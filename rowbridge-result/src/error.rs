use std::{fmt, io};
use thiserror::Error;

/// Unified error type for all rowbridge operations.
///
/// Variants are grouped by the phase that raises them. Bind-time variants
/// abort before any page is pinned; conversion variants abort the running
/// scan after the cursor has released its pin.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error surfaced by a row-store backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow error while assembling a columnar batch.
    ///
    /// Typically raised when a builder rejects a data type (for example an
    /// invalid decimal precision) or when a record batch fails schema checks.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A source column type has no columnar equivalent.
    ///
    /// Raised only while binding a scan, never while converting values. The
    /// column name and the row-store type name are included so the caller can
    /// report which column blocked the scan.
    #[error("column \"{column}\" has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    /// A value does not fit the destination representation.
    ///
    /// For the row-to-column direction the numeric double fallback is decided
    /// per column at bind time, so this only surfaces for values that violate
    /// their declared column type (for example a NaN in a decimal column).
    #[error("overflow converting value: {0}")]
    OverflowOnConvert(String),

    /// A list value is not rectangular.
    ///
    /// `dimension` is 1-based: the outermost list is dimension 1.
    #[error(
        "jagged array input: expected {expected} values in list at dimension {dimension}, found {found}"
    )]
    JaggedArrayInput {
        dimension: usize,
        expected: usize,
        found: usize,
    },

    /// The scan was cancelled.
    ///
    /// All pins and worker handles are released before this error is
    /// returned. It is not a scan failure.
    #[error("scan cancelled")]
    Cancelled,

    /// An on-disk value could not be decoded.
    ///
    /// Raised for truncated varlena headers, malformed compressed streams,
    /// invalid UTF-8 in text columns and similar corruption.
    #[error("corrupt datum: {0}")]
    CorruptDatum(String),

    /// Invalid caller input.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// A relation, block, toast chunk or enum type was not found.
    #[error("Storage key not found")]
    NotFound,

    /// Internal error indicating a bug or unexpected state.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::OverflowOnConvert`] from any displayable message.
    ///
    /// # Examples
    ///
    /// ```
    /// use rowbridge_result::Error;
    ///
    /// let err = Error::overflow(format_args!("{} does not fit in i16", 40_000));
    /// assert!(matches!(err, Error::OverflowOnConvert(_)));
    /// ```
    #[inline]
    pub fn overflow<M: fmt::Display>(msg: M) -> Self {
        Error::OverflowOnConvert(msg.to_string())
    }

    /// Build an [`Error::CorruptDatum`] from any displayable message.
    #[inline]
    pub fn corrupt<M: fmt::Display>(msg: M) -> Self {
        Error::CorruptDatum(msg.to_string())
    }

    /// Whether this error represents a cancelled scan rather than a failure.
    #[inline]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jagged_message_names_dimension() {
        let err = Error::JaggedArrayInput {
            dimension: 2,
            expected: 2,
            found: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("dimension 2"), "{msg}");
        assert!(msg.contains("expected 2"), "{msg}");
    }

    #[test]
    fn cancellation_is_distinguished() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::Internal("boom".into()).is_cancellation());
        assert!(!Error::overflow("x").is_cancellation());
    }

    #[test]
    fn io_converts_with_question_mark() {
        fn fails() -> crate::Result<()> {
            Err(io::Error::other("disk gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(Error::Io(_))));
    }
}
