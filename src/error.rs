//! Typed errors with byte-offset propagation.

use crate::object::ObjectId;
use std::io;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised while reading a PDF document.
///
/// Errors are terminal for the current call. Whenever the parser knows the
/// byte offset at which it observed a violation, the offset is part of the
/// error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A syntax violation: an unexpected byte, a bad keyword, an invalid
    /// xref record, a missing required dictionary key.
    #[error("malformed document at byte {offset}: {detail}")]
    Malformed {
        /// Offset at which the violation was observed.
        offset: u64,
        /// What was wrong.
        detail: String,
    },
    /// The source ended before an expected token or byte.
    #[error("unexpected end of data at byte {offset}")]
    Truncated {
        /// Offset at which more data was expected.
        offset: u64,
    },
    /// A referenced object is absent or free where one is required.
    #[error("unresolved reference to {0}")]
    UnresolvedReference(ObjectId),
    /// An indirect object header did not match the identifier the
    /// cross-reference table promised.
    #[error("object header mismatch: expected {expected}, found {found}")]
    InconsistentObject {
        /// The identifier the xref entry was looked up with.
        expected: ObjectId,
        /// The identifier found in the object header.
        found: ObjectId,
    },
    /// A stream decoder failed.
    #[error("{filter} filter failed: {detail}")]
    Filter {
        /// Name of the failing filter.
        filter: &'static str,
        /// Decoder-specific detail.
        detail: String,
    },
    /// The underlying byte source failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    #[inline]
    pub(crate) fn malformed(offset: u64, detail: impl Into<String>) -> Self {
        Error::Malformed {
            offset,
            detail: detail.into(),
        }
    }

    #[inline]
    pub(crate) fn filter(filter: &'static str, detail: impl Into<String>) -> Self {
        Error::Filter {
            filter,
            detail: detail.into(),
        }
    }
}
