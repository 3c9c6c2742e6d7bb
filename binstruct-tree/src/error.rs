use std::error::Error;

use thiserror::Error;

/// The kind of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// A span or field lies outside of the bounds of its buffer.
    #[error("data is truncated")]
    Truncated,
    /// A fixed signature such as `MPDB`, `BSJB` or `RSDS` does not match.
    #[error("invalid signature")]
    BadMagic,
    /// A DEFLATE stream is corrupt or does not inflate to its declared size.
    #[error("invalid compressed data")]
    Decompression,
    /// Two sibling spans overlap without one containing the other.
    #[error("overlapping spans")]
    Overlap,
    /// A span has a length that is inconsistent with its structure.
    #[error("invalid length")]
    InvalidLength,
    /// An extra section of a method body declares no section data.
    #[error("invalid extra section length")]
    InvalidSectionLength,
    /// A method body chains more extra sections than allowed.
    #[error("too many extra sections")]
    TooManySections,
    /// A string is not terminated or not valid UTF-8.
    #[error("invalid string data")]
    InvalidString,
}

/// An error encountered while building a [`Tree`](crate::Tree).
///
/// Every error carries the absolute offset, within the buffer that was being decoded, at which
/// the problem was detected.
#[derive(Debug, Error)]
#[error("{kind} at offset {offset:#x}")]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    #[source]
    pub(crate) source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ParseError {
    /// Creates a new error from a known kind of error as well as an arbitrary error payload.
    pub(crate) fn new<E>(kind: ParseErrorKind, offset: usize, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self {
            kind,
            offset,
            source,
        }
    }

    /// Creates a new error without a payload.
    pub(crate) fn at(kind: ParseErrorKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            source: None,
        }
    }

    /// Returns the corresponding [`ParseErrorKind`] for this error.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    /// Returns the absolute offset at which the error occurred.
    pub fn offset(&self) -> usize {
        self.offset
    }
}
