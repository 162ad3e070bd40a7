//! Error types for pagetree.

use thiserror::Error;

use crate::common::PageId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagetree.
///
/// Node overflow is deliberately absent: it is an internal signal that the
/// tree consumes by splitting, and a well-formed tree never surfaces it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The allocator has no free run of the requested length.
    #[error("out of space: no free run of {requested} pages")]
    OutOfSpace { requested: usize },

    /// An extent read found a different magic tag than expected.
    #[error("{page} is not an extent: expected magic {expected}, found {found}")]
    BadMagic {
        page: PageId,
        expected: String,
        found: String,
    },

    /// A descent revisited a page it had already passed through.
    #[error("btree corrupted: cycle detected at {0}")]
    CycleDetected(PageId),

    /// Page contents could not be trusted.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The request was rejected before any mutation happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The page lies outside the paged address space.
    #[error("{0} is out of range")]
    PageOutOfRange(PageId),

    /// Failure of the underlying paged storage.
    #[error("paging failure: {0}")]
    Io(#[source] std::io::Error),
}

impl Error {
    /// Whether the error means the on-disk structure cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::BadMagic { .. } | Error::CycleDetected(_) | Error::Corruption(_)
        )
    }

    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        Error::Corruption(message.into())
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Running out of input while decoding `what` means the page contents
    /// are wrong, not that I/O failed.
    pub(crate) fn eof_as_corruption(self, what: &str) -> Self {
        match self {
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::corruption(format!("{what} ends early"))
            }
            other => other,
        }
    }
}

/// Extent streams implement `std::io::Write`/`Read`, so crate errors raised
/// while a codec is writing (e.g. `OutOfSpace`) come back wrapped in an
/// `io::Error`. Unwrap them here so callers see the original variant.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Io(err),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(io) => io,
            other => std::io::Error::other(other),
        }
    }
}
