use std::error::Error as StdError;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The source identifier is empty or cannot be used.
    InvalidSource,
    /// The source exists but its content type is not supported.
    Unsupported,
    /// Fetching or reading the source failed.
    Load,
    /// The embedder failed.
    Embedding,
    /// The vector index rejected an operation.
    Index,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidSource => write!(f, "Invalid source"),
            ErrorKind::Unsupported => write!(f, "Unsupported content"),
            ErrorKind::Load => write!(f, "Load error"),
            ErrorKind::Embedding => write!(f, "Embedding error"),
            ErrorKind::Index => write!(f, "Index error"),
        }
    }
}

/// A knowledge base error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    reason: String,
}

impl Error {
    #[inline]
    pub(crate) fn new<S: Into<String>>(kind: ErrorKind, reason: S) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Creates an index error; for implementors of
    /// [`VectorIndex`](crate::VectorIndex).
    #[inline]
    pub fn index<S: Into<String>>(reason: S) -> Self {
        Self::new(ErrorKind::Index, reason)
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason of this error.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

impl StdError for Error {}
