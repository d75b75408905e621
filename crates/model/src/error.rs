use std::error::Error;

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The provider is rate limited.
    RateLimitExceeded,
    /// The provider could not be reached.
    Unavailable,
    /// The provider answered with something we cannot understand.
    InvalidResponse,
    /// Any other errors.
    Other,
}

/// The error type shared by every remote capability (generation,
/// embedding).
pub trait ProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}
