use crate::error::ProviderError;
use crate::event::GenerationStream;
use crate::request::GenerationRequest;

/// A text generation endpoint, local or remote.
///
/// Once created, a generator should behave like a stateless object. It
/// can keep internal state (connection pools and the like), but callers
/// never rely on it and may drop the generator anytime.
pub trait Generator: Send + Sync {
    /// The error type that may be returned by the generator.
    type Error: ProviderError;

    /// The stream of events produced for one request.
    type Stream: GenerationStream<Error = Self::Error>;

    /// Sends a request to the endpoint.
    ///
    /// The returned future must not borrow `self`, so that callers can
    /// move it to another task.
    fn generate(
        &self,
        req: &GenerationRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
