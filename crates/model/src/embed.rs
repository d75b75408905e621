use crate::error::ProviderError;

/// A dense vector produced by an [`Embedder`].
pub type Embedding = Vec<f32>;

/// Turns a piece of text into a fixed-length numeric vector.
///
/// Implementations forward to an embedding service and return its vector
/// as is. All vectors produced by one embedder have the same length.
pub trait Embedder: Send + Sync {
    /// The error type that may be returned by the embedder.
    type Error: ProviderError;

    /// Embeds `text`.
    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static;
}
