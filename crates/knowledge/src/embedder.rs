use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use ragdeck_model::{Embedder, Embedding, ProviderError};

type EmbedResult = Result<Embedding, Box<dyn ProviderError>>;
type BoxedEmbedFuture = Pin<Box<dyn Future<Output = EmbedResult> + Send>>;
type EmbedFn = Arc<dyn Fn(&str) -> BoxedEmbedFuture + Send + Sync>;

/// A type-erased [`Embedder`].
///
/// Lets the knowledge base hold any embedder without a generic parameter.
#[derive(Clone)]
pub struct EmbedderClient {
    embed_fn: EmbedFn,
}

impl EmbedderClient {
    /// Wraps `embedder`.
    pub fn new<E: Embedder + 'static>(embedder: E) -> Self {
        let embed_fn: EmbedFn = Arc::new(move |text: &str| -> BoxedEmbedFuture {
            let fut = embedder.embed(text);
            Box::pin(async move {
                fut.await
                    .map_err(|err| Box::new(err) as Box<dyn ProviderError>)
            })
        });
        Self { embed_fn }
    }

    /// Embeds `text`.
    #[inline]
    pub async fn embed(&self, text: &str) -> EmbedResult {
        (self.embed_fn)(text).await
    }
}

impl Debug for EmbedderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedderClient").finish_non_exhaustive()
    }
}
