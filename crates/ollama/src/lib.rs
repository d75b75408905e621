//! An [`Embedder`] backed by a local Ollama server.

#[macro_use]
extern crate tracing;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use ragdeck_model::{Embedder, Embedding, ErrorKind, ProviderError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// The host used when none is configured.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// The embedding model used when none is configured.
pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";

/// Error type for [`OllamaEmbedder`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

#[derive(Debug)]
struct Inner {
    host: String,
    model: String,
}

/// Embeds text with Ollama's `/api/embed` endpoint.
///
/// Each call sends one input and returns the first vector of the reply.
/// Nothing is cached, batched or normalized.
#[derive(Clone, Debug)]
pub struct OllamaEmbedder {
    client: Client,
    inner: Arc<Inner>,
}

impl OllamaEmbedder {
    /// Creates an embedder for `model` on the default host.
    #[inline]
    pub fn new<S: Into<String>>(model: S) -> Self {
        Self::with_host(DEFAULT_HOST, model)
    }

    /// Creates an embedder for `model` on `host`, e.g.
    /// `http://localhost:11434`.
    pub fn with_host<H: Into<String>, S: Into<String>>(
        host: H,
        model: S,
    ) -> Self {
        let host = host.into().trim_end_matches('/').to_owned();
        Self {
            client: Client::new(),
            inner: Arc::new(Inner {
                host,
                model: model.into(),
            }),
        }
    }

    /// Returns the embedding model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.inner.model
    }
}

impl Default for OllamaEmbedder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_MODEL)
    }
}

impl Embedder for OllamaEmbedder {
    type Error = Error;

    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static
    {
        let resp_fut = self
            .client
            .post(format!("{}/api/embed", self.inner.host))
            .json(&EmbedRequest {
                model: &self.inner.model,
                input: text,
            })
            .send();
        let text_len = text.len();

        async move {
            trace!("embedding {text_len} bytes");
            let resp = resp_fut.await.map_err(|err| {
                let kind = if err.is_connect() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Other
                };
                Error::new(err.to_string(), kind)
            })?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let kind = match status {
                    StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
                    _ => ErrorKind::Other,
                };
                return Err(Error::new(
                    format!("embedding failed with status {status}: {}", body.trim()),
                    kind,
                ));
            }

            let body: EmbedResponse = resp.json().await.map_err(|err| {
                Error::new(err.to_string(), ErrorKind::InvalidResponse)
            })?;
            body.embeddings.into_iter().next().ok_or_else(|| {
                Error::new("no embedding returned", ErrorKind::InvalidResponse)
            })
        }
    }
}
