use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ragdeck_model::Embedder;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;

use crate::chunker::Chunker;
use crate::embedder::EmbedderClient;
use crate::error::{Error, ErrorKind};
use crate::index::{InMemoryIndex, VectorIndex};
use crate::loader::Loader;
use crate::record::{ScoredRecord, VectorRecord};

const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Ingestion status of a source.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum SourceStatus {
    /// Ingestion has been requested but has not completed. Sources whose
    /// ingestion failed stay in this state.
    #[default]
    Pending,
    /// All chunks of the source are searchable.
    Ingested,
}

/// [`KnowledgeBase`] builder.
pub struct KnowledgeBaseBuilder {
    name: String,
    description: String,
    embedder: EmbedderClient,
    index: Option<Arc<dyn VectorIndex>>,
    chunk_size: usize,
}

impl KnowledgeBaseBuilder {
    /// Sets the name reported to the model.
    #[inline]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the description reported to the model.
    #[inline]
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Uses `index` instead of a fresh [`InMemoryIndex`].
    #[inline]
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the maximum chunk size in characters.
    #[inline]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Builds the knowledge base.
    pub fn build(self) -> KnowledgeBase {
        KnowledgeBase {
            inner: Arc::new(Inner {
                name: self.name,
                description: self.description,
                embedder: self.embedder,
                index: self
                    .index
                    .unwrap_or_else(|| Arc::new(InMemoryIndex::new())),
                loader: Loader::default(),
                chunker: Chunker::new(self.chunk_size),
                next_record_id: AtomicU64::new(1),
            }),
        }
    }
}

struct Inner {
    name: String,
    description: String,
    embedder: EmbedderClient,
    index: Arc<dyn VectorIndex>,
    loader: Loader,
    chunker: Chunker,
    next_record_id: AtomicU64,
}

/// An embedder paired with a vector index.
///
/// Cloning is cheap, clones share the same index.
#[derive(Clone)]
pub struct KnowledgeBase {
    inner: Arc<Inner>,
}

impl KnowledgeBase {
    /// Creates a builder with the specified embedder.
    pub fn builder<E: Embedder + 'static>(embedder: E) -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder {
            name: "knowledge".to_owned(),
            description: String::new(),
            embedder: EmbedderClient::new(embedder),
            index: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Returns the name of this knowledge base.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the description of this knowledge base.
    #[inline]
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Returns the number of stored records.
    #[inline]
    pub async fn len(&self) -> usize {
        self.inner.index.len().await
    }

    /// Loads, chunks, embeds and stores one source, returning the number
    /// of records stored.
    ///
    /// Adding the same source twice stores its chunks twice.
    pub async fn ingest(&self, identifier: &str) -> Result<usize, Error> {
        let text = self.inner.loader.load(identifier).await?;
        let chunks = self.inner.chunker.chunks(&text);
        debug!("{} chunks from {identifier}", chunks.len());

        let mut records = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding =
                self.inner.embedder.embed(&chunk).await.map_err(|err| {
                    Error::new(ErrorKind::Embedding, err.to_string())
                })?;
            records.push(VectorRecord {
                id: self.inner.next_record_id.fetch_add(1, Ordering::Relaxed),
                text: chunk,
                embedding,
                source: identifier.trim().to_owned(),
            });
        }

        let count = records.len();
        self.inner.index.insert(records).await?;
        Ok(count)
    }

    /// Starts ingesting a source in the background and returns immediately.
    ///
    /// The caller is not told whether ingestion succeeds; failures are only
    /// logged. Queries issued before ingestion completes simply do not see
    /// the new records. Must be called within a tokio runtime.
    pub fn add_content<S: Into<String>>(
        &self,
        identifier: S,
    ) -> IngestionHandle {
        let identifier = identifier.into();
        let (status_tx, status_rx) = watch::channel(SourceStatus::Pending);
        let this = self.clone();
        let span = debug_span!("ingest", source = %identifier);
        tokio::spawn(
            async move {
                match this.ingest(&identifier).await {
                    Ok(count) => {
                        info!("ingested {count} records");
                        status_tx.send_replace(SourceStatus::Ingested);
                    }
                    Err(err) => warn!("ingestion failed: {err}"),
                }
            }
            .instrument(span),
        );
        IngestionHandle { status: status_rx }
    }

    /// Returns at most `k` passages closest to `query`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, Error> {
        let vector = self
            .inner
            .embedder
            .embed(query)
            .await
            .map_err(|err| Error::new(ErrorKind::Embedding, err.to_string()))?;
        self.inner.index.query(&vector, k).await
    }
}

impl Debug for KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// Observes a background ingestion started by
/// [`KnowledgeBase::add_content`]. Dropping it does not cancel anything.
#[derive(Clone, Debug)]
pub struct IngestionHandle {
    status: watch::Receiver<SourceStatus>,
}

impl IngestionHandle {
    /// Returns the current status.
    #[inline]
    pub fn status(&self) -> SourceStatus {
        *self.status.borrow()
    }

    /// Waits until the ingestion task ends and returns the final status.
    pub async fn finished(&mut self) -> SourceStatus {
        while self.status() == SourceStatus::Pending {
            if self.status.changed().await.is_err() {
                break;
            }
        }
        self.status()
    }
}
