//! Retrieval support: a vector index paired with an embedder.
//!
//! A [`KnowledgeBase`] turns sources (URLs or local files, PDF or text)
//! into chunks, embeds every chunk and stores it in a [`VectorIndex`].
//! Searching embeds the query and asks the index for its nearest neighbors.
//! Ranking is entirely up to the index.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod base;
mod chunker;
mod embedder;
mod error;
mod index;
mod loader;
mod pdf;
mod record;

pub use base::{
    IngestionHandle, KnowledgeBase, KnowledgeBaseBuilder, SourceStatus,
};
pub use embedder::EmbedderClient;
pub use error::{Error, ErrorKind};
pub use index::{InMemoryIndex, VectorIndex};
pub use record::{ScoredRecord, VectorRecord};
