use ragdeck_model::Embedding;
use serde::{Deserialize, Serialize};

/// A chunk of a source document together with its embedding.
///
/// Records are created during ingestion and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Identifier unique within one knowledge base.
    pub id: u64,
    /// The chunk text.
    pub text: String,
    /// The embedding of `text`.
    pub embedding: Embedding,
    /// Identifier of the source the chunk was taken from.
    pub source: String,
}

/// A record returned by a similarity query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The matching record.
    pub record: VectorRecord,
    /// Similarity to the query, higher is closer.
    pub score: f32,
}
