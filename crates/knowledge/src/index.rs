use std::cmp::Ordering;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Error;
use crate::record::{ScoredRecord, VectorRecord};

/// A nearest-neighbor index over [`VectorRecord`]s.
///
/// The index owns the records it is given. Result ordering, scoring and
/// cutoff are defined by the implementation; callers only rely on the
/// results being ordered from closest to farthest.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stores `records`.
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<(), Error>;

    /// Returns at most `k` records closest to `vector`.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, Error>;

    /// Returns the number of stored records.
    async fn len(&self) -> usize;
}

#[derive(Default)]
struct State {
    dimensions: Option<usize>,
    records: Vec<VectorRecord>,
}

/// A flat in-memory index ranked by cosine similarity.
///
/// The first inserted record fixes the dimension of the index; records or
/// queries of any other length are rejected.
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    /// Creates an empty index.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|err| err.into_inner())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<(), Error> {
        let mut state = self.write();
        let dimensions = match state.dimensions {
            Some(dimensions) => dimensions,
            None => match records.first() {
                Some(record) => record.embedding.len(),
                None => return Ok(()),
            },
        };
        if dimensions == 0 {
            return Err(Error::index("embeddings must not be empty"));
        }
        // Validate everything first so a bad batch inserts nothing.
        if let Some(bad) =
            records.iter().find(|r| r.embedding.len() != dimensions)
        {
            return Err(Error::index(format!(
                "expected {dimensions} dimensions, got {}",
                bad.embedding.len()
            )));
        }

        state.dimensions = Some(dimensions);
        state.records.extend(records);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, Error> {
        let state = self.read();
        let Some(dimensions) = state.dimensions else {
            return Ok(vec![]);
        };
        if k == 0 {
            return Ok(vec![]);
        }
        if vector.len() != dimensions {
            return Err(Error::index(format!(
                "expected {dimensions} dimensions, got {}",
                vector.len()
            )));
        }

        let mut scored: Vec<_> = state
            .records
            .iter()
            .map(|record| (cosine_similarity(vector, &record.embedding), record))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| ScoredRecord {
                record: record.clone(),
                score,
            })
            .collect())
    }

    async fn len(&self) -> usize {
        self.read().records.len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
