//! Similarity-threshold deduplication.
//!
//! The merge path taken on inferred adds when LLM adjudication is not
//! configured: near-duplicates above the threshold are folded into the
//! existing memory instead of inserting a new row.

use std::sync::{Arc, Weak};

use mnema_core::store::SearchRequest;
use mnema_core::{Embedding, Memory, MemoryError, Result, VectorStore};
use tracing::debug;

const CANDIDATE_LIMIT: usize = 5;

/// Merges near-duplicate memories in place of inserting new ones.
#[derive(Clone)]
pub struct DedupEngine {
    store: Weak<dyn VectorStore>,
    threshold: f64,
}

impl core::fmt::Debug for DedupEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DedupEngine")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl DedupEngine {
    /// Creates an engine holding a weak reference to the store; the
    /// coordinator keeps ownership.
    #[must_use]
    pub fn new(store: &Arc<dyn VectorStore>, threshold: f64) -> Self {
        Self {
            store: Arc::downgrade(store),
            threshold,
        }
    }

    /// Attempts to fold `content` into an existing near-duplicate.
    ///
    /// Searches the top candidates under the same tenancy; the first one
    /// scoring at or above the threshold absorbs the new content and
    /// embedding. Returns the merged memory, or `None` when nothing clears
    /// the threshold and the caller should insert normally.
    pub async fn try_merge(
        &self,
        user_id: &str,
        agent_id: Option<&str>,
        content: &str,
        embedding: &Embedding,
    ) -> Result<Option<Memory>> {
        const OP: &str = "dedup_merge";

        let store = self
            .store
            .upgrade()
            .ok_or_else(|| MemoryError::storage(OP, "vector store is closed"))?;

        let mut request =
            SearchRequest::new(embedding.clone(), CANDIDATE_LIMIT).with_user_id(user_id);
        if let Some(agent_id) = agent_id {
            request = request.with_agent_id(agent_id);
        }
        let candidates = store.search(&request).await?;

        let Some(existing) = candidates
            .into_iter()
            .find(|candidate| candidate.score.unwrap_or(0.0) >= self.threshold)
        else {
            return Ok(None);
        };

        debug!(
            id = existing.id,
            score = existing.score.unwrap_or(0.0),
            "merging near-duplicate memory"
        );

        let merged_content = merge_content(&existing.content, content);
        let merged_embedding = merge_embeddings(&existing.embedding, embedding);
        let merged = store
            .update(
                existing.id,
                &merged_content,
                &merged_embedding,
                &request.access(),
            )
            .await?;
        Ok(Some(merged))
    }
}

/// Concatenates with a single space; already-absorbed content is left
/// untouched so repeated merges are a fixed point.
fn merge_content(existing: &str, incoming: &str) -> String {
    if existing.ends_with(incoming) {
        existing.to_string()
    } else {
        format!("{existing} {incoming}")
    }
}

/// L2-normalised arithmetic mean; on dimension mismatch the existing
/// embedding wins.
fn merge_embeddings(existing: &[f32], incoming: &[f32]) -> Embedding {
    if existing.len() != incoming.len() {
        return existing.to_vec();
    }

    let mut mean: Embedding = existing
        .iter()
        .zip(incoming.iter())
        .map(|(a, b)| (a + b) / 2.0)
        .collect();

    let norm = mean.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
    if norm > 0.0 {
        #[allow(clippy::cast_possible_truncation)]
        for value in &mut mean {
            *value = (f64::from(*value) / norm) as f32;
        }
    }
    mean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_embedding_is_unit_length() {
        let merged = merge_embeddings(&[1.0, 0.0], &[0.0, 1.0]);
        let norm: f64 = merged.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identical_normalised_embeddings_are_a_fixed_point() {
        let unit = vec![0.6f32, 0.8];
        let merged = merge_embeddings(&unit, &unit);
        for (a, b) in merged.iter().zip(unit.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn dimension_mismatch_keeps_existing() {
        let existing = vec![1.0f32, 2.0, 3.0];
        assert_eq!(merge_embeddings(&existing, &[1.0]), existing);
    }

    #[test]
    fn content_concatenates_with_a_space() {
        assert_eq!(
            merge_content("User likes Python programming", "User enjoys Python coding"),
            "User likes Python programming User enjoys Python coding"
        );
    }

    #[test]
    fn absorbed_content_is_a_fixed_point() {
        let merged = merge_content("likes tea likes oolong", "likes oolong");
        assert_eq!(merged, "likes tea likes oolong");
    }
}
