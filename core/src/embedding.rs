//! Text embeddings.

use async_trait::async_trait;

use crate::error::{MemoryError, Result};

/// A type alias for an embedding vector of 32-bit floats.
pub type Embedding = Vec<f32>;

/// Converts text to vector representations.
///
/// The dimension is fixed for the lifetime of a client and must equal the
/// collection's configured dimension. Determinism is not required.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Returns the embedding vector dimension.
    fn dim(&self) -> usize;

    /// Converts text to an embedding vector of length [`dim`](Self::dim).
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Converts a batch of texts, index-aligned with the input.
    ///
    /// The default implementation embeds sequentially; providers with a
    /// native batch endpoint should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Releases any resources held by the client.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Validates that a batch response is index-aligned with its input.
///
/// Shared by provider implementations; a mismatched count is an
/// [`EmbeddingFailed`](crate::ErrorKind::EmbeddingFailed) error.
pub fn check_batch_alignment(op: &str, inputs: usize, outputs: usize) -> Result<()> {
    if inputs == outputs {
        Ok(())
    } else {
        Err(MemoryError::embedding_failed(
            op,
            format!("batch returned {outputs} vectors for {inputs} inputs"),
        ))
    }
}
