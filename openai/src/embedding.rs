//! Embeddings over `/embeddings`.

use async_trait::async_trait;
use mnema_core::embedding::check_batch_alignment;
use mnema_core::{Embedding, EmbeddingModel, Result};
use tracing::debug;

use crate::client::OpenAI;
use crate::constant::USER_AGENT;
use crate::error::OpenAIError;
use crate::request::EmbeddingRequest;
use crate::response::{EmbeddingResponse, error_message};

#[async_trait]
impl EmbeddingModel for OpenAI {
    fn dim(&self) -> usize {
        self.config().embedding_dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        const OP: &str = "openai.embed";

        let config = self.config();
        let body = EmbeddingRequest {
            model: &config.embedding_model,
            input: texts,
        };
        debug!(model = %config.embedding_model, inputs = texts.len(), "embedding request");

        let mut builder = config
            .http
            .post(config.request_url("/embeddings"))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&body);
        if !config.api_key.is_empty() {
            builder = builder.header(reqwest::header::AUTHORIZATION, config.request_auth());
        }
        if let Some(organization) = &config.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| OpenAIError::from(err).into_embedding_error(OP))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAIError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into_embedding_error(OP));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| OpenAIError::from(err).into_embedding_error(OP))?;

        check_batch_alignment(OP, texts.len(), parsed.data.len())?;

        // The API may return items out of order; realign by index.
        let mut vectors: Vec<Embedding> = vec![Embedding::new(); texts.len()];
        for item in parsed.data {
            if item.index >= vectors.len() {
                return Err(OpenAIError::MissingData(format!(
                    "embedding index {} out of range for {} inputs",
                    item.index,
                    texts.len()
                ))
                .into_embedding_error(OP));
            }
            vectors[item.index] = item.embedding;
        }

        let expected = config.embedding_dimensions;
        for vector in &vectors {
            if vector.len() != expected {
                return Err(OpenAIError::MissingData(format!(
                    "embedding of size {} does not match configured dimension {expected}",
                    vector.len()
                ))
                .into_embedding_error(OP));
            }
        }

        Ok(vectors)
    }
}
