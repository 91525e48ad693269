//! # mnema
//!
//! **Long-term memory for conversational agents** — ingest utterances,
//! distill them into semantically searchable memories, and maintain them
//! under a cognitive lifecycle model (deduplication, decay, reinforcement,
//! promotion, forgetting).
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Your Agent    │───▶│      mnema       │◀───│   Providers     │
//! │                 │    │                  │    │                 │
//! │ - Chat bots     │    │ - MemoryClient   │    │ - openai/qwen   │
//! │ - Assistants    │    │ - write pipeline │    │ - anthropic     │
//! │ - Multi-agent   │    │ - Ebbinghaus     │    │ - sqlite        │
//! │   systems       │    │ - streaming      │    │ - postgres      │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use mnema::{AddOptions, MemoryConfig, SearchOptions, connect};
//!
//! let mut config = MemoryConfig::from_env();
//! config.vector_store.provider = "sqlite".into();
//!
//! let memory = connect(config).await?;
//! memory
//!     .add("I switched from coffee to oolong tea", &AddOptions::new("u1"))
//!     .await?;
//!
//! let hits = memory
//!     .search("what does the user drink?", &SearchOptions::new("u1"))
//!     .await?;
//! for hit in hits {
//!     println!("{:.2} {}", hit.score.unwrap_or(0.0), hit.content);
//! }
//! ```
//!
//! ## Feature flags
//!
//! - `openai` (default): OpenAI-compatible chat + embeddings (OpenAI,
//!   Qwen/DashScope, DeepSeek, Ollama endpoints)
//! - `anthropic` (default): Anthropic Messages chat provider
//! - `sqlite` (default): embedded SQLite vector store
//! - `postgres`: Postgres/pgvector vector store
//! - `oceanbase`: OceanBase (MySQL protocol) vector store
//! - `full`: everything
//!
//! Beware: [`MemoryClient::delete_all`] with an unfiltered
//! [`AccessOptions`] wipes the whole collection — that is its documented
//! contract, not an error.

use std::sync::Arc;

#[doc(inline)]
pub use mnema_core::{
    Embedding, EmbeddingModel, ErrorKind, GenerateOptions, LanguageModel, Memory, MemoryError,
    MemoryTier, Message, Prompt, Result, Role, Scope, SparseVector, VectorStore,
    config::{
        AgentMemoryConfig, CollaborationLevel, EmbedderConfig, IntelligenceConfig, LlmConfig,
        MemoryConfig, VectorStoreConfig,
    },
};
#[doc(inline)]
pub use mnema_memory::{
    AccessOptions, AddOptions, AddResult, AppliedAction, BatchFailure, BatchResult, BatchSuccess,
    CancellationToken, EbbinghausEngine, LifecycleVerdict, ListOptions, MaintenanceReport,
    MemoryBatch, MemoryClient, MemoryClientBuilder, MemoryEvent, SearchOptions, UpdateItem,
};

#[cfg(feature = "anthropic")]
#[cfg_attr(docsrs, doc(cfg(feature = "anthropic")))]
pub use mnema_anthropic::Anthropic;
#[cfg(feature = "openai")]
#[cfg_attr(docsrs, doc(cfg(feature = "openai")))]
pub use mnema_openai::OpenAI;
#[cfg(feature = "oceanbase")]
#[cfg_attr(docsrs, doc(cfg(feature = "oceanbase")))]
pub use mnema_store::OceanBaseStore;
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub use mnema_store::PostgresStore;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub use mnema_store::SqliteStore;

/// Assembles a [`MemoryClient`] from configuration.
///
/// Provider names are resolved against the crates compiled into this
/// build; a provider behind a disabled feature fails with
/// [`InvalidConfig`](ErrorKind::InvalidConfig), exactly like an unknown
/// name.
///
/// # Errors
///
/// Returns [`InvalidConfig`](ErrorKind::InvalidConfig) for invalid or
/// unsupported configuration and [`ConnectionFailed`](ErrorKind::ConnectionFailed)
/// when the storage backend is unreachable.
pub async fn connect(config: MemoryConfig) -> Result<MemoryClient> {
    config.validate()?;

    let llm = build_llm(&config.llm)?;
    let embedder = build_embedder(&config.embedder)?;
    let store = build_store(&config.vector_store).await?;

    let mut builder = MemoryClient::builder(store, embedder).with_llm(llm);
    if let Some(intelligence) = config.intelligence {
        builder = builder.with_intelligence(intelligence);
    }
    if let Some(agent_memory) = config.agent_memory {
        builder = builder.with_agent_memory(agent_memory);
    }
    Ok(builder.build())
}

fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    const OP: &str = "connect";

    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        provider @ ("openai" | "qwen" | "deepseek" | "ollama") => {
            let mut client = match provider {
                "qwen" => OpenAI::qwen(config.api_key.clone()),
                "deepseek" => OpenAI::deepseek(config.api_key.clone()),
                "ollama" => OpenAI::ollama(),
                _ => OpenAI::new(config.api_key.clone()),
            };
            if !config.model.is_empty() {
                client = client.with_model(config.model.clone());
            }
            if let Some(base_url) = &config.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Ok(Arc::new(client))
        }
        #[cfg(feature = "anthropic")]
        "anthropic" => {
            let mut client = Anthropic::new(config.api_key.clone());
            if !config.model.is_empty() {
                client = client.with_model(config.model.clone());
            }
            if let Some(base_url) = &config.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Ok(Arc::new(client))
        }
        other => Err(MemoryError::invalid_config(
            OP,
            format!("llm provider {other:?} is not enabled in this build"),
        )),
    }
}

fn build_embedder(config: &EmbedderConfig) -> Result<Arc<dyn EmbeddingModel>> {
    const OP: &str = "connect";

    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        provider @ ("openai" | "qwen") => {
            let mut client = if provider == "qwen" {
                OpenAI::qwen(config.api_key.clone())
            } else {
                OpenAI::new(config.api_key.clone())
            };
            if !config.model.is_empty() {
                client = client.with_embedding_model(config.model.clone());
            }
            if let Some(base_url) = &config.base_url {
                client = client.with_base_url(base_url.clone());
            }
            client = client.with_embedding_dimensions(config.dimensions);
            Ok(Arc::new(client))
        }
        other => Err(MemoryError::invalid_config(
            OP,
            format!("embedder provider {other:?} is not enabled in this build"),
        )),
    }
}

async fn build_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    const OP: &str = "connect";

    match config.provider.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.param("path").unwrap_or("mnema.db").to_string();
            let store = SqliteStore::connect(
                &path,
                &config.collection_name,
                config.embedding_model_dims,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = config.param("url").ok_or_else(|| {
                MemoryError::invalid_config(OP, "postgres store requires a `url` parameter")
            })?;
            let store = PostgresStore::connect(
                url,
                &config.collection_name,
                config.embedding_model_dims,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "oceanbase")]
        "oceanbase" => {
            let url = config.param("url").ok_or_else(|| {
                MemoryError::invalid_config(OP, "oceanbase store requires a `url` parameter")
            })?;
            let store = OceanBaseStore::connect(
                url,
                &config.collection_name,
                config.embedding_model_dims,
            )
            .await?;
            Ok(Arc::new(store))
        }
        other => Err(MemoryError::invalid_config(
            OP,
            format!("vector store provider {other:?} is not enabled in this build"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MemoryConfig {
        let mut config = MemoryConfig::default();
        config.llm.provider = "openai".into();
        config.llm.api_key = "sk-test".into();
        config.embedder.provider = "openai".into();
        config.embedder.api_key = "sk-test".into();
        config.embedder.dimensions = 8;
        config.vector_store.provider = "sqlite".into();
        config.vector_store.embedding_model_dims = 8;
        config
            .vector_store
            .config
            .insert("path".into(), serde_json::json!("sqlite::memory:"));
        config.intelligence = Some(IntelligenceConfig::default());
        config
    }

    #[tokio::test]
    async fn connect_assembles_a_client() {
        let client = connect(config()).await.unwrap();
        assert!(client.engine().is_some());
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let mut bad = config();
        bad.llm.provider = "gpt4all".into();
        let err = connect(bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn qwen_llm_resolves_through_the_openai_client() {
        let mut qwen = config();
        qwen.llm.provider = "qwen".into();
        qwen.embedder.provider = "qwen".into();
        assert!(connect(qwen).await.is_ok());
    }
}
