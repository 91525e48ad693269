//! Configuration for assembling a memory client.
//!
//! Config structs deserialize from JSON/TOML-shaped data and can also be
//! populated from `MNEMA_*` environment variables. Validation happens at
//! construction; unknown provider names fail with
//! [`InvalidConfig`](crate::ErrorKind::InvalidConfig).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::memory::Scope;

/// Chat-completion providers the factory can resolve.
pub const LLM_PROVIDERS: &[&str] = &["openai", "qwen", "anthropic", "deepseek", "ollama"];
/// Embedding providers the factory can resolve.
pub const EMBEDDER_PROVIDERS: &[&str] = &["openai", "qwen"];
/// Vector store backends the factory can resolve.
pub const VECTOR_STORE_PROVIDERS: &[&str] = &["sqlite", "postgres", "oceanbase"];

/// Language-model provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name, one of [`LLM_PROVIDERS`].
    pub provider: String,
    /// API key; may be empty for local providers such as ollama.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier.
    #[serde(default)]
    pub model: String,
    /// Endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Provider name, one of [`EMBEDDER_PROVIDERS`].
    pub provider: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier.
    #[serde(default)]
    pub model: String,
    /// Endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Embedding dimension; must equal the collection's dimension.
    pub dimensions: usize,
}

/// Vector store backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Backend name, one of [`VECTOR_STORE_PROVIDERS`].
    pub provider: String,
    /// Collection (table) name.
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Dimension of stored embeddings.
    pub embedding_model_dims: usize,
    /// Backend-specific connection parameters, e.g. `path` for sqlite or
    /// `url` for server backends.
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_collection_name() -> String {
    "memories".to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            collection_name: default_collection_name(),
            embedding_model_dims: 0,
            config: Map::new(),
        }
    }
}

impl VectorStoreConfig {
    /// Reads a string-valued connection parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Parameters of the cognitive lifecycle model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceConfig {
    /// Enables the LLM-adjudicated write pipeline and decay-aware re-rank.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ebbinghaus decay rate λ.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Reinforcement factor φ applied on access.
    #[serde(default = "default_reinforcement_factor")]
    pub reinforcement_factor: f64,
    /// Similarity at or above which the dedup path merges.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    /// Tier threshold below which a memory is `working`.
    #[serde(default = "default_working_threshold")]
    pub working_threshold: f64,
    /// Tier threshold at which a memory becomes `short_term`.
    #[serde(default = "default_short_term_threshold")]
    pub short_term_threshold: f64,
    /// Tier threshold at which a memory becomes `long_term`.
    #[serde(default = "default_long_term_threshold")]
    pub long_term_threshold: f64,
    /// Retention strength assigned on ADD.
    #[serde(default = "default_initial_retention")]
    pub initial_retention: f64,
    /// Falls back to a plain insert when extraction yields nothing.
    #[serde(default = "default_true")]
    pub fallback_to_simple_add: bool,
}

const fn default_true() -> bool {
    true
}
const fn default_decay_rate() -> f64 {
    0.1
}
const fn default_reinforcement_factor() -> f64 {
    0.3
}
const fn default_duplicate_threshold() -> f64 {
    0.95
}
const fn default_working_threshold() -> f64 {
    0.3
}
const fn default_short_term_threshold() -> f64 {
    0.6
}
const fn default_long_term_threshold() -> f64 {
    0.8
}
const fn default_initial_retention() -> f64 {
    1.0
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_rate: default_decay_rate(),
            reinforcement_factor: default_reinforcement_factor(),
            duplicate_threshold: default_duplicate_threshold(),
            working_threshold: default_working_threshold(),
            short_term_threshold: default_short_term_threshold(),
            long_term_threshold: default_long_term_threshold(),
            initial_retention: default_initial_retention(),
            fallback_to_simple_add: true,
        }
    }
}

/// Cross-agent collaboration levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationLevel {
    /// Agents never see each other's memories.
    #[default]
    None,
    /// Agents may read shared-scope memories of their siblings.
    ReadOnly,
    /// Agents may read and mutate shared-scope memories.
    Full,
}

/// Multi-agent visibility configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMemoryConfig {
    /// Scope assigned when the caller does not specify one.
    #[serde(default)]
    pub default_scope: Scope,
    /// Allows sibling agents to surface shared-scope rows.
    #[serde(default)]
    pub allow_cross_agent_access: bool,
    /// Collaboration policy between agents of one user.
    #[serde(default)]
    pub collaboration_level: CollaborationLevel,
}

/// Top-level configuration of a memory client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Chat provider.
    pub llm: LlmConfig,
    /// Embedding provider.
    pub embedder: EmbedderConfig,
    /// Persistence backend.
    pub vector_store: VectorStoreConfig,
    /// Lifecycle model; absent disables the intelligent paths entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intelligence: Option<IntelligenceConfig>,
    /// Multi-agent visibility; absent means private-by-default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_memory: Option<AgentMemoryConfig>,
}

impl MemoryConfig {
    /// Populates a config from `MNEMA_*` environment variables.
    ///
    /// Recognized variables: `MNEMA_LLM_PROVIDER`, `MNEMA_LLM_API_KEY`,
    /// `MNEMA_LLM_MODEL`, `MNEMA_LLM_BASE_URL`, the `MNEMA_EMBEDDER_*`
    /// equivalents plus `MNEMA_EMBEDDER_DIMENSIONS`,
    /// `MNEMA_VECTOR_STORE_PROVIDER`, `MNEMA_COLLECTION_NAME`, and
    /// `MNEMA_VECTOR_STORE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let mut config = Self::default();
        if let Some(provider) = env("MNEMA_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(api_key) = env("MNEMA_LLM_API_KEY") {
            config.llm.api_key = api_key;
        }
        if let Some(model) = env("MNEMA_LLM_MODEL") {
            config.llm.model = model;
        }
        config.llm.base_url = env("MNEMA_LLM_BASE_URL");

        if let Some(provider) = env("MNEMA_EMBEDDER_PROVIDER") {
            config.embedder.provider = provider;
        }
        if let Some(api_key) = env("MNEMA_EMBEDDER_API_KEY") {
            config.embedder.api_key = api_key;
        }
        if let Some(model) = env("MNEMA_EMBEDDER_MODEL") {
            config.embedder.model = model;
        }
        config.embedder.base_url = env("MNEMA_EMBEDDER_BASE_URL");
        if let Some(dimensions) = env("MNEMA_EMBEDDER_DIMENSIONS") {
            config.embedder.dimensions = dimensions.parse().unwrap_or(0);
        }

        if let Some(provider) = env("MNEMA_VECTOR_STORE_PROVIDER") {
            config.vector_store.provider = provider;
        }
        if let Some(collection) = env("MNEMA_COLLECTION_NAME") {
            config.vector_store.collection_name = collection;
        }
        if let Some(url) = env("MNEMA_VECTOR_STORE_URL") {
            config
                .vector_store
                .config
                .insert("url".into(), Value::String(url));
        }
        config.vector_store.embedding_model_dims = config.embedder.dimensions;

        config
    }

    /// Validates provider names and dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`](crate::ErrorKind::InvalidConfig) when a
    /// provider name is empty or unknown, or when dimensions disagree.
    pub fn validate(&self) -> Result<()> {
        const OP: &str = "config";

        check_provider(OP, "llm", &self.llm.provider, LLM_PROVIDERS)?;
        check_provider(OP, "embedder", &self.embedder.provider, EMBEDDER_PROVIDERS)?;
        check_provider(
            OP,
            "vector_store",
            &self.vector_store.provider,
            VECTOR_STORE_PROVIDERS,
        )?;

        if self.embedder.dimensions == 0 {
            return Err(MemoryError::invalid_config(
                OP,
                "embedder dimensions must be non-zero",
            ));
        }
        if self.vector_store.embedding_model_dims != self.embedder.dimensions {
            return Err(MemoryError::invalid_config(
                OP,
                format!(
                    "vector store dimension {} does not match embedder dimension {}",
                    self.vector_store.embedding_model_dims, self.embedder.dimensions
                ),
            ));
        }
        Ok(())
    }
}

fn check_provider(op: &str, field: &str, provider: &str, known: &[&str]) -> Result<()> {
    if provider.is_empty() {
        return Err(MemoryError::invalid_config(
            op,
            format!("{field} provider must not be empty"),
        ));
    }
    if !known.contains(&provider) {
        return Err(MemoryError::invalid_config(
            op,
            format!("unknown {field} provider {provider:?}"),
        ));
    }
    Ok(())
}
