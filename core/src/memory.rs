//! The central memory entity and its visibility model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::embedding::Embedding;

/// Metadata keys the engine itself reads and writes.
///
/// Anything outside this list is user-supplied and only participates in
/// filter equality.
pub mod keys {
    /// Visibility of the memory across agents of the same user.
    pub const SCOPE: &str = "scope";
    /// Session/run identifier supplied by the caller.
    pub const RUN_ID: &str = "run_id";
    /// Free-form classification supplied by the caller.
    pub const MEMORY_TYPE: &str = "memory_type";
    /// Prompt that produced the memory, when recorded.
    pub const PROMPT: &str = "prompt";
    /// Mirrored copy of the retention strength for backends that filter on it.
    pub const RETENTION_STRENGTH: &str = "retention_strength";
    /// Caller-assigned importance in `[0,1]`.
    pub const IMPORTANCE_SCORE: &str = "importance_score";
    /// Ascending review timestamps emitted by the retention model.
    pub const REVIEW_SCHEDULE: &str = "review_schedule";
    /// Marker object written by the intelligent pipeline.
    pub const INTELLIGENCE: &str = "intelligence";
    /// Number of explicit accesses recorded for the memory.
    pub const ACCESS_COUNT: &str = "access_count";
    /// Set by maintenance when a memory is archived.
    pub const ARCHIVED: &str = "archived";
}

/// Visibility of a memory across agents of the same user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible only to the agent that wrote it.
    #[default]
    Private,
    /// Visible to every agent of the owning user.
    AgentGroup,
    /// Visible across the whole user, regardless of agent.
    Global,
}

impl Scope {
    /// String form stored inside metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::AgentGroup => "agent_group",
            Self::Global => "global",
        }
    }

    /// Parses the metadata string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "agent_group" => Some(Self::AgentGroup),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

/// Retention tier derived from current retention strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Below the short-term threshold; decays fastest.
    Working,
    /// Between the short- and long-term thresholds.
    ShortTerm,
    /// At or above the long-term threshold; decays slowest.
    LongTerm,
}

impl MemoryTier {
    /// String form used in metadata and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
        }
    }
}

/// Reserved sparse representation; the core never computes one today.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Indices of the non-zero dimensions.
    pub indices: Vec<u32>,
    /// Values at those dimensions.
    pub values: Vec<f32>,
}

/// A retrievable atomic piece of information about a user.
///
/// Memories are value-like; only ids are used to refer to them across
/// layers. The transient `score` is populated by search and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Globally unique 63-bit time-ordered identifier.
    pub id: i64,
    /// Required tenant key.
    pub user_id: String,
    /// Optional agent key.
    pub agent_id: Option<String>,
    /// Text payload.
    pub content: String,
    /// Dense vector of the collection's fixed dimension.
    pub embedding: Embedding,
    /// Reserved sparse representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_embedding: Option<SparseVector>,
    /// Heterogeneous JSON metadata; recognized keys live in [`keys`].
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// How well the memory is currently remembered, in `[0,1]`.
    pub retention_strength: f64,
    /// Last explicit access, if any.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_accessed_at: Option<OffsetDateTime>,
    /// Transient similarity score from the latest search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Memory {
    /// Creates a memory owned by `user_id` with a fresh retention strength.
    pub fn new(id: i64, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            user_id: user_id.into(),
            agent_id: None,
            content: content.into(),
            embedding: Embedding::new(),
            sparse_embedding: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            retention_strength: 1.0,
            last_accessed_at: None,
            score: None,
        }
    }

    /// Sets the agent key.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the dense embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = embedding;
        self
    }

    /// Replaces the metadata map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the visibility scope inside metadata.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.metadata
            .insert(keys::SCOPE.into(), Value::String(scope.as_str().into()));
        self
    }

    /// Reads the scope back from metadata, defaulting to private.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.metadata
            .get(keys::SCOPE)
            .and_then(Value::as_str)
            .and_then(Scope::parse)
            .unwrap_or_default()
    }

    /// Number of explicit accesses recorded in metadata.
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.metadata
            .get(keys::ACCESS_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Caller-assigned importance, defaulting to 0.
    #[must_use]
    pub fn importance_score(&self) -> f64 {
        self.metadata
            .get(keys::IMPORTANCE_SCORE)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// True when every `filters` entry matches this memory's metadata by
    /// scalar equality. Unknown keys never match.
    #[must_use]
    pub fn matches_filters(&self, filters: &Map<String, Value>) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.metadata.get(key) == Some(value))
    }
}
