//! Per-operation options.
//!
//! Every public coordinator operation takes an options struct carrying
//! tenancy, operation-specific knobs, and a cancellation context. Options
//! are builder-style and cheap to clone.

use mnema_core::{AccessFilter, Scope};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Options for [`add`](crate::MemoryClient::add) and the intelligent write
/// pipeline.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Tenant key; required and non-empty.
    pub user_id: String,
    /// Agent key.
    pub agent_id: Option<String>,
    /// Session/run identifier recorded in metadata.
    pub run_id: Option<String>,
    /// Visibility scope; falls back to the configured default.
    pub scope: Option<Scope>,
    /// Free-form classification recorded in metadata.
    pub memory_type: Option<String>,
    /// Importance in `[0,1]` recorded in metadata.
    pub importance: Option<f64>,
    /// Additional caller metadata merged into the stored map.
    pub metadata: Map<String, Value>,
    /// Metadata equality filters applied during candidate retrieval.
    pub filters: Map<String, Value>,
    /// Routes the add through deduplication or the intelligent pipeline.
    pub infer: bool,
    /// Cancellation context.
    pub cancellation: CancellationToken,
}

impl AddOptions {
    /// Options for a tenant with inference enabled.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            infer: true,
            ..Self::default()
        }
    }

    /// Sets the agent key.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the visibility scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Sets the memory type.
    #[must_use]
    pub fn with_memory_type(mut self, memory_type: impl Into<String>) -> Self {
        self.memory_type = Some(memory_type.into());
        self
    }

    /// Sets the importance score.
    #[must_use]
    pub const fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Merges caller metadata into the stored map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Disables inference; the content is embedded and inserted as-is.
    #[must_use]
    pub const fn without_infer(mut self) -> Self {
        self.infer = false;
        self
    }

    /// Attaches a cancellation context.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub(crate) fn access(&self) -> AccessFilter {
        AccessFilter {
            user_id: Some(self.user_id.clone()),
            agent_id: self.agent_id.clone(),
        }
    }

    /// Stored metadata derived from these options: caller metadata merged
    /// with the recognized tenancy/classification keys.
    pub(crate) fn base_metadata(&self, default_scope: Scope) -> Map<String, Value> {
        use mnema_core::memory::keys;

        let mut metadata = self.metadata.clone();
        let scope = self.scope.unwrap_or(default_scope);
        metadata.insert(keys::SCOPE.into(), Value::String(scope.as_str().into()));
        if let Some(run_id) = &self.run_id {
            metadata.insert(keys::RUN_ID.into(), Value::String(run_id.clone()));
        }
        if let Some(memory_type) = &self.memory_type {
            metadata.insert(keys::MEMORY_TYPE.into(), Value::String(memory_type.clone()));
        }
        if let Some(importance) = self.importance {
            if let Some(number) = serde_json::Number::from_f64(importance) {
                metadata.insert(keys::IMPORTANCE_SCORE.into(), Value::Number(number));
            }
        }
        metadata
    }
}

/// Options for [`search`](crate::MemoryClient::search).
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Tenant key.
    pub user_id: Option<String>,
    /// Agent key.
    pub agent_id: Option<String>,
    /// Maximum number of results.
    pub limit: usize,
    /// Score floor. Applied to the similarity score by the store, and
    /// re-applied to the decay-weighted final score when re-ranking is
    /// active, so returned scores never fall below it.
    pub min_score: f64,
    /// Metadata equality filters.
    pub filters: Map<String, Value>,
    /// Decay-aware re-ranking; `None` re-ranks whenever the retention
    /// model is configured.
    pub rerank: Option<bool>,
    /// Cancellation context.
    pub cancellation: CancellationToken,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            agent_id: None,
            limit: 10,
            min_score: 0.0,
            filters: Map::new(),
            rerank: None,
            cancellation: CancellationToken::new(),
        }
    }
}

impl SearchOptions {
    /// Options scoped to one tenant.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Sets the agent key.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the score floor.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets metadata equality filters.
    #[must_use]
    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.filters = filters;
        self
    }

    /// Forces re-ranking on or off.
    #[must_use]
    pub const fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = Some(rerank);
        self
    }

    /// Attaches a cancellation context.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Options for point reads, updates, and deletes.
#[derive(Debug, Clone, Default)]
pub struct AccessOptions {
    /// Tenant key.
    pub user_id: Option<String>,
    /// Agent key.
    pub agent_id: Option<String>,
    /// Cancellation context.
    pub cancellation: CancellationToken,
}

impl AccessOptions {
    /// Options scoped to one tenant.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Options that match any row (explicitly global).
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Sets the agent key.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Attaches a cancellation context.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub(crate) fn access(&self) -> AccessFilter {
        AccessFilter {
            user_id: self.user_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

/// Options for paged listings and the get-all stream.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Tenant key.
    pub user_id: Option<String>,
    /// Agent key.
    pub agent_id: Option<String>,
    /// Maximum number of rows returned overall.
    pub limit: usize,
    /// Rows skipped before the page starts.
    pub offset: usize,
    /// Cancellation context.
    pub cancellation: CancellationToken,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            user_id: None,
            agent_id: None,
            limit: 100,
            offset: 0,
            cancellation: CancellationToken::new(),
        }
    }
}

impl ListOptions {
    /// Options scoped to one tenant.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Sets the agent key.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the overall row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skips `offset` rows.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Attaches a cancellation context.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub(crate) fn access(&self) -> AccessFilter {
        AccessFilter {
            user_id: self.user_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_options_default_to_infer() {
        let options = AddOptions::new("u1");
        assert!(options.infer);
        assert_eq!(options.user_id, "u1");
        assert!(!AddOptions::new("u1").without_infer().infer);
    }

    #[test]
    fn access_filters_carry_tenancy() {
        let options = AccessOptions::new("u1").with_agent_id("a1");
        let access = options.access();
        assert_eq!(access.user_id.as_deref(), Some("u1"));
        assert_eq!(access.agent_id.as_deref(), Some("a1"));
    }

    #[test]
    fn search_defaults() {
        let options = SearchOptions::new("u1");
        assert_eq!(options.limit, 10);
        assert!((options.min_score - 0.0).abs() < f64::EPSILON);
        assert!(options.rerank.is_none());
    }
}
