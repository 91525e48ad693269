//! The vector store contract and its tenancy model.
//!
//! Backends persist memories, retrieve them by similarity, and enforce
//! tenancy. Access control is enforced as non-existence: a row whose
//! `user_id`/`agent_id` does not match the filter behaves exactly like a
//! missing row.

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::embedding::Embedding;
use crate::error::Result;
use crate::memory::{Memory, Scope, SparseVector};

/// Tenancy filter attached to point operations.
///
/// An empty filter matches any row; deletions without `user_id` act
/// globally only when the caller explicitly asks for that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFilter {
    /// Tenant key; rows of other users are invisible when set.
    pub user_id: Option<String>,
    /// Agent key; further restricts within the tenant when set.
    pub agent_id: Option<String>,
}

impl AccessFilter {
    /// A filter that matches any row.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to one tenant.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            agent_id: None,
        }
    }

    /// Further restricts to one agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// True when a row with this tenancy is visible through the filter.
    ///
    /// Scope widens agent restriction: with both keys set, rows of other
    /// agents remain visible when their scope is `agent_group` or `global`.
    #[must_use]
    pub fn permits(&self, user_id: &str, agent_id: Option<&str>, scope: Scope) -> bool {
        if let Some(want) = &self.user_id {
            if want != user_id {
                return false;
            }
        }
        if let Some(want) = &self.agent_id {
            let same_agent = agent_id == Some(want.as_str());
            if !same_agent && !matches!(scope, Scope::AgentGroup | Scope::Global) {
                return false;
            }
        }
        true
    }
}

/// Similarity search request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Query vector; must match the collection dimension.
    pub embedding: Embedding,
    /// Tenant key.
    pub user_id: Option<String>,
    /// Agent key.
    pub agent_id: Option<String>,
    /// Maximum number of rows returned.
    pub limit: usize,
    /// Rows scoring below this are dropped.
    pub min_score: f64,
    /// Metadata equality filters; unknown keys never match.
    pub filters: Map<String, Value>,
    /// Original query text, reserved for hybrid search.
    pub query: Option<String>,
    /// Sparse query vector, reserved for hybrid search.
    pub sparse: Option<SparseVector>,
}

impl SearchRequest {
    /// Creates a request for `limit` nearest rows.
    #[must_use]
    pub fn new(embedding: Embedding, limit: usize) -> Self {
        Self {
            embedding,
            limit,
            ..Self::default()
        }
    }

    /// Restricts to one tenant.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restricts to one agent (subject to scope widening).
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Drops rows scoring below `min_score`.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Adds metadata equality filters.
    #[must_use]
    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.filters = filters;
        self
    }

    /// Tenancy view of this request.
    #[must_use]
    pub fn access(&self) -> AccessFilter {
        AccessFilter {
            user_id: self.user_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

/// Paged listing request, newest-first.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Tenant key.
    pub user_id: Option<String>,
    /// Agent key.
    pub agent_id: Option<String>,
    /// Maximum number of rows returned.
    pub limit: usize,
    /// Number of rows skipped before the page starts.
    pub offset: usize,
}

impl ListRequest {
    /// Creates a request for the first `limit` rows.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Restricts to one tenant.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restricts to one agent (subject to scope widening).
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Skips `offset` rows.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Tenancy view of this request.
    #[must_use]
    pub fn access(&self) -> AccessFilter {
        AccessFilter {
            user_id: self.user_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

/// Lifecycle state persisted by [`VectorStore::update_state`].
///
/// Carries everything the retention model mutates outside of content and
/// embedding: strength, last access, and the metadata map.
#[derive(Debug, Clone)]
pub struct MemoryState {
    /// New retention strength in `[0,1]`.
    pub retention_strength: f64,
    /// New last-access timestamp, when the change records an access.
    pub last_accessed_at: Option<OffsetDateTime>,
    /// Full replacement metadata map.
    pub metadata: Map<String, Value>,
}

/// Best-effort vector index specification.
#[derive(Debug, Clone, Default)]
pub struct IndexSpec {
    /// Index name; backends may derive one when empty.
    pub name: Option<String>,
    /// Backend-specific parameters (e.g. list count for IVFFlat).
    pub parameters: Map<String, Value>,
}

/// Persistence contract consumed by the coordinator.
///
/// Implementations must be internally safe for concurrent use. Returned
/// search results are ordered by score descending with ties broken by id
/// descending; listings are newest-first by `created_at` with the same
/// tie-break.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists a new memory. Duplicate ids are a storage conflict.
    async fn insert(&self, memory: &Memory) -> Result<()>;

    /// Returns rows similar to the request vector, ordered by score
    /// descending, all satisfying every filter and `score >= min_score`.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Memory>>;

    /// Returns a single memory, or `NotFound` when absent or masked.
    async fn get(&self, id: i64, access: &AccessFilter) -> Result<Memory>;

    /// Mutates content, embedding, and `updated_at`; access-controlled like
    /// [`get`](Self::get). Returns the updated row.
    async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: &Embedding,
        access: &AccessFilter,
    ) -> Result<Memory>;

    /// Persists lifecycle state (retention strength, last access,
    /// metadata), leaving content and embedding untouched; access-controlled
    /// like [`get`](Self::get).
    async fn update_state(&self, id: i64, state: &MemoryState, access: &AccessFilter)
    -> Result<()>;

    /// Removes a row; a non-matching row yields `NotFound`.
    async fn delete(&self, id: i64, access: &AccessFilter) -> Result<()>;

    /// Newest-first page of rows matching the filter.
    async fn get_all(&self, request: &ListRequest) -> Result<Vec<Memory>>;

    /// Bulk removal; an empty filter wipes the collection. Returns the
    /// number of rows removed.
    async fn delete_all(&self, access: &AccessFilter) -> Result<u64>;

    /// Best-effort vector index creation; backends without native vector
    /// indexes may no-op.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Releases the backend connection.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_filter_scope_widening() {
        let access = AccessFilter::user("u1").with_agent("a1");

        assert!(access.permits("u1", Some("a1"), Scope::Private));
        assert!(!access.permits("u1", Some("a2"), Scope::Private));
        assert!(access.permits("u1", Some("a2"), Scope::AgentGroup));
        assert!(access.permits("u1", None, Scope::Global));
        assert!(!access.permits("u2", Some("a1"), Scope::Global));
    }

    #[test]
    fn user_only_filter_sees_all_scopes() {
        let access = AccessFilter::user("u1");
        assert!(access.permits("u1", Some("a1"), Scope::Private));
        assert!(access.permits("u1", None, Scope::Private));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let access = AccessFilter::any();
        assert!(access.permits("anyone", Some("any-agent"), Scope::Private));
    }
}
