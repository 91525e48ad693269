//! The memory coordinator.
//!
//! [`MemoryClient`] is the public face of the engine: it owns the vector
//! store, the embedder, and the optional chat client, and composes the
//! dedup engine, the retention model, and the intelligent write pipeline.
//!
//! A single readers-writer lock guards the coordinator across parallel
//! callers: writes take it exclusively, reads share it. The intelligent
//! pipeline never re-enters the public API — every write method has a
//! lock-free `*_unlocked` twin the pipeline and the batch layer run
//! against, so a held write lock cannot deadlock on itself.

use std::sync::Arc;

use mnema_core::config::{AgentMemoryConfig, IntelligenceConfig};
use mnema_core::memory::keys;
use mnema_core::store::{ListRequest, MemoryState, SearchRequest};
use mnema_core::{
    EmbeddingModel, IdGenerator, LanguageModel, Memory, MemoryError, Prompt, Result, Scope,
    VectorStore,
};
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::batch::{BatchResult, ItemOutcome, run_items};
use crate::context::{ensure_active, guard};
use crate::decision::MemoryEvent;
use crate::dedup::DedupEngine;
use crate::ebbinghaus::EbbinghausEngine;
use crate::manager::{AppliedAction, IntelligentMemoryManager};
use crate::options::{AccessOptions, AddOptions, ListOptions, SearchOptions};
use crate::stream::{
    GET_ALL_STREAM_LIMIT, MemoryBatch, SEARCH_STREAM_LIMIT, stream_chunks, stream_failure,
    stream_pages,
};

/// Compact view of the memory affected by an add.
#[derive(Debug, Clone)]
pub struct AddResult {
    /// Affected memory id.
    pub id: i64,
    /// Stored content after the operation.
    pub content: String,
    /// Owning tenant.
    pub user_id: String,
    /// Owning agent, when set.
    pub agent_id: Option<String>,
    /// How the memory came to be: `Add` for inserts, `Update` for merges
    /// and pipeline rewrites.
    pub event: MemoryEvent,
}

/// One content update inside a batch.
#[derive(Debug, Clone)]
pub struct UpdateItem {
    /// Target memory id.
    pub id: i64,
    /// Replacement content.
    pub content: String,
}

/// Public client for the memory engine.
pub struct MemoryClient {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingModel>,
    llm: Option<Arc<dyn LanguageModel>>,
    ids: Arc<IdGenerator>,
    manager: Option<IntelligentMemoryManager>,
    dedup: DedupEngine,
    engine: Option<EbbinghausEngine>,
    default_scope: Scope,
    lock: RwLock<()>,
}

impl core::fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryClient")
            .field("intelligent", &self.manager.is_some())
            .field("default_scope", &self.default_scope)
            .finish_non_exhaustive()
    }
}

impl MemoryClient {
    /// Starts building a client over a store and an embedder.
    #[must_use]
    pub fn builder(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> MemoryClientBuilder {
        MemoryClientBuilder::new(store, embedder)
    }

    /// The retention model, when intelligence is configured.
    #[must_use]
    pub const fn engine(&self) -> Option<&EbbinghausEngine> {
        self.engine.as_ref()
    }

    /// Stores a memory.
    ///
    /// With `infer` set, the content goes through the intelligent pipeline
    /// when one is configured, or through the dedup-merge path otherwise;
    /// without it the content is embedded and inserted verbatim. Returns
    /// the first affected memory, or `None` when an inferred add produced
    /// an empty plan.
    pub async fn add(&self, content: &str, options: &AddOptions) -> Result<Option<AddResult>> {
        const OP: &str = "add";

        ensure_active(OP, &options.cancellation)?;
        let _write = self.lock.write().await;
        self.add_unlocked(OP, content, options).await
    }

    /// Lock-free twin of [`add`](Self::add); the write lock must already
    /// be held by the caller.
    async fn add_unlocked(
        &self,
        op: &'static str,
        content: &str,
        options: &AddOptions,
    ) -> Result<Option<AddResult>> {
        validate_content(op, content)?;
        validate_user(op, &options.user_id)?;

        if options.infer {
            if let Some(manager) = &self.manager {
                let plan = guard(
                    op,
                    &options.cancellation,
                    manager.intelligent_add(&Prompt::from(content), options),
                )
                .await?;
                return Ok(first_affected(&plan, options));
            }

            // No adjudicator configured: near-duplicates merge instead.
            let embedding = guard(op, &options.cancellation, self.embedder.embed(content))
                .await
                .map_err(|err| err.in_op(op))?;
            if let Some(merged) = guard(
                op,
                &options.cancellation,
                self.dedup.try_merge(
                    &options.user_id,
                    options.agent_id.as_deref(),
                    content,
                    &embedding,
                ),
            )
            .await
            .map_err(|err| err.in_op(op))?
            {
                return Ok(Some(AddResult {
                    id: merged.id,
                    content: merged.content,
                    user_id: merged.user_id,
                    agent_id: merged.agent_id,
                    event: MemoryEvent::Update,
                }));
            }
            let inserted = self.insert_simple(op, content, embedding, options).await?;
            return Ok(Some(inserted));
        }

        let embedding = guard(op, &options.cancellation, self.embedder.embed(content))
            .await
            .map_err(|err| err.in_op(op))?;
        let inserted = self.insert_simple(op, content, embedding, options).await?;
        Ok(Some(inserted))
    }

    async fn insert_simple(
        &self,
        op: &'static str,
        content: &str,
        embedding: Vec<f32>,
        options: &AddOptions,
    ) -> Result<AddResult> {
        let initial = self
            .engine
            .as_ref()
            .map_or(1.0, |engine| engine.config().initial_retention);
        let mut metadata = options.base_metadata(self.default_scope);
        metadata.insert(keys::RETENTION_STRENGTH.into(), json!(initial));

        let mut memory = Memory::new(self.ids.next_id(), options.user_id.clone(), content)
            .with_embedding(embedding)
            .with_metadata(metadata);
        memory.retention_strength = initial;
        memory.agent_id = options.agent_id.clone();

        guard(op, &options.cancellation, self.store.insert(&memory))
            .await
            .map_err(|err| err.in_op(op))?;
        debug!(id = memory.id, user_id = %memory.user_id, "memory added");
        Ok(AddResult {
            id: memory.id,
            content: memory.content,
            user_id: memory.user_id,
            agent_id: memory.agent_id,
            event: MemoryEvent::Add,
        })
    }

    /// Retrieves memories by natural-language query.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Memory>> {
        const OP: &str = "search";

        ensure_active(OP, &options.cancellation)?;
        let _read = self.lock.read().await;
        self.search_unlocked(OP, query, options, options.limit).await
    }

    async fn search_unlocked(
        &self,
        op: &'static str,
        query: &str,
        options: &SearchOptions,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let embedding = guard(op, &options.cancellation, self.embedder.embed(query))
            .await
            .map_err(|err| err.in_op(op))?;

        let mut request = SearchRequest::new(embedding, limit)
            .with_min_score(options.min_score)
            .with_filters(options.filters.clone());
        if let Some(user_id) = &options.user_id {
            request = request.with_user_id(user_id.clone());
        }
        if let Some(agent_id) = &options.agent_id {
            request = request.with_agent_id(agent_id.clone());
        }

        let results = guard(op, &options.cancellation, self.store.search(&request))
            .await
            .map_err(|err| err.in_op(op))?;

        let rerank = options.rerank.unwrap_or(self.manager.is_some());
        if rerank {
            if let Some(manager) = &self.manager {
                let mut reranked =
                    manager.process_search_results(results, query, OffsetDateTime::now_utc());
                // Re-ranking overwrites `score`; the floor applies to the
                // score the caller actually sees.
                reranked.retain(|memory| memory.score.unwrap_or(0.0) >= options.min_score);
                return Ok(reranked);
            }
        }
        Ok(results)
    }

    /// Fetches one memory; the access counts as a retention reinforcement
    /// when the retention model is configured.
    pub async fn get(&self, id: i64, options: &AccessOptions) -> Result<Memory> {
        const OP: &str = "get";

        ensure_active(OP, &options.cancellation)?;
        let _read = self.lock.read().await;

        let mut memory = guard(
            OP,
            &options.cancellation,
            self.store.get(id, &options.access()),
        )
        .await
        .map_err(|err| err.in_op(OP))?;

        if let Some(engine) = &self.engine {
            let now = OffsetDateTime::now_utc();
            let current = engine.retention(memory.created_at, memory.last_accessed_at, now);
            let reinforced = engine.reinforce(current);

            memory.retention_strength = reinforced;
            memory.last_accessed_at = Some(now);
            let count = memory.access_count() + 1;
            memory
                .metadata
                .insert(keys::ACCESS_COUNT.into(), json!(count));
            memory
                .metadata
                .insert(keys::RETENTION_STRENGTH.into(), json!(reinforced));

            let state = MemoryState {
                retention_strength: reinforced,
                last_accessed_at: Some(now),
                metadata: memory.metadata.clone(),
            };
            // Reinforcement is best-effort; the read itself already
            // succeeded.
            if let Err(err) = self.store.update_state(id, &state, &options.access()).await {
                warn!(id, error = %err, "failed to persist access reinforcement");
            }
        }
        Ok(memory)
    }

    /// Rewrites a memory's content and regenerates its embedding.
    pub async fn update(
        &self,
        id: i64,
        content: &str,
        options: &AccessOptions,
    ) -> Result<Memory> {
        const OP: &str = "update";

        ensure_active(OP, &options.cancellation)?;
        validate_content(OP, content)?;
        let _write = self.lock.write().await;
        self.update_unlocked(OP, id, content, options).await
    }

    async fn update_unlocked(
        &self,
        op: &'static str,
        id: i64,
        content: &str,
        options: &AccessOptions,
    ) -> Result<Memory> {
        let embedding = guard(op, &options.cancellation, self.embedder.embed(content))
            .await
            .map_err(|err| err.in_op(op))?;
        guard(
            op,
            &options.cancellation,
            self.store.update(id, content, &embedding, &options.access()),
        )
        .await
        .map_err(|err| err.in_op(op))
    }

    /// Removes a memory.
    pub async fn delete(&self, id: i64, options: &AccessOptions) -> Result<()> {
        const OP: &str = "delete";

        ensure_active(OP, &options.cancellation)?;
        let _write = self.lock.write().await;
        self.delete_unlocked(OP, id, options).await
    }

    async fn delete_unlocked(
        &self,
        op: &'static str,
        id: i64,
        options: &AccessOptions,
    ) -> Result<()> {
        guard(
            op,
            &options.cancellation,
            self.store.delete(id, &options.access()),
        )
        .await
        .map_err(|err| err.in_op(op))
    }

    /// Newest-first page of memories.
    pub async fn get_all(&self, options: &ListOptions) -> Result<Vec<Memory>> {
        const OP: &str = "get_all";

        ensure_active(OP, &options.cancellation)?;
        let _read = self.lock.read().await;

        let mut request = ListRequest::new(options.limit).with_offset(options.offset);
        if let Some(user_id) = &options.user_id {
            request = request.with_user_id(user_id.clone());
        }
        if let Some(agent_id) = &options.agent_id {
            request = request.with_agent_id(agent_id.clone());
        }
        guard(OP, &options.cancellation, self.store.get_all(&request))
            .await
            .map_err(|err| err.in_op(OP))
    }

    /// Bulk removal. With no tenancy filter this wipes the whole
    /// collection — that is the documented contract, so it is logged
    /// loudly rather than refused.
    pub async fn delete_all(&self, options: &AccessOptions) -> Result<u64> {
        const OP: &str = "delete_all";

        ensure_active(OP, &options.cancellation)?;
        if options.user_id.is_none() && options.agent_id.is_none() {
            warn!("delete_all called without filters; wiping the collection");
        }
        let _write = self.lock.write().await;
        guard(
            OP,
            &options.cancellation,
            self.store.delete_all(&options.access()),
        )
        .await
        .map_err(|err| err.in_op(OP))
    }

    /// Runs the full intelligent write pipeline over a conversation.
    pub async fn intelligent_add(
        &self,
        prompt: impl Into<Prompt> + Send,
        options: &AddOptions,
    ) -> Result<Vec<AppliedAction>> {
        const OP: &str = "intelligent_add";

        ensure_active(OP, &options.cancellation)?;
        validate_user(OP, &options.user_id)?;
        let manager = self.manager.as_ref().ok_or_else(|| {
            MemoryError::invalid_config(OP, "intelligent memory manager is not configured")
        })?;

        let prompt = prompt.into();
        let _write = self.lock.write().await;
        guard(
            OP,
            &options.cancellation,
            manager.intelligent_add(&prompt, options),
        )
        .await
    }

    /// Adds many memories with bounded concurrency.
    pub async fn batch_add(&self, contents: &[String], options: &AddOptions) -> BatchResult {
        const OP: &str = "batch_add";

        let _write = self.lock.write().await;
        let items: Vec<_> = contents
            .iter()
            .enumerate()
            .map(|(index, content)| async move {
                let result = if options.cancellation.is_cancelled() {
                    Err(MemoryError::cancelled(OP))
                } else {
                    self.add_unlocked(OP, content, options).await
                };
                match result {
                    Ok(added) => ItemOutcome {
                        index,
                        id: added.as_ref().map(|a| a.id),
                        content: Some(content.clone()),
                        result: Ok(()),
                    },
                    Err(error) => ItemOutcome {
                        index,
                        id: None,
                        content: Some(content.clone()),
                        result: Err(error),
                    },
                }
            })
            .collect();

        let result = run_items(items).await;
        info!(
            total = result.total,
            succeeded = result.success_count,
            failed = result.failure_count,
            "batch add finished"
        );
        result
    }

    /// Updates many memories with bounded concurrency.
    pub async fn batch_update(
        &self,
        items: &[UpdateItem],
        options: &AccessOptions,
    ) -> BatchResult {
        const OP: &str = "batch_update";

        let _write = self.lock.write().await;
        let futures: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| async move {
                let result = if options.cancellation.is_cancelled() {
                    Err(MemoryError::cancelled(OP))
                } else {
                    self.update_unlocked(OP, item.id, &item.content, options)
                        .await
                        .map(drop)
                };
                ItemOutcome {
                    index,
                    id: Some(item.id),
                    content: Some(item.content.clone()),
                    result,
                }
            })
            .collect();

        let result = run_items(futures).await;
        info!(
            total = result.total,
            succeeded = result.success_count,
            failed = result.failure_count,
            "batch update finished"
        );
        result
    }

    /// Deletes many memories with bounded concurrency.
    pub async fn batch_delete(&self, ids: &[i64], options: &AccessOptions) -> BatchResult {
        const OP: &str = "batch_delete";

        let _write = self.lock.write().await;
        let futures: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(index, &id)| async move {
                let result = if options.cancellation.is_cancelled() {
                    Err(MemoryError::cancelled(OP))
                } else {
                    self.delete_unlocked(OP, id, options).await
                };
                ItemOutcome {
                    index,
                    id: Some(id),
                    content: None,
                    result,
                }
            })
            .collect();

        let result = run_items(futures).await;
        info!(
            total = result.total,
            succeeded = result.success_count,
            failed = result.failure_count,
            "batch delete finished"
        );
        result
    }

    /// Streams search results in batches over a capacity-1 channel.
    ///
    /// One bounded search runs up front (an `options.limit` of 0 means the
    /// stream default of 1000 rows) and the result is paginated in memory.
    pub async fn search_stream(
        &self,
        query: &str,
        batch_size: usize,
        options: &SearchOptions,
    ) -> Receiver<MemoryBatch> {
        const OP: &str = "search_stream";

        if options.cancellation.is_cancelled() {
            return stream_failure(MemoryError::cancelled(OP));
        }

        let limit = if options.limit == 0 {
            SEARCH_STREAM_LIMIT
        } else {
            options.limit.min(SEARCH_STREAM_LIMIT)
        };

        let results = {
            let _read = self.lock.read().await;
            self.search_unlocked(OP, query, options, limit).await
        };
        match results {
            Ok(results) => {
                stream_chunks(OP, results, batch_size, options.cancellation.clone())
            }
            Err(err) => stream_failure(err.in_op(OP)),
        }
    }

    /// Streams a listing in batches, paging through the store.
    ///
    /// An `options.limit` of 0 means the stream default of 10 000 rows.
    pub async fn get_all_stream(
        &self,
        batch_size: usize,
        options: &ListOptions,
    ) -> Receiver<MemoryBatch> {
        const OP: &str = "get_all_stream";

        if options.cancellation.is_cancelled() {
            return stream_failure(MemoryError::cancelled(OP));
        }

        let mut options = options.clone();
        if options.limit == 0 {
            options.limit = GET_ALL_STREAM_LIMIT;
        }

        // Pages run against the store directly; the coordinator lock only
        // gates the stream's start.
        let _read = self.lock.read().await;
        stream_pages(OP, Arc::clone(&self.store), options, batch_size)
    }

    /// Shuts the engine down: store, chat client, then embedder. Every
    /// client is closed even when an earlier one fails; the first error is
    /// reported.
    pub async fn close(&self) -> Result<()> {
        const OP: &str = "close";

        let _write = self.lock.write().await;
        let mut first_error: Option<MemoryError> = None;

        if let Err(err) = self.store.close().await {
            first_error.get_or_insert(err.in_op(OP));
        }
        if let Some(llm) = &self.llm {
            if let Err(err) = llm.close().await {
                first_error.get_or_insert(err.in_op(OP));
            }
        }
        if let Err(err) = self.embedder.close().await {
            first_error.get_or_insert(err.in_op(OP));
        }

        info!("memory client closed");
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub(crate) async fn write_guard(&self) -> tokio::sync::RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }
}

fn first_affected(plan: &[AppliedAction], options: &AddOptions) -> Option<AddResult> {
    plan.iter()
        .find_map(|action| {
            action.id.map(|id| AddResult {
                id,
                content: action.text.clone(),
                user_id: options.user_id.clone(),
                agent_id: options.agent_id.clone(),
                event: action.event,
            })
        })
}

fn validate_content(op: &str, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        Err(MemoryError::invalid_input(op, "content must not be empty"))
    } else {
        Ok(())
    }
}

fn validate_user(op: &str, user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        Err(MemoryError::invalid_input(op, "user_id must not be empty"))
    } else {
        Ok(())
    }
}

/// Builder for [`MemoryClient`].
pub struct MemoryClientBuilder {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingModel>,
    llm: Option<Arc<dyn LanguageModel>>,
    intelligence: Option<IntelligenceConfig>,
    agent_memory: AgentMemoryConfig,
    node_id: u64,
}

impl core::fmt::Debug for MemoryClientBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryClientBuilder")
            .field("intelligence", &self.intelligence)
            .finish_non_exhaustive()
    }
}

impl MemoryClientBuilder {
    fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            store,
            embedder,
            llm: None,
            intelligence: None,
            agent_memory: AgentMemoryConfig::default(),
            node_id: 0,
        }
    }

    /// Attaches a chat client; required for the intelligent pipeline.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Enables the cognitive lifecycle model.
    #[must_use]
    pub fn with_intelligence(mut self, config: IntelligenceConfig) -> Self {
        self.intelligence = Some(config);
        self
    }

    /// Configures multi-agent visibility defaults.
    #[must_use]
    pub fn with_agent_memory(mut self, config: AgentMemoryConfig) -> Self {
        self.agent_memory = config;
        self
    }

    /// Sets the node id baked into generated memory ids.
    #[must_use]
    pub const fn with_node_id(mut self, node_id: u64) -> Self {
        self.node_id = node_id;
        self
    }

    /// Assembles the client.
    #[must_use]
    pub fn build(self) -> MemoryClient {
        let ids = Arc::new(IdGenerator::new(self.node_id));
        let default_scope = self.agent_memory.default_scope;

        let duplicate_threshold = self
            .intelligence
            .as_ref()
            .map_or_else(|| IntelligenceConfig::default().duplicate_threshold, |c| {
                c.duplicate_threshold
            });
        let dedup = DedupEngine::new(&self.store, duplicate_threshold);

        let engine = self.intelligence.clone().map(EbbinghausEngine::new);
        let manager = match (&self.llm, &self.intelligence) {
            (Some(llm), Some(config)) if config.enabled => Some(IntelligentMemoryManager::new(
                &self.store,
                Arc::clone(&self.embedder),
                Arc::clone(llm),
                config.clone(),
                Arc::clone(&ids),
                default_scope,
            )),
            _ => None,
        };

        MemoryClient {
            store: self.store,
            embedder: self.embedder,
            llm: self.llm,
            ids,
            manager,
            dedup,
            engine,
            default_scope,
            lock: RwLock::new(()),
        }
    }
}
