//! The intelligent memory manager.
//!
//! Composes the fact extractor, the decision maker, and the retention
//! model into the write pipeline, and provides the decay-aware re-ranker
//! used on reads.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use mnema_core::config::IntelligenceConfig;
use mnema_core::memory::keys;
use mnema_core::store::SearchRequest;
use mnema_core::{
    Embedding, EmbeddingModel, IdGenerator, LanguageModel, Memory, MemoryError, Prompt, Result,
    Scope, VectorStore,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::decision::{CandidateMemory, DecisionMaker, MemoryAction, MemoryEvent};
use crate::ebbinghaus::EbbinghausEngine;
use crate::extractor::FactExtractor;
use crate::options::AddOptions;

const CANDIDATE_SEARCH_LIMIT: usize = 5;
const CANDIDATE_CAP: usize = 10;

/// One applied (or attempted) step of a write plan, in plan order.
#[derive(Debug, Clone)]
pub struct AppliedAction {
    /// Operation the plan chose.
    pub event: MemoryEvent,
    /// Affected memory id; absent for NONE items.
    pub id: Option<i64>,
    /// Memory text after the step.
    pub text: String,
    /// Replaced content, recorded for UPDATE steps.
    pub old_memory: Option<String>,
}

/// Write pipeline and read re-ranker over the retention model.
#[derive(Clone)]
pub struct IntelligentMemoryManager {
    store: Weak<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingModel>,
    extractor: FactExtractor,
    decision: DecisionMaker,
    engine: EbbinghausEngine,
    ids: Arc<IdGenerator>,
    default_scope: Scope,
}

impl core::fmt::Debug for IntelligentMemoryManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IntelligentMemoryManager")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl IntelligentMemoryManager {
    /// Wires the pipeline over shared provider clients.
    #[must_use]
    pub fn new(
        store: &Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn LanguageModel>,
        config: IntelligenceConfig,
        ids: Arc<IdGenerator>,
        default_scope: Scope,
    ) -> Self {
        Self {
            store: Arc::downgrade(store),
            embedder,
            extractor: FactExtractor::new(Arc::clone(&llm)),
            decision: DecisionMaker::new(llm),
            engine: EbbinghausEngine::new(config),
            ids,
            default_scope,
        }
    }

    /// The retention model this manager schedules with.
    #[must_use]
    pub const fn engine(&self) -> &EbbinghausEngine {
        &self.engine
    }

    /// Runs the full write pipeline for one ingestion request.
    ///
    /// Facts are extracted, adjudicated against the closest existing
    /// memories, and the resulting plan is applied sequentially. Failures
    /// of individual plan steps are logged and skipped; only pipeline-level
    /// failures (extraction transport, candidate search) propagate.
    pub async fn intelligent_add(
        &self,
        prompt: &Prompt,
        options: &AddOptions,
    ) -> Result<Vec<AppliedAction>> {
        const OP: &str = "intelligent_add";

        let store = self
            .store
            .upgrade()
            .ok_or_else(|| MemoryError::storage(OP, "vector store is closed"))?;

        let facts = self.extractor.extract(prompt).await?;
        if facts.is_empty() {
            if self.engine.config().fallback_to_simple_add {
                return self.fallback_add(&store, prompt, options).await;
            }
            debug!("no facts extracted; returning empty plan");
            return Ok(Vec::new());
        }

        // One embedding per distinct fact string; reused on ADD/UPDATE.
        let mut embeddings: HashMap<String, Embedding> = HashMap::new();
        let mut candidates: Vec<Memory> = Vec::new();
        for fact in &facts {
            let embedding = match embeddings.get(fact) {
                Some(embedding) => embedding.clone(),
                None => {
                    let embedding = self.embedder.embed(fact).await.map_err(|err| err.in_op(OP))?;
                    embeddings.insert(fact.clone(), embedding.clone());
                    embedding
                }
            };

            let mut request = SearchRequest::new(embedding, CANDIDATE_SEARCH_LIMIT)
                .with_user_id(options.user_id.clone())
                .with_filters(options.filters.clone());
            if let Some(agent_id) = &options.agent_id {
                request = request.with_agent_id(agent_id.clone());
            }
            for found in store.search(&request).await? {
                if !candidates.iter().any(|existing| existing.id == found.id) {
                    candidates.push(found);
                }
            }
        }
        candidates.truncate(CANDIDATE_CAP);

        let rendered: Vec<CandidateMemory> = candidates
            .iter()
            .enumerate()
            .map(|(position, memory)| CandidateMemory {
                id: position.to_string(),
                text: memory.content.clone(),
            })
            .collect();

        let plan = self.decision.decide(&facts, &rendered).await?;
        debug!(facts = facts.len(), candidates = candidates.len(), steps = plan.len(),
               "applying write plan");

        let mut applied = Vec::with_capacity(plan.len());
        for action in plan {
            match self
                .apply_action(&store, &action, &candidates, &mut embeddings, options)
                .await
            {
                Ok(Some(result)) => applied.push(result),
                Ok(None) => {}
                Err(err) => {
                    warn!(event = action.event.as_str(), error = %err,
                          "plan step failed; continuing");
                }
            }
        }
        Ok(applied)
    }

    /// Applies a single plan step. `Ok(None)` means the step was dropped
    /// (e.g. an UPDATE referencing an unknown temp id).
    async fn apply_action(
        &self,
        store: &Arc<dyn VectorStore>,
        action: &MemoryAction,
        candidates: &[Memory],
        embeddings: &mut HashMap<String, Embedding>,
        options: &AddOptions,
    ) -> Result<Option<AppliedAction>> {
        const OP: &str = "intelligent_add";

        match action.event {
            MemoryEvent::Add => {
                if action.text.trim().is_empty() {
                    return Ok(None);
                }
                let memory = self
                    .build_memory(&action.text, embeddings, options)
                    .await?;
                store.insert(&memory).await?;
                Ok(Some(AppliedAction {
                    event: MemoryEvent::Add,
                    id: Some(memory.id),
                    text: memory.content,
                    old_memory: None,
                }))
            }
            MemoryEvent::Update => {
                let Some(target) = resolve_temp_id(action, candidates) else {
                    return Ok(None);
                };
                if action.text.trim().is_empty() {
                    return Ok(None);
                }
                let embedding = match embeddings.get(&action.text) {
                    Some(embedding) => embedding.clone(),
                    None => {
                        let embedding = self
                            .embedder
                            .embed(&action.text)
                            .await
                            .map_err(|err| err.in_op(OP))?;
                        embeddings.insert(action.text.clone(), embedding.clone());
                        embedding
                    }
                };
                // Writes stay user-scoped: the candidate may belong to a
                // sibling agent through a shared scope.
                let access = mnema_core::AccessFilter::user(options.user_id.clone());
                let updated = store
                    .update(target.id, &action.text, &embedding, &access)
                    .await?;
                Ok(Some(AppliedAction {
                    event: MemoryEvent::Update,
                    id: Some(updated.id),
                    text: updated.content,
                    old_memory: action
                        .old_memory
                        .clone()
                        .or_else(|| Some(target.content.clone())),
                }))
            }
            MemoryEvent::Delete => {
                let Some(target) = resolve_temp_id(action, candidates) else {
                    return Ok(None);
                };
                let access = mnema_core::AccessFilter::user(options.user_id.clone());
                store.delete(target.id, &access).await?;
                Ok(Some(AppliedAction {
                    event: MemoryEvent::Delete,
                    id: Some(target.id),
                    text: target.content.clone(),
                    old_memory: None,
                }))
            }
            MemoryEvent::None => Ok(Some(AppliedAction {
                event: MemoryEvent::None,
                id: None,
                text: action.text.clone(),
                old_memory: None,
            })),
        }
    }

    /// Simple-ADD fallback for ingestions that yield no facts.
    async fn fallback_add(
        &self,
        store: &Arc<dyn VectorStore>,
        prompt: &Prompt,
        options: &AddOptions,
    ) -> Result<Vec<AppliedAction>> {
        let content = prompt.render();
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        debug!("no facts extracted; falling back to simple add");

        let mut embeddings = HashMap::new();
        let memory = self.build_memory(&content, &mut embeddings, options).await?;
        store.insert(&memory).await?;
        Ok(vec![AppliedAction {
            event: MemoryEvent::Add,
            id: Some(memory.id),
            text: memory.content,
            old_memory: None,
        }])
    }

    async fn build_memory(
        &self,
        content: &str,
        embeddings: &mut HashMap<String, Embedding>,
        options: &AddOptions,
    ) -> Result<Memory> {
        const OP: &str = "intelligent_add";

        let embedding = match embeddings.get(content) {
            Some(embedding) => embedding.clone(),
            None => {
                let embedding = self
                    .embedder
                    .embed(content)
                    .await
                    .map_err(|err| err.in_op(OP))?;
                embeddings.insert(content.to_string(), embedding.clone());
                embedding
            }
        };

        let now = OffsetDateTime::now_utc();
        let initial = self.engine.config().initial_retention;
        let importance = options.importance.unwrap_or(0.0);
        let mut metadata = options.base_metadata(self.default_scope);
        metadata.insert(keys::RETENTION_STRENGTH.into(), json!(initial));
        let schedule: Vec<String> = self
            .engine
            .review_schedule(now, importance)
            .iter()
            .filter_map(|at| at.format(&time::format_description::well_known::Rfc3339).ok())
            .collect();
        metadata.insert(keys::REVIEW_SCHEDULE.into(), json!(schedule));
        metadata.insert(
            keys::INTELLIGENCE.into(),
            json!({
                "tier": self.engine.classify(initial).as_str(),
            }),
        );

        let mut memory = Memory::new(self.ids.next_id(), options.user_id.clone(), content)
            .with_embedding(embedding)
            .with_metadata(metadata);
        memory.retention_strength = initial;
        if let Some(agent_id) = &options.agent_id {
            memory.agent_id = Some(agent_id.clone());
        }
        Ok(memory)
    }

    /// Re-scores search candidates by lexical relevance weighted with the
    /// retention curve, then re-orders them.
    ///
    /// `relevance` is the fraction of query words appearing in the content,
    /// `decay` the current retention; the product overwrites `score` and
    /// all three are annotated into metadata. Sorting is stable, so rows
    /// with equal final scores keep their original order.
    #[must_use]
    pub fn process_search_results(
        &self,
        mut results: Vec<Memory>,
        query: &str,
        now: OffsetDateTime,
    ) -> Vec<Memory> {
        for memory in &mut results {
            let relevance = relevance_score(query, &memory.content);
            let decay = self
                .engine
                .retention(memory.created_at, memory.last_accessed_at, now);
            let final_score = relevance * decay;

            memory
                .metadata
                .insert("relevance_score".into(), json!(relevance));
            memory.metadata.insert("decay_factor".into(), json!(decay));
            memory
                .metadata
                .insert("final_score".into(), json!(final_score));
            memory.score = Some(final_score);
        }

        results.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
        });
        results
    }
}

/// Fraction of query words found in the content, capped at 1.
fn relevance_score(query: &str, content: &str) -> f64 {
    let query_words: Vec<String> = query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    if query_words.is_empty() {
        return 1.0;
    }

    let content_words: std::collections::HashSet<String> = content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let fraction = query_words
        .iter()
        .filter(|word| content_words.contains(*word))
        .count() as f64
        / query_words.len() as f64;
    fraction.min(1.0)
}

fn resolve_temp_id<'a>(action: &MemoryAction, candidates: &'a [Memory]) -> Option<&'a Memory> {
    let raw = action.id.as_deref()?;
    let position: usize = match raw.parse() {
        Ok(position) => position,
        Err(_) => {
            warn!(id = raw, "dropping plan step with non-positional temp id");
            return None;
        }
    };
    let Some(memory) = candidates.get(position) else {
        warn!(id = raw, "dropping plan step referencing unknown temp id");
        return None;
    };
    Some(memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_is_word_overlap() {
        assert!((relevance_score("python programming", "User likes Python programming") - 1.0)
            .abs()
            < f64::EPSILON);
        assert!((relevance_score("python rust", "User likes Python") - 0.5).abs() < f64::EPSILON);
        assert!((relevance_score("go", "User likes Python") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_query_is_fully_relevant() {
        assert!((relevance_score("", "anything") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn temp_id_resolution_is_positional() {
        let candidates = vec![Memory::new(42, "u1", "a"), Memory::new(43, "u1", "b")];
        let action = MemoryAction {
            id: Some("1".into()),
            text: "b2".into(),
            event: MemoryEvent::Update,
            old_memory: None,
        };
        assert_eq!(resolve_temp_id(&action, &candidates).unwrap().id, 43);

        let out_of_range = MemoryAction {
            id: Some("7".into()),
            ..action.clone()
        };
        assert!(resolve_temp_id(&out_of_range, &candidates).is_none());

        let not_a_number = MemoryAction {
            id: Some("mem-1".into()),
            ..action
        };
        assert!(resolve_temp_id(&not_a_number, &candidates).is_none());
    }
}
