//! # mnema-memory
//!
//! The memory-management engine of mnema: a coordinator over pluggable
//! providers that ingests utterances, maintains memories under a cognitive
//! lifecycle model, and retrieves them with decay-aware re-ranking.
//!
//! ## The write path
//!
//! An inferred add runs the intelligent pipeline: the [`FactExtractor`]
//! distills the conversation into atomic facts, the closest existing
//! memories are retrieved as candidates, and the [`DecisionMaker`] asks
//! the language model for an ADD/UPDATE/DELETE/NONE plan that the
//! pipeline applies step by step. Without a language model, near-duplicate
//! adds are folded into existing rows by the [`DedupEngine`] instead.
//!
//! ## The read path
//!
//! Searches recall by vector similarity, then — when the retention model
//! is configured — re-rank by lexical relevance weighted with the
//! Ebbinghaus retention curve, so memories the model predicts are
//! forgotten sink below fresher ones.
//!
//! ## Example
//!
//! ```ignore
//! use mnema_memory::{AddOptions, MemoryClient, SearchOptions};
//!
//! let client = MemoryClient::builder(store, embedder)
//!     .with_llm(llm)
//!     .with_intelligence(Default::default())
//!     .build();
//!
//! client.add("I moved to Berlin last month", &AddOptions::new("u1")).await?;
//! let hits = client.search("where does the user live?", &SearchOptions::new("u1")).await?;
//! ```

mod batch;
mod context;
mod coordinator;
mod decision;
mod dedup;
mod ebbinghaus;
mod extractor;
mod maintenance;
mod manager;
mod options;
mod parse;
mod stream;

pub use batch::{
    BatchFailure, BatchResult, BatchSuccess, MAX_CONCURRENT_OPERATIONS,
};
pub use context::CancellationToken;
pub use coordinator::{AddResult, MemoryClient, MemoryClientBuilder, UpdateItem};
pub use decision::{CandidateMemory, DecisionMaker, MemoryAction, MemoryEvent};
pub use dedup::DedupEngine;
pub use ebbinghaus::{EbbinghausEngine, LifecycleVerdict, REVIEW_INTERVALS_HOURS};
pub use extractor::FactExtractor;
pub use maintenance::MaintenanceReport;
pub use manager::{AppliedAction, IntelligentMemoryManager};
pub use options::{AccessOptions, AddOptions, ListOptions, SearchOptions};
pub use stream::{GET_ALL_STREAM_LIMIT, MemoryBatch, SEARCH_STREAM_LIMIT};
