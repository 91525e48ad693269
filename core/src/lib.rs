//! # mnema-core
//!
//! Core entities and provider traits for the mnema memory engine.
//!
//! This crate hosts everything the rest of the workspace agrees on: the
//! [`Memory`] entity, the [`LanguageModel`] / [`EmbeddingModel`] provider
//! traits, the [`VectorStore`] contract, the caller-facing error surface,
//! id generation, and configuration. Provider crates implement the traits;
//! the `mnema-memory` crate composes them.
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │  mnema-memory   │───▶│   mnema-core     │◀───│   Providers     │
//! │                 │    │   (this crate)   │    │                 │
//! │ - coordinator   │    │                  │    │ - openai        │
//! │ - pipeline      │    │ - Memory         │    │ - anthropic     │
//! │ - retention     │    │ - LanguageModel  │    │ - store/sqlite  │
//! │ - streaming     │    │ - EmbeddingModel │    │ - store/pg      │
//! └─────────────────┘    │ - VectorStore    │    └─────────────────┘
//!                        └──────────────────┘
//! ```
//!
//! Memories are value-like: only ids cross crate boundaries, so no layer
//! holds references into another layer's state.

pub mod config;
pub mod embedding;
pub mod error;
pub mod id;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod store;

#[doc(inline)]
pub use embedding::{Embedding, EmbeddingModel};
#[doc(inline)]
pub use error::{ErrorKind, MemoryError, Result};
#[doc(inline)]
pub use id::IdGenerator;
#[doc(inline)]
pub use llm::{GenerateOptions, LanguageModel, Message, Role};
#[doc(inline)]
pub use memory::{Memory, MemoryTier, Scope, SparseVector};
#[doc(inline)]
pub use prompt::Prompt;
#[doc(inline)]
pub use store::{AccessFilter, IndexSpec, ListRequest, MemoryState, SearchRequest, VectorStore};
