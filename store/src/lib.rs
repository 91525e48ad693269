//! # mnema-store
//!
//! SQL vector store backends for the mnema memory engine.
//!
//! Every backend implements [`mnema_core::VectorStore`] over the same row
//! layout: `id, user_id, agent_id, content, embedding, metadata, created_at,
//! updated_at, retention_strength, last_accessed_at, hash`, indexed by
//! `(user_id, agent_id)`.
//!
//! - [`SqliteStore`] (feature `sqlite`, default) — embedded single-file or
//!   in-memory storage; exact cosine similarity over a filtered scan.
//! - `PostgresStore` (feature `postgres`) — pgvector column with
//!   server-side cosine distance and `jsonb` metadata predicates.
//! - `OceanBaseStore` (feature `oceanbase`) — MySQL-protocol backend with a
//!   SQL tenancy prefilter and client-side cosine re-scoring.
//!
//! Tenancy is enforced as non-existence: a row masked by the access filter
//! behaves exactly like a missing row.

pub(crate) mod codec;

#[cfg(feature = "oceanbase")]
#[cfg_attr(docsrs, doc(cfg(feature = "oceanbase")))]
pub mod oceanbase;
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "oceanbase")]
pub use oceanbase::OceanBaseStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
