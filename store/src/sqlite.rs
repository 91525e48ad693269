//! Embedded SQLite backend.
//!
//! Stores embeddings as little-endian f32 blobs and performs exact cosine
//! similarity over a tenancy-prefiltered scan, with scope, metadata
//! filters, and ranking applied client-side.

use std::str::FromStr;

use async_trait::async_trait;
use mnema_core::store::{AccessFilter, IndexSpec, ListRequest, MemoryState, SearchRequest};
use mnema_core::{Embedding, Memory, MemoryError, Result, VectorStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::codec::{
    check_dimension, content_hash, cosine_similarity, decode_embedding, decode_metadata,
    decode_timestamp, encode_embedding, encode_timestamp, rank_scanned,
};

/// SQLite-backed vector store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
    dimensions: usize,
}

impl SqliteStore {
    /// Opens (and creates if missing) a database file.
    pub async fn connect(path: &str, collection: &str, dimensions: usize) -> Result<Self> {
        const OP: &str = "sqlite.connect";

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|err| MemoryError::invalid_config(OP, err.to_string()).with_source(err))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|err| MemoryError::connection_failed(OP, err.to_string()).with_source(err))?;
        Self::with_pool(pool, collection, dimensions).await
    }

    /// Opens a private in-memory database, mainly for tests.
    pub async fn in_memory(collection: &str, dimensions: usize) -> Result<Self> {
        const OP: &str = "sqlite.connect";

        // A single connection keeps every query on the same in-memory
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|err| MemoryError::connection_failed(OP, err.to_string()).with_source(err))?;
        Self::with_pool(pool, collection, dimensions).await
    }

    async fn with_pool(pool: SqlitePool, collection: &str, dimensions: usize) -> Result<Self> {
        const OP: &str = "sqlite.connect";

        let table = sanitize_identifier(OP, collection)?;
        let store = Self {
            pool,
            table,
            dimensions,
        };
        store.migrate().await?;
        info!(collection = %store.table, dimensions, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        const OP: &str = "sqlite.migrate";

        let create = format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_id TEXT,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{{}}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                retention_strength REAL NOT NULL DEFAULT 1.0,
                last_accessed_at INTEGER,
                hash TEXT NOT NULL
            )",
            t = self.table
        );
        sqlx::query(&create)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{t}_tenancy\" ON \"{t}\" (user_id, agent_id)",
            t = self.table
        );
        sqlx::query(&index)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    /// Tenancy-prefiltered scan; scope and metadata filtering happen on the
    /// decoded rows.
    async fn scan(&self, op: &str, user_id: Option<&str>) -> Result<Vec<Memory>> {
        let mut sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at FROM \"{t}\"",
            t = self.table
        );
        if user_id.is_some() {
            sql.push_str(" WHERE user_id = ?1");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| storage_error(op, err))?;

        rows.iter().map(|row| row_to_memory(op, row)).collect()
    }

    async fn fetch_visible(
        &self,
        op: &str,
        id: i64,
        access: &AccessFilter,
    ) -> Result<Memory> {
        let sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at FROM \"{t}\" WHERE id = ?1",
            t = self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| storage_error(op, err))?;

        let memory = row
            .as_ref()
            .map(|row| row_to_memory(op, row))
            .transpose()?
            .ok_or_else(|| MemoryError::not_found(op, format!("memory {id} not found")))?;

        if !access.permits(&memory.user_id, memory.agent_id.as_deref(), memory.scope()) {
            return Err(MemoryError::not_found(op, format!("memory {id} not found")));
        }
        Ok(memory)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert(&self, memory: &Memory) -> Result<()> {
        const OP: &str = "sqlite.insert";

        check_dimension(OP, self.dimensions, memory.embedding.len())?;
        if memory.user_id.is_empty() {
            return Err(MemoryError::invalid_input(OP, "user_id must not be empty"));
        }

        let sql = format!(
            "INSERT INTO \"{t}\" (id, user_id, agent_id, content, embedding, metadata, \
             created_at, updated_at, retention_strength, last_accessed_at, hash) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            t = self.table
        );
        let metadata = serde_json::Value::Object(memory.metadata.clone()).to_string();
        let result = sqlx::query(&sql)
            .bind(memory.id)
            .bind(&memory.user_id)
            .bind(memory.agent_id.as_deref())
            .bind(&memory.content)
            .bind(encode_embedding(&memory.embedding))
            .bind(metadata)
            .bind(encode_timestamp(memory.created_at))
            .bind(encode_timestamp(memory.updated_at))
            .bind(memory.retention_strength)
            .bind(memory.last_accessed_at.map(encode_timestamp))
            .bind(content_hash(&memory.content))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!(id = memory.id, user_id = %memory.user_id, "memory inserted");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => Err(MemoryError::storage(
                OP,
                format!("memory {} already exists", memory.id),
            )
            .with_source(err)),
            Err(err) => Err(storage_error(OP, err)),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Memory>> {
        const OP: &str = "sqlite.search";

        check_dimension(OP, self.dimensions, request.embedding.len())?;

        let access = request.access();
        let scanned = self.scan(OP, request.user_id.as_deref()).await?;
        let scored = scanned
            .into_iter()
            .filter(|memory| {
                access.permits(&memory.user_id, memory.agent_id.as_deref(), memory.scope())
                    && memory.matches_filters(&request.filters)
            })
            .map(|mut memory| {
                memory.score = Some(cosine_similarity(&request.embedding, &memory.embedding));
                memory
            })
            .collect();

        Ok(rank_scanned(scored, request.min_score, request.limit))
    }

    async fn get(&self, id: i64, access: &AccessFilter) -> Result<Memory> {
        self.fetch_visible("sqlite.get", id, access).await
    }

    async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: &Embedding,
        access: &AccessFilter,
    ) -> Result<Memory> {
        const OP: &str = "sqlite.update";

        check_dimension(OP, self.dimensions, embedding.len())?;
        let mut memory = self.fetch_visible(OP, id, access).await?;

        let updated_at = time::OffsetDateTime::now_utc();
        let sql = format!(
            "UPDATE \"{t}\" SET content = ?1, embedding = ?2, updated_at = ?3, hash = ?4 \
             WHERE id = ?5",
            t = self.table
        );
        sqlx::query(&sql)
            .bind(content)
            .bind(encode_embedding(embedding))
            .bind(encode_timestamp(updated_at))
            .bind(content_hash(content))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;

        memory.content = content.to_string();
        memory.embedding = embedding.clone();
        memory.updated_at = updated_at;
        Ok(memory)
    }

    async fn update_state(
        &self,
        id: i64,
        state: &MemoryState,
        access: &AccessFilter,
    ) -> Result<()> {
        const OP: &str = "sqlite.update_state";

        self.fetch_visible(OP, id, access).await?;
        let sql = format!(
            "UPDATE \"{t}\" SET retention_strength = ?1, last_accessed_at = ?2, metadata = ?3 \
             WHERE id = ?4",
            t = self.table
        );
        let metadata = serde_json::Value::Object(state.metadata.clone()).to_string();
        sqlx::query(&sql)
            .bind(state.retention_strength)
            .bind(state.last_accessed_at.map(encode_timestamp))
            .bind(metadata)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    async fn delete(&self, id: i64, access: &AccessFilter) -> Result<()> {
        const OP: &str = "sqlite.delete";

        self.fetch_visible(OP, id, access).await?;
        let sql = format!("DELETE FROM \"{t}\" WHERE id = ?1", t = self.table);
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    async fn get_all(&self, request: &ListRequest) -> Result<Vec<Memory>> {
        const OP: &str = "sqlite.get_all";

        let access = request.access();
        let scanned = self.scan(OP, request.user_id.as_deref()).await?;
        Ok(scanned
            .into_iter()
            .filter(|memory| {
                access.permits(&memory.user_id, memory.agent_id.as_deref(), memory.scope())
            })
            .skip(request.offset)
            .take(request.limit)
            .collect())
    }

    async fn delete_all(&self, access: &AccessFilter) -> Result<u64> {
        const OP: &str = "sqlite.delete_all";

        if access.user_id.is_none() && access.agent_id.is_none() {
            let sql = format!("DELETE FROM \"{t}\"", t = self.table);
            let result = sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|err| storage_error(OP, err))?;
            return Ok(result.rows_affected());
        }

        let visible = self.scan(OP, access.user_id.as_deref()).await?;
        let ids: Vec<i64> = visible
            .into_iter()
            .filter(|memory| {
                access.permits(&memory.user_id, memory.agent_id.as_deref(), memory.scope())
            })
            .map(|memory| memory.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM \"{t}\" WHERE id IN ({placeholders})",
            t = self.table
        );
        let mut query = sqlx::query(&sql);
        for id in &ids {
            query = query.bind(*id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(result.rows_affected())
    }

    async fn create_index(&self, _spec: &IndexSpec) -> Result<()> {
        // SQLite has no native vector index; the tenancy index from
        // migration is all this backend maintains.
        self.migrate().await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn sanitize_identifier(op: &str, name: &str) -> Result<String> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MemoryError::invalid_config(
            op,
            format!("collection name {name:?} must be alphanumeric or underscore"),
        ));
    }
    Ok(name.to_string())
}

fn storage_error(op: &str, err: sqlx::Error) -> MemoryError {
    MemoryError::storage(op, err.to_string()).with_source(err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(dbe) if dbe.is_unique_violation()
    )
}

fn row_to_memory(op: &str, row: &SqliteRow) -> Result<Memory> {
    let id: i64 = row.try_get("id").map_err(|err| storage_error(op, err))?;
    let user_id: String = row
        .try_get("user_id")
        .map_err(|err| storage_error(op, err))?;
    let agent_id: Option<String> = row
        .try_get("agent_id")
        .map_err(|err| storage_error(op, err))?;
    let content: String = row
        .try_get("content")
        .map_err(|err| storage_error(op, err))?;
    let embedding_blob: Vec<u8> = row
        .try_get("embedding")
        .map_err(|err| storage_error(op, err))?;
    let metadata_raw: String = row
        .try_get("metadata")
        .map_err(|err| storage_error(op, err))?;
    let created_at: i64 = row
        .try_get("created_at")
        .map_err(|err| storage_error(op, err))?;
    let updated_at: i64 = row
        .try_get("updated_at")
        .map_err(|err| storage_error(op, err))?;
    let retention_strength: f64 = row
        .try_get("retention_strength")
        .map_err(|err| storage_error(op, err))?;
    let last_accessed_at: Option<i64> = row
        .try_get("last_accessed_at")
        .map_err(|err| storage_error(op, err))?;

    Ok(Memory {
        id,
        user_id,
        agent_id,
        content,
        embedding: decode_embedding(op, &embedding_blob)?,
        sparse_embedding: None,
        metadata: decode_metadata(op, Some(metadata_raw.as_str()))?,
        created_at: decode_timestamp(op, created_at)?,
        updated_at: decode_timestamp(op, updated_at)?,
        retention_strength,
        last_accessed_at: last_accessed_at
            .map(|nanos| decode_timestamp(op, nanos))
            .transpose()?,
        score: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnema_core::Scope;
    use serde_json::{Map, json};

    fn embedding(values: &[f32]) -> Embedding {
        values.to_vec()
    }

    async fn store() -> SqliteStore {
        SqliteStore::in_memory("memories", 3).await.unwrap()
    }

    fn memory(id: i64, user: &str, content: &str, vector: &[f32]) -> Memory {
        Memory::new(id, user, content).with_embedding(embedding(vector))
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = store().await;
        let m = memory(1, "u1", "likes tea", &[1.0, 0.0, 0.0]);
        store.insert(&m).await.unwrap();

        let fetched = store.get(1, &AccessFilter::user("u1")).await.unwrap();
        assert_eq!(fetched.content, "likes tea");
        assert_eq!(fetched.embedding, m.embedding);
        assert!((fetched.retention_strength - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn tenancy_is_enforced_as_not_found() {
        let store = store().await;
        store
            .insert(&memory(1, "u1", "secret", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let err = store.get(1, &AccessFilter::user("u2")).await.unwrap_err();
        assert!(err.is_not_found());
        // The same id is visible to its owner.
        assert!(store.get(1, &AccessFilter::user("u1")).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let store = store().await;
        let m = memory(1, "u1", "first", &[1.0, 0.0, 0.0]);
        store.insert(&m).await.unwrap();
        let err = store.insert(&m).await.unwrap_err();
        assert_eq!(err.kind(), mnema_core::ErrorKind::StorageOperation);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_input() {
        let store = store().await;
        let err = store
            .insert(&memory(1, "u1", "bad", &[1.0, 0.0]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), mnema_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn search_orders_by_score_and_respects_min_score() {
        let store = store().await;
        store
            .insert(&memory(1, "u1", "exact", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(&memory(2, "u1", "near", &[0.9, 0.1, 0.0]))
            .await
            .unwrap();
        store
            .insert(&memory(3, "u1", "far", &[0.0, 1.0, 0.0]))
            .await
            .unwrap();

        let request = SearchRequest::new(embedding(&[1.0, 0.0, 0.0]), 10)
            .with_user_id("u1")
            .with_min_score(0.5);
        let results = store.search(&request).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
        for window in results.windows(2) {
            assert!(window[0].score.unwrap() >= window[1].score.unwrap());
        }
    }

    #[tokio::test]
    async fn search_applies_metadata_filters() {
        let store = store().await;
        let mut tagged = memory(1, "u1", "tagged", &[1.0, 0.0, 0.0]);
        tagged
            .metadata
            .insert("category".into(), json!("preference"));
        store.insert(&tagged).await.unwrap();
        store
            .insert(&memory(2, "u1", "untagged", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let mut filters = Map::new();
        filters.insert("category".into(), json!("preference"));
        let request = SearchRequest::new(embedding(&[1.0, 0.0, 0.0]), 10)
            .with_user_id("u1")
            .with_filters(filters);
        let results = store.search(&request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);
    }

    #[tokio::test]
    async fn scope_widens_agent_visibility() {
        let store = store().await;
        store
            .insert(
                &memory(1, "u1", "mine", &[1.0, 0.0, 0.0])
                    .with_agent_id("a1")
                    .with_scope(Scope::Private),
            )
            .await
            .unwrap();
        store
            .insert(
                &memory(2, "u1", "shared", &[1.0, 0.0, 0.0])
                    .with_agent_id("a2")
                    .with_scope(Scope::AgentGroup),
            )
            .await
            .unwrap();
        store
            .insert(
                &memory(3, "u1", "hidden", &[1.0, 0.0, 0.0])
                    .with_agent_id("a2")
                    .with_scope(Scope::Private),
            )
            .await
            .unwrap();

        let request = SearchRequest::new(embedding(&[1.0, 0.0, 0.0]), 10)
            .with_user_id("u1")
            .with_agent_id("a1");
        let results = store.search(&request).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|m| m.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert!(!ids.contains(&3));
    }

    #[tokio::test]
    async fn update_changes_content_and_updated_at() {
        let store = store().await;
        store
            .insert(&memory(1, "u1", "old", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();

        let updated = store
            .update(1, "new", &embedding(&[0.0, 1.0, 0.0]), &AccessFilter::user("u1"))
            .await
            .unwrap();
        assert_eq!(updated.content, "new");

        let fetched = store.get(1, &AccessFilter::user("u1")).await.unwrap();
        assert_eq!(fetched.content, "new");
        assert_eq!(fetched.embedding, embedding(&[0.0, 1.0, 0.0]));
        assert!(fetched.updated_at > fetched.created_at);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = store().await;
        store
            .insert(&memory(1, "u1", "gone soon", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store.delete(1, &AccessFilter::user("u1")).await.unwrap();
        assert!(store
            .get(1, &AccessFilter::user("u1"))
            .await
            .unwrap_err()
            .is_not_found());
        // Idempotence per call: deleting again reports not found.
        assert!(store
            .delete(1, &AccessFilter::user("u1"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn get_all_is_newest_first_and_paged() {
        let store = store().await;
        for id in 1..=5 {
            let mut m = memory(id, "u1", &format!("m{id}"), &[1.0, 0.0, 0.0]);
            // Distinct creation instants so ordering is observable.
            m.created_at += time::Duration::seconds(id);
            m.updated_at = m.created_at;
            store.insert(&m).await.unwrap();
        }

        let page = store
            .get_all(&ListRequest::new(2).with_user_id("u1").with_offset(1))
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn delete_all_with_empty_filter_wipes_and_is_idempotent() {
        let store = store().await;
        store
            .insert(&memory(1, "u1", "a", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(&memory(2, "u2", "b", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(store.delete_all(&AccessFilter::any()).await.unwrap(), 2);
        assert_eq!(store.delete_all(&AccessFilter::any()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_all_respects_tenancy() {
        let store = store().await;
        store
            .insert(&memory(1, "u1", "a", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store
            .insert(&memory(2, "u2", "b", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(store.delete_all(&AccessFilter::user("u1")).await.unwrap(), 1);
        assert!(store.get(2, &AccessFilter::user("u2")).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_bad_collection_name() {
        let err = SqliteStore::in_memory("bad name; drop", 3).await.unwrap_err();
        assert_eq!(err.kind(), mnema_core::ErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.db");
        let path = path.to_str().unwrap();

        let store = SqliteStore::connect(path, "memories", 3).await.unwrap();
        store
            .insert(&memory(1, "u1", "persisted", &[1.0, 0.0, 0.0]))
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = SqliteStore::connect(path, "memories", 3).await.unwrap();
        let fetched = reopened.get(1, &AccessFilter::user("u1")).await.unwrap();
        assert_eq!(fetched.content, "persisted");
    }
}
