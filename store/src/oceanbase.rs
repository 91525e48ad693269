//! OceanBase backend over the MySQL protocol.
//!
//! OceanBase deployments differ in vector-function availability, so this
//! backend keeps to plain SQL: a tenancy prefilter runs server-side and
//! cosine similarity is re-scored client-side, like the embedded backend.

use async_trait::async_trait;
use mnema_core::store::{AccessFilter, IndexSpec, ListRequest, MemoryState, SearchRequest};
use mnema_core::{Embedding, Memory, MemoryError, Result, VectorStore};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::codec::{
    check_dimension, content_hash, cosine_similarity, decode_embedding, decode_metadata,
    decode_timestamp, encode_embedding, encode_timestamp, rank_scanned,
};

/// OceanBase-backed vector store.
#[derive(Debug, Clone)]
pub struct OceanBaseStore {
    pool: MySqlPool,
    table: String,
    dimensions: usize,
}

impl OceanBaseStore {
    /// Connects to `url` (a `mysql://` DSN) and prepares the collection
    /// table.
    pub async fn connect(url: &str, collection: &str, dimensions: usize) -> Result<Self> {
        const OP: &str = "oceanbase.connect";

        let pool = MySqlPoolOptions::new()
            .connect(url)
            .await
            .map_err(|err| MemoryError::connection_failed(OP, err.to_string()).with_source(err))?;

        let table = sanitize_identifier(OP, collection)?;
        let store = Self {
            pool,
            table,
            dimensions,
        };
        store.migrate().await?;
        info!(collection = %store.table, dimensions, "oceanbase store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        const OP: &str = "oceanbase.migrate";

        let create = format!(
            "CREATE TABLE IF NOT EXISTS `{t}` (
                id BIGINT PRIMARY KEY,
                user_id VARCHAR(255) NOT NULL,
                agent_id VARCHAR(255),
                content TEXT NOT NULL,
                embedding LONGBLOB NOT NULL,
                metadata TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                retention_strength DOUBLE NOT NULL DEFAULT 1.0,
                last_accessed_at BIGINT,
                hash CHAR(32) NOT NULL,
                INDEX `idx_{t}_tenancy` (user_id, agent_id)
            )",
            t = self.table
        );
        sqlx::query(&create)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    async fn scan(&self, op: &str, user_id: Option<&str>) -> Result<Vec<Memory>> {
        let mut sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at FROM `{t}`",
            t = self.table
        );
        if user_id.is_some() {
            sql.push_str(" WHERE user_id = ?");
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

    async fn fetch_visible(&self, op: &str, id: i64, access: &AccessFilter) -> Result<Memory> {
        let sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at FROM `{t}` WHERE id = ?",
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
impl VectorStore for OceanBaseStore {
    async fn insert(&self, memory: &Memory) -> Result<()> {
        const OP: &str = "oceanbase.insert";

        check_dimension(OP, self.dimensions, memory.embedding.len())?;
        if memory.user_id.is_empty() {
            return Err(MemoryError::invalid_input(OP, "user_id must not be empty"));
        }

        let sql = format!(
            "INSERT INTO `{t}` (id, user_id, agent_id, content, embedding, metadata, \
             created_at, updated_at, retention_strength, last_accessed_at, hash) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
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
        const OP: &str = "oceanbase.search";

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
        self.fetch_visible("oceanbase.get", id, access).await
    }

    async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: &Embedding,
        access: &AccessFilter,
    ) -> Result<Memory> {
        const OP: &str = "oceanbase.update";

        check_dimension(OP, self.dimensions, embedding.len())?;
        let mut memory = self.fetch_visible(OP, id, access).await?;

        let updated_at = time::OffsetDateTime::now_utc();
        let sql = format!(
            "UPDATE `{t}` SET content = ?, embedding = ?, updated_at = ?, hash = ? WHERE id = ?",
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
        const OP: &str = "oceanbase.update_state";

        self.fetch_visible(OP, id, access).await?;
        let sql = format!(
            "UPDATE `{t}` SET retention_strength = ?, last_accessed_at = ?, metadata = ? \
             WHERE id = ?",
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
        const OP: &str = "oceanbase.delete";

        self.fetch_visible(OP, id, access).await?;
        let sql = format!("DELETE FROM `{t}` WHERE id = ?", t = self.table);
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    async fn get_all(&self, request: &ListRequest) -> Result<Vec<Memory>> {
        const OP: &str = "oceanbase.get_all";

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
        const OP: &str = "oceanbase.delete_all";

        if access.user_id.is_none() && access.agent_id.is_none() {
            let sql = format!("DELETE FROM `{t}`", t = self.table);
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

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM `{t}` WHERE id IN ({placeholders})",
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
        // No portable vector index across OceanBase versions; the tenancy
        // index is created at migration time.
        Ok(())
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
            format!("identifier {name:?} must be alphanumeric or underscore"),
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

fn row_to_memory(op: &str, row: &MySqlRow) -> Result<Memory> {
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
    let last_accessed_at: Option<i64> = row
        .try_get("last_accessed_at")
        .map_err(|err| storage_error(op, err))?;

    Ok(Memory {
        id: row.try_get("id").map_err(|err| storage_error(op, err))?,
        user_id: row
            .try_get("user_id")
            .map_err(|err| storage_error(op, err))?,
        agent_id: row
            .try_get("agent_id")
            .map_err(|err| storage_error(op, err))?,
        content: row
            .try_get("content")
            .map_err(|err| storage_error(op, err))?,
        embedding: decode_embedding(op, &embedding_blob)?,
        sparse_embedding: None,
        metadata: decode_metadata(op, Some(metadata_raw.as_str()))?,
        created_at: decode_timestamp(op, created_at)?,
        updated_at: decode_timestamp(op, updated_at)?,
        retention_strength: row
            .try_get("retention_strength")
            .map_err(|err| storage_error(op, err))?,
        last_accessed_at: last_accessed_at
            .map(|nanos| decode_timestamp(op, nanos))
            .transpose()?,
        score: None,
    })
}
