//! Postgres backend over the pgvector extension.
//!
//! Similarity, tenancy, scope, metadata filters, ordering, and paging all
//! run server-side; cosine similarity is `1 - (embedding <=> query)`.

use async_trait::async_trait;
use mnema_core::store::{AccessFilter, IndexSpec, ListRequest, MemoryState, SearchRequest};
use mnema_core::{Embedding, Memory, MemoryError, Result, VectorStore};
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::codec::{check_dimension, content_hash};

/// Postgres-backed vector store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    table: String,
    dimensions: usize,
}

impl PostgresStore {
    /// Connects to `url` and prepares the collection table.
    pub async fn connect(url: &str, collection: &str, dimensions: usize) -> Result<Self> {
        const OP: &str = "postgres.connect";

        let pool = PgPoolOptions::new()
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
        info!(collection = %store.table, dimensions, "postgres store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        const OP: &str = "postgres.migrate";

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;

        let create = format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (
                id BIGINT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_id TEXT,
                content TEXT NOT NULL,
                embedding vector({d}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                retention_strength DOUBLE PRECISION NOT NULL DEFAULT 1.0,
                last_accessed_at TIMESTAMPTZ,
                hash TEXT NOT NULL
            )",
            t = self.table,
            d = self.dimensions
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

    async fn fetch_visible(&self, op: &str, id: i64, access: &AccessFilter) -> Result<Memory> {
        let sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at FROM \"{t}\" WHERE id = $1",
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

/// Shared tenancy predicate: rows of the requested agent, plus shared-scope
/// rows of sibling agents. Placeholders `$u` and `$a` are caller-numbered.
fn tenancy_clause(user_placeholder: usize, agent_placeholder: usize) -> String {
    format!(
        "(${u}::text IS NULL OR user_id = ${u}) AND \
         (${a}::text IS NULL OR agent_id = ${a} OR \
          metadata->>'scope' IN ('agent_group', 'global'))",
        u = user_placeholder,
        a = agent_placeholder
    )
}

#[async_trait]
impl VectorStore for PostgresStore {
    async fn insert(&self, memory: &Memory) -> Result<()> {
        const OP: &str = "postgres.insert";

        check_dimension(OP, self.dimensions, memory.embedding.len())?;
        if memory.user_id.is_empty() {
            return Err(MemoryError::invalid_input(OP, "user_id must not be empty"));
        }

        let sql = format!(
            "INSERT INTO \"{t}\" (id, user_id, agent_id, content, embedding, metadata, \
             created_at, updated_at, retention_strength, last_accessed_at, hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            t = self.table
        );
        let result = sqlx::query(&sql)
            .bind(memory.id)
            .bind(&memory.user_id)
            .bind(memory.agent_id.as_deref())
            .bind(&memory.content)
            .bind(Vector::from(memory.embedding.clone()))
            .bind(serde_json::Value::Object(memory.metadata.clone()))
            .bind(memory.created_at)
            .bind(memory.updated_at)
            .bind(memory.retention_strength)
            .bind(memory.last_accessed_at)
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
        const OP: &str = "postgres.search";

        check_dimension(OP, self.dimensions, request.embedding.len())?;

        let sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at, \
             1 - (embedding <=> $1) AS score \
             FROM \"{t}\" \
             WHERE {tenancy} AND metadata @> $4::jsonb AND 1 - (embedding <=> $1) >= $5 \
             ORDER BY score DESC, id DESC LIMIT $6",
            t = self.table,
            tenancy = tenancy_clause(2, 3)
        );

        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(&sql)
            .bind(Vector::from(request.embedding.clone()))
            .bind(request.user_id.as_deref())
            .bind(request.agent_id.as_deref())
            .bind(serde_json::Value::Object(request.filters.clone()))
            .bind(request.min_score)
            .bind(request.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;

        rows.iter()
            .map(|row| {
                let mut memory = row_to_memory(OP, row)?;
                memory.score = Some(row.try_get("score").map_err(|err| storage_error(OP, err))?);
                Ok(memory)
            })
            .collect()
    }

    async fn get(&self, id: i64, access: &AccessFilter) -> Result<Memory> {
        self.fetch_visible("postgres.get", id, access).await
    }

    async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: &Embedding,
        access: &AccessFilter,
    ) -> Result<Memory> {
        const OP: &str = "postgres.update";

        check_dimension(OP, self.dimensions, embedding.len())?;
        let mut memory = self.fetch_visible(OP, id, access).await?;

        let updated_at = time::OffsetDateTime::now_utc();
        let sql = format!(
            "UPDATE \"{t}\" SET content = $1, embedding = $2, updated_at = $3, hash = $4 \
             WHERE id = $5",
            t = self.table
        );
        sqlx::query(&sql)
            .bind(content)
            .bind(Vector::from(embedding.clone()))
            .bind(updated_at)
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
        const OP: &str = "postgres.update_state";

        self.fetch_visible(OP, id, access).await?;
        let sql = format!(
            "UPDATE \"{t}\" SET retention_strength = $1, last_accessed_at = $2, metadata = $3 \
             WHERE id = $4",
            t = self.table
        );
        sqlx::query(&sql)
            .bind(state.retention_strength)
            .bind(state.last_accessed_at)
            .bind(serde_json::Value::Object(state.metadata.clone()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    async fn delete(&self, id: i64, access: &AccessFilter) -> Result<()> {
        const OP: &str = "postgres.delete";

        self.fetch_visible(OP, id, access).await?;
        let sql = format!("DELETE FROM \"{t}\" WHERE id = $1", t = self.table);
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(())
    }

    async fn get_all(&self, request: &ListRequest) -> Result<Vec<Memory>> {
        const OP: &str = "postgres.get_all";

        let sql = format!(
            "SELECT id, user_id, agent_id, content, embedding, metadata, created_at, \
             updated_at, retention_strength, last_accessed_at \
             FROM \"{t}\" WHERE {tenancy} \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            t = self.table,
            tenancy = tenancy_clause(1, 2)
        );

        #[allow(clippy::cast_possible_wrap)]
        let rows = sqlx::query(&sql)
            .bind(request.user_id.as_deref())
            .bind(request.agent_id.as_deref())
            .bind(request.limit as i64)
            .bind(request.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;

        rows.iter().map(|row| row_to_memory(OP, row)).collect()
    }

    async fn delete_all(&self, access: &AccessFilter) -> Result<u64> {
        const OP: &str = "postgres.delete_all";

        let sql = format!(
            "DELETE FROM \"{t}\" WHERE {tenancy}",
            t = self.table,
            tenancy = tenancy_clause(1, 2)
        );
        let result = sqlx::query(&sql)
            .bind(access.user_id.as_deref())
            .bind(access.agent_id.as_deref())
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
        Ok(result.rows_affected())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        const OP: &str = "postgres.create_index";

        let lists = spec
            .parameters
            .get("lists")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(100);
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("idx_{}_embedding", self.table));
        let name = sanitize_identifier(OP, &name)?;

        let sql = format!(
            "CREATE INDEX IF NOT EXISTS \"{name}\" ON \"{t}\" \
             USING ivfflat (embedding vector_cosine_ops) WITH (lists = {lists})",
            t = self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|err| storage_error(OP, err))?;
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

fn row_to_memory(op: &str, row: &PgRow) -> Result<Memory> {
    let embedding: Vector = row
        .try_get("embedding")
        .map_err(|err| storage_error(op, err))?;
    let metadata: serde_json::Value = row
        .try_get("metadata")
        .map_err(|err| storage_error(op, err))?;
    let metadata = match metadata {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(MemoryError::storage(op, "metadata column is not an object"));
        }
    };

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
        embedding: embedding.into(),
        sparse_embedding: None,
        metadata,
        created_at: row
            .try_get("created_at")
            .map_err(|err| storage_error(op, err))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|err| storage_error(op, err))?,
        retention_strength: row
            .try_get("retention_strength")
            .map_err(|err| storage_error(op, err))?,
        last_accessed_at: row
            .try_get("last_accessed_at")
            .map_err(|err| storage_error(op, err))?,
        score: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenancy_clause_numbers_placeholders() {
        let clause = tenancy_clause(2, 3);
        assert!(clause.contains("$2::text IS NULL OR user_id = $2"));
        assert!(clause.contains("$3::text IS NULL OR agent_id = $3"));
        assert!(clause.contains("'agent_group'"));
    }

    #[test]
    fn identifier_sanitizer_rejects_injection() {
        assert!(sanitize_identifier("test", "memories_v2").is_ok());
        assert!(sanitize_identifier("test", "x; DROP TABLE y").is_err());
        assert!(sanitize_identifier("test", "").is_err());
    }
}
