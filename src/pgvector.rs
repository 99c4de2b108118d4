/// PostgreSQL + pgvector index
///
/// Each collection is one table:
/// `id UUID`, `content TEXT`, `embedding vector(N)`, `metadata JSONB`,
/// `created_at TIMESTAMPTZ`, with an HNSW index on `vector_cosine_ops`.
/// Similarity is `1 - (embedding <=> query)`.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::document::Chunk;
use crate::error::{PipelineError, Result};
use crate::store::{ScoredRecord, VectorIndex, VectorRecord};

/// SQLSTATEs raised when a concurrent or earlier startup already created the object
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_OBJECT: &str = "42710";
const UNIQUE_VIOLATION: &str = "23505";

pub struct PgVectorIndex {
    pool: PgPool,
}

impl PgVectorIndex {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Check if using connection pooler (pgBouncer)
        let use_pooler = database_url.contains(":6543") || database_url.contains("pgbouncer=true");

        let mut pool_options = PgPoolOptions::new().max_connections(10);

        if use_pooler {
            log::info!("Using connection pooler - disabling statement timeout");
            pool_options = pool_options.after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET statement_timeout = 0").execute(conn).await?;
                    Ok(())
                })
            });
        }

        let pool = pool_options.connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Only alphanumerics and underscores survive; "tg-store" becomes "tg_store"
    pub fn table_name(collection: &str) -> Result<String> {
        let sanitized: String = collection
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
            .collect();
        if sanitized.trim_matches('_').is_empty() {
            return Err(PipelineError::Store(format!(
                "collection name '{}' is not usable as a table name",
                collection
            )));
        }
        if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(format!("c_{}", sanitized));
        }
        Ok(sanitized)
    }

    /// Run a DDL statement, treating "already exists" as success
    async fn execute_idempotent(&self, sql: &str) -> Result<()> {
        match sqlx::query(sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if matches!(
                    db.code().as_deref(),
                    Some(DUPLICATE_TABLE) | Some(DUPLICATE_OBJECT) | Some(UNIQUE_VIOLATION)
                ) =>
            {
                log::debug!("Ignoring already-exists error: {}", db.message());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn existing_dimensions(&self, table: &str) -> Result<Option<usize>> {
        let row = sqlx::query(
            "SELECT a.atttypmod FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             WHERE c.relname = $1 AND a.attname = 'embedding' AND NOT a.attisdropped",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| r.get::<i32, _>("atttypmod"))
            .filter(|typmod| *typmod > 0)
            .map(|typmod| typmod as usize))
    }
}

fn metadata_from_json(value: serde_json::Value) -> BTreeMap<String, String> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Statements for one collection table; the name is always double-quoted so
/// reserved words like `user` or `order` stay valid identifiers
struct TableSql {
    name: String,
}

impl TableSql {
    fn for_collection(collection: &str) -> Result<Self> {
        Ok(Self {
            name: PgVectorIndex::table_name(collection)?,
        })
    }

    fn create_table(&self, dimensions: usize) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id UUID PRIMARY KEY,
                content TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            self.name, dimensions
        )
    }

    fn create_index(&self) -> String {
        format!(
            r#"CREATE INDEX IF NOT EXISTS "{0}_embedding_idx" ON "{0}" USING hnsw (embedding vector_cosine_ops)"#,
            self.name
        )
    }

    fn insert(&self) -> String {
        format!(
            r#"INSERT INTO "{}" (id, content, embedding, metadata) VALUES ($1, $2, $3, $4)"#,
            self.name
        )
    }

    fn delete(&self) -> String {
        format!(r#"DELETE FROM "{}" WHERE id = ANY($1)"#, self.name)
    }

    fn search(&self) -> String {
        format!(
            r#"
            SELECT id, content, embedding, metadata,
                   1 - (embedding <=> $1) AS score
            FROM "{}"
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
            self.name
        )
    }

    fn count(&self) -> String {
        format!(r#"SELECT COUNT(*) AS n FROM "{}""#, self.name)
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let table = TableSql::for_collection(collection)?;
        log::info!("Initializing table '{}'...", table.name);

        self.execute_idempotent("CREATE EXTENSION IF NOT EXISTS vector").await?;
        self.execute_idempotent(&table.create_table(dimensions)).await?;

        if let Some(existing) = self.existing_dimensions(&table.name).await? {
            if existing != dimensions {
                return Err(PipelineError::Store(format!(
                    "table '{}' stores {}-dimensional vectors, embedder produces {}",
                    table.name, existing, dimensions
                )));
            }
        }

        self.execute_idempotent(&table.create_index()).await?;

        log::info!("Table '{}' initialized successfully", table.name);
        Ok(())
    }

    async fn insert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let insert_query = TableSql::for_collection(collection)?.insert();

        let mut tx = self.pool.begin().await?;
        for record in records {
            let metadata_json = serde_json::to_value(&record.chunk.metadata)
                .map_err(|e| PipelineError::Store(format!("failed to serialize metadata: {}", e)))?;

            sqlx::query(&insert_query)
                .bind(record.id)
                .bind(&record.chunk.content)
                .bind(Vector::from(record.embedding))
                .bind(metadata_json)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[Uuid]) -> Result<bool> {
        let table = TableSql::for_collection(collection)?;
        let result = sqlx::query(&table.delete())
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await?;

        log::debug!("Deleted {} of {} rows from '{}'", result.rows_affected(), ids.len(), table.name);
        Ok(true)
    }

    async fn search(&self, collection: &str, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let search_query = TableSql::for_collection(collection)?.search();

        let rows = sqlx::query(&search_query)
            .bind(Vector::from(query.to_vec()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredRecord {
                score: row.get::<f64, _>("score") as f32,
                record: VectorRecord {
                    id: row.get("id"),
                    embedding: row.get::<Vector, _>("embedding").to_vec(),
                    chunk: Chunk {
                        content: row.get("content"),
                        metadata: metadata_from_json(row.get("metadata")),
                    },
                },
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let row = sqlx::query(&TableSql::for_collection(collection)?.count())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as usize)
    }
}
