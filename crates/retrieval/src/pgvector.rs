//! PostgreSQL + pgvector retriever.
//!
//! Reads the textbook passages ingested into a table shaped like
//!
//! ```sql
//! CREATE TABLE vector_store (
//!     id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
//!     content text,
//!     metadata json,
//!     embedding vector(768)
//! );
//! ```
//!
//! where `metadata` carries `file_name` and `page_number`. The query text is
//! embedded through the model provider and compared with `<=>` (cosine
//! distance); similarity is `1 - distance`.
//!
//! # Feature gate
//!
//! This module is behind the `postgres` feature flag.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::sync::Arc;
use tracing::{debug, info};

use mathtutor_core::error::RetrievalError;
use mathtutor_core::provider::{EmbeddingRequest, Provider};
use mathtutor_core::retrieval::{Passage, Retriever, SearchRequest};

use crate::filter::{self, FilterBind};

/// Similarity search over a pgvector table.
pub struct PgVectorRetriever {
    pool: PgPool,
    table: String,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
}

impl PgVectorRetriever {
    /// Connect to PostgreSQL and prepare a retriever over `table`.
    pub async fn connect(
        database_url: &str,
        table: &str,
        embedder: Arc<dyn Provider>,
        embedding_model: &str,
    ) -> Result<Self, RetrievalError> {
        check_table_name(table)?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("PostgreSQL connection failed: {e}")))?;

        info!(table = %table, "Connected to PostgreSQL vector store");
        Ok(Self {
            pool,
            table: table.to_string(),
            embedder,
            embedding_model: embedding_model.to_string(),
        })
    }

    /// Create from an existing connection pool.
    pub fn from_pool(
        pool: PgPool,
        table: &str,
        embedder: Arc<dyn Provider>,
        embedding_model: &str,
    ) -> Result<Self, RetrievalError> {
        check_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            embedder,
            embedding_model: embedding_model.to_string(),
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("provider returned no embedding".into()))
    }
}

/// The table name is spliced into SQL, so only plain identifiers pass.
fn check_table_name(table: &str) -> Result<(), RetrievalError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(RetrievalError::InvalidFilter(format!("invalid table name '{table}'")))
    }
}

/// pgvector literal: `[0.1,0.2,...]`
fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Placeholders: `$1` query vector, `$2` threshold, `$3` limit, `$4..` scope filter.
fn search_sql(table: &str, scope_clause: Option<&str>) -> String {
    let scope = scope_clause
        .map(|clause| format!(" AND {clause}"))
        .unwrap_or_default();
    format!(
        "SELECT content, \
         metadata->>'file_name' AS file_name, \
         (metadata->>'page_number')::int AS page_number \
         FROM {table} \
         WHERE embedding IS NOT NULL \
         AND 1.0 - (embedding <=> $1::vector) >= $2{scope} \
         ORDER BY embedding <=> $1::vector ASC \
         LIMIT $3"
    )
}

fn column_error(column: &str, e: sqlx::Error) -> RetrievalError {
    RetrievalError::QueryFailed(format!("Unreadable column '{column}': {e}"))
}

/// Missing metadata is tolerated; a missing `content` fails the search.
fn row_to_passage(row: &PgRow) -> Result<Passage, RetrievalError> {
    let text: String = row
        .try_get("content")
        .map_err(|e| column_error("content", e))?;
    let page: Option<i32> = row.try_get("page_number").ok().flatten();
    Ok(Passage {
        text,
        source_id: row.try_get("file_name").ok().flatten(),
        page: page.and_then(|p| u32::try_from(p).ok()),
    })
}

#[async_trait]
impl Retriever for PgVectorRetriever {
    fn name(&self) -> &str {
        "pgvector"
    }

    async fn similarity_search(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let scope_filter = filter::to_sql(&request.filter, 4)?;
        let embedding = self.embed_query(&request.query).await?;
        let sql = search_sql(&self.table, scope_filter.as_ref().map(|f| f.clause.as_str()));

        debug!(
            filter = %filter::describe(&request.filter),
            top_k = request.top_k,
            "Vector similarity search"
        );

        let mut qb = sqlx::query(&sql)
            .bind(vector_literal(&embedding))
            .bind(f64::from(request.similarity_threshold))
            .bind(request.top_k as i64);
        if let Some(scope_filter) = &scope_filter {
            for bind in &scope_filter.binds {
                qb = match bind {
                    FilterBind::Text(text) => qb.bind(text.clone()),
                    FilterBind::Page(page) => qb.bind(*page),
                };
            }
        }

        let rows = qb
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RetrievalError::QueryFailed(format!("Vector search failed: {e}")))?;

        rows.iter().map(row_to_passage).collect()
    }
}
