//! Retrieval backends for mathtutor.

pub mod filter;
pub mod in_memory;
pub mod noop;

#[cfg(feature = "postgres")]
pub mod pgvector;

pub use filter::{FilterBind, SqlFilter};
pub use in_memory::InMemoryRetriever;
pub use noop::NoopRetriever;

#[cfg(feature = "postgres")]
pub use pgvector::PgVectorRetriever;

use mathtutor_config::RetrievalConfig;
use mathtutor_core::error::RetrievalError;
use mathtutor_core::provider::Provider;
use mathtutor_core::retrieval::Retriever;
use std::sync::Arc;
use tracing::info;

/// Build the configured retrieval backend.
///
/// `embedder` is only used by backends that embed the query text.
pub async fn build_from_config(
    config: &RetrievalConfig,
    embedder: Arc<dyn Provider>,
) -> Result<Arc<dyn Retriever>, RetrievalError> {
    let retriever: Arc<dyn Retriever> = match config.backend.as_str() {
        "none" => Arc::new(NoopRetriever),
        "in_memory" => match &config.corpus_path {
            Some(path) => Arc::new(InMemoryRetriever::load_json(path).await?),
            None => Arc::new(InMemoryRetriever::new()),
        },
        #[cfg(feature = "postgres")]
        "postgres" | "pgvector" => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                RetrievalError::Unavailable("retrieval.database_url is not set".into())
            })?;
            Arc::new(
                PgVectorRetriever::connect(url, &config.table, embedder, &config.embedding_model)
                    .await?,
            )
        }
        other => {
            let _ = embedder;
            return Err(RetrievalError::Unavailable(format!(
                "unknown retrieval backend '{other}'"
            )));
        }
    };

    info!(backend = retriever.name(), "Retrieval backend ready");
    Ok(retriever)
}
