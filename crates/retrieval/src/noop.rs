//! No-op retriever: tutoring without textbook grounding.

use async_trait::async_trait;
use mathtutor_core::error::RetrievalError;
use mathtutor_core::retrieval::{Passage, Retriever, SearchRequest};

/// A retriever that never finds anything.
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    fn name(&self) -> &str {
        "none"
    }

    async fn similarity_search(
        &self,
        _request: &SearchRequest,
    ) -> Result<Vec<Passage>, RetrievalError> {
        Ok(Vec::new())
    }
}
