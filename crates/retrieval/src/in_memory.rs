//! In-memory retriever: useful for testing and offline demos.
//!
//! Scores passages by keyword overlap: the share of distinct query terms
//! (three or more characters) that also appear in the passage. Scores are
//! in [0, 1] so the similarity threshold keeps its meaning.

use async_trait::async_trait;
use mathtutor_core::error::RetrievalError;
use mathtutor_core::retrieval::{scope_admits, Passage, Retriever, SearchRequest};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A retriever over passages held in a Vec.
pub struct InMemoryRetriever {
    passages: Arc<RwLock<Vec<Passage>>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::from_passages(Vec::new())
    }

    pub fn from_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages: Arc::new(RwLock::new(passages)),
        }
    }

    /// Load a JSON array of passages (`{"text", "source_id", "page"}`).
    pub async fn load_json(path: &Path) -> Result<Self, RetrievalError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            RetrievalError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let passages: Vec<Passage> = serde_json::from_str(&raw).map_err(|e| {
            RetrievalError::Unavailable(format!("invalid corpus {}: {e}", path.display()))
        })?;
        Ok(Self::from_passages(passages))
    }

    pub async fn add(&self, passage: Passage) {
        self.passages.write().await.push(passage);
    }

    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Share of query terms present in `text`.
pub fn keyword_score(query_terms: &HashSet<String>, text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let passage_terms = terms(text);
    let hits = query_terms.iter().filter(|t| passage_terms.contains(*t)).count();
    hits as f32 / query_terms.len() as f32
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn similarity_search(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let passages = self.passages.read().await;
        let query_terms = terms(&request.query);

        let mut scored: Vec<(f32, &Passage)> = passages
            .iter()
            .filter(|p| scope_admits(&request.filter, p.source_id.as_deref(), p.page))
            .map(|p| (keyword_score(&query_terms, &p.text), p))
            .filter(|(score, _)| *score > 0.0 && *score >= request.similarity_threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(request.top_k);

        Ok(scored.into_iter().map(|(_, p)| p.clone()).collect())
    }
}
