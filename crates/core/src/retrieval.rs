//! Retriever trait: the abstraction over the vector-store collaborator.
//!
//! Retrieval is a similarity search scoped by a set of [`DocumentScope`]s.
//! Scopes are combined disjunctively; an empty set means "no restriction".
//! Ranking and scoring are entirely the backend's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// One clause of a retrieval filter: a source file and an inclusive page range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentScope {
    /// Source document identifier (the ingested file name)
    pub source_id: String,
    /// First page in scope
    pub page_min: u32,
    /// Last page in scope (inclusive)
    pub page_max: u32,
}

impl DocumentScope {
    pub fn new(source_id: impl Into<String>, page_min: u32, page_max: u32) -> Self {
        Self {
            source_id: source_id.into(),
            page_min,
            page_max,
        }
    }

    /// Whether a passage from `source_id` at `page` falls inside this scope.
    pub fn contains(&self, source_id: &str, page: u32) -> bool {
        self.source_id == source_id && (self.page_min..=self.page_max).contains(&page)
    }
}

/// Evaluate a disjunctive scope set against passage metadata.
///
/// An empty set admits everything. Passages without metadata are only
/// admitted by an empty set.
pub fn scope_admits(scopes: &[DocumentScope], source_id: Option<&str>, page: Option<u32>) -> bool {
    if scopes.is_empty() {
        return true;
    }
    match (source_id, page) {
        (Some(source), Some(page)) => scopes.iter().any(|s| s.contains(source, page)),
        _ => false,
    }
}

/// A retrieved document fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// The fragment text
    pub text: String,

    /// Source document, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Page number, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Passage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: None,
            page: None,
        }
    }

    pub fn located(text: impl Into<String>, source_id: impl Into<String>, page: u32) -> Self {
        Self {
            text: text.into(),
            source_id: Some(source_id.into()),
            page: Some(page),
        }
    }
}

/// A similarity search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// The query text
    pub query: String,

    /// Maximum number of passages
    pub top_k: usize,

    /// Minimum similarity in [0, 1]
    pub similarity_threshold: f32,

    /// Disjunctive scope filter; empty = unrestricted
    #[serde(default)]
    pub filter: Vec<DocumentScope>,
}

/// The core Retriever trait.
///
/// Implementations: pgvector, in-memory (for testing and demos), none (no-op).
/// May return an empty list; may fail on transport errors.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// The backend name (e.g., "pgvector", "in_memory", "none").
    fn name(&self) -> &str;

    /// Run a scoped similarity search.
    async fn similarity_search(&self, request: &SearchRequest)
    -> Result<Vec<Passage>, RetrievalError>;
}
