//! Error types for the mathtutor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error enum.

use thiserror::Error;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Stream cancelled by the caller")]
    Cancelled,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised by a [`Retriever`](crate::retrieval::Retriever).
///
/// `Clone` because a single failed lookup may be observed by several
/// callers waiting on the same cache key.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    #[error("Similarity search failed: {0}")]
    QueryFailed(String),

    #[error("Query embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid scope filter: {0}")]
    InvalidFilter(String),
}
