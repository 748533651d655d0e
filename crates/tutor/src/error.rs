//! Errors raised while preparing a tutoring reply.
//!
//! None of these reach the student verbatim: the orchestrator turns them
//! into fixed user-facing messages and logs the cause.

use mathtutor_core::error::{ProviderError, RetrievalError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    /// The request is unusable as given (e.g. blank topic).
    #[error("{0}")]
    Validation(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Model request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Prompt template error: {0}")]
    Prompt(String),
}
