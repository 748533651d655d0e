//! Retrieval and conversation orchestration for mathtutor.
//!
//! For each chat request the orchestrator:
//!
//! 1. **Validates** the topic
//! 2. **Detects drift** toward another topic and redirects if found
//! 3. **Resolves** the topic's textbook scope set
//! 4. **Retrieves** passages through a single-flight cache
//! 5. **Builds** system prompt + excerpts + history + new utterance
//! 6. **Streams** the model reply, committing it to history on completion
//!
//! Only the retrieval cache and the session history outlive a request.

pub mod cache;
pub mod drift;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod prompt;
pub mod stream;
pub mod stream_event;
pub mod topics;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cache::{CacheKey, RetrievalCache};
pub use drift::DriftDetector;
pub use error::TutorError;
pub use history::SessionHistoryStore;
pub use orchestrator::{ChatReply, ChatRequest, RequestOrchestrator, TutorSettings};
pub use prompt::PromptTemplate;
pub use stream::{StreamAssembler, StreamState};
pub use stream_event::TutorStreamEvent;
pub use topics::{Topic, TopicFilterRegistry};
