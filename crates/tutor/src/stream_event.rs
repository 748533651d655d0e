//! Tutor-level streaming events.
//!
//! `TutorStreamEvent` wraps forwarded reply text into the events the
//! gateway sends over SSE.

use serde::{Deserialize, Serialize};

/// Events emitted while a reply streams:
/// - `chunk`: a fragment of the tutor's reply
/// - `done`: the reply completed and was committed to history
/// - `error`: the reply failed; nothing was committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TutorStreamEvent {
    Chunk { content: String },

    Done { session_id: String, length: usize },

    Error { message: String },
}

impl TutorStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
