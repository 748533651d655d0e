//! Per-session bounded conversation history.
//!
//! Each session holds at most `2 × max_turns` turns; appends past the cap
//! evict oldest-first. Sessions are created on first append and live for
//! the process lifetime.

use dashmap::DashMap;
use mathtutor_core::message::Turn;
use std::collections::VecDeque;

/// Sliding-window turn log keyed by session id.
pub struct SessionHistoryStore {
    sessions: DashMap<String, VecDeque<Turn>>,
    max_turns: usize,
}

impl SessionHistoryStore {
    /// `max_turns` counts user/assistant pairs.
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_turns,
        }
    }

    /// Maximum number of turns kept per session.
    pub fn capacity(&self) -> usize {
        self.max_turns * 2
    }

    /// Append a turn, evicting the oldest turns beyond the cap.
    pub fn append(&self, session_id: &str, turn: Turn) {
        let cap = self.capacity();
        let mut history = self.sessions.entry(session_id.to_string()).or_default();
        history.push_back(turn);
        while history.len() > cap {
            history.pop_front();
        }
    }

    /// Copy of the session's turns, oldest first.
    pub fn snapshot(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .get(session_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
