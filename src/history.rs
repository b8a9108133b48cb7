//! # Chat history
//!
//! Per-session conversation turns kept in memory.
//!
//! Both dimensions are bounded:
//! - each session keeps its newest `max_turns` turns in a `VecDeque`, dropping the
//!   oldest first;
//! - at most `max_sessions` sessions are tracked; recording into a new session when
//!   full evicts the least recently used one.
//!
//! ```rust
//! use climate_rag::history::ChatHistory;
//!
//! let mut history = ChatHistory::new(10, 2);
//! history.record("alice", "hi", "hello");
//! history.record("alice", "why?", "because");
//! history.record("alice", "ok", "bye");
//! let turns = history.turns("alice");
//! assert_eq!(turns.len(), 2);
//! assert_eq!(turns[0].user, "why?");
//! ```

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub user: String,
    pub bot: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Session {
    turns: VecDeque<ChatTurn>,
    last_used: u64,
}

#[derive(Debug)]
pub struct ChatHistory {
    sessions: HashMap<String, Session>,
    max_sessions: usize,
    max_turns: usize,
    // Logical clock for recency; bumped on every touch.
    clock: u64,
}

impl ChatHistory {
    /// Limits below one are raised to one.
    pub fn new(max_sessions: usize, max_turns: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions: max_sessions.max(1),
            max_turns: max_turns.max(1),
            clock: 0,
        }
    }

    pub fn record(&mut self, session_id: &str, user: &str, bot: &str) {
        self.clock += 1;
        if !self.sessions.contains_key(session_id) && self.sessions.len() >= self.max_sessions {
            self.evict_least_recent();
        }

        let session = self.sessions.entry(session_id.to_string()).or_default();
        session.last_used = self.clock;
        session.turns.push_back(ChatTurn {
            user: user.to_string(),
            bot: bot.to_string(),
            at: Utc::now(),
        });
        while session.turns.len() > self.max_turns {
            session.turns.pop_front();
        }
    }

    /// Turns for `session_id`, oldest first. Unknown sessions have none.
    pub fn turns(&self, session_id: &str) -> Vec<ChatTurn> {
        self.sessions
            .get(session_id)
            .map(|s| s.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget a session. Returns whether it existed.
    pub fn clear(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|(_, s)| s.last_used)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            debug!("Evicting chat session {}", id);
            self.sessions.remove(&id);
        }
    }
}
