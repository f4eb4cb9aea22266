//! Query submission front
//!
//! The query counter of a session can only be bumped with a
//! [`QueryCountIncrementer`], and the only way to obtain one is to construct
//! a [`QueryDispatcher`].

use crate::session::Session;
use tracing::debug;
use uuid::Uuid;

/// Capability to increment a session's query counter
#[derive(Debug)]
pub struct QueryCountIncrementer {
    _private: (),
}

#[derive(Debug)]
pub struct QueryDispatcher {
    incrementer: QueryCountIncrementer,
}

impl QueryDispatcher {
    pub fn new() -> Self {
        Self {
            incrementer: QueryCountIncrementer { _private: () },
        }
    }

    /// Count a new query against `session` and return its id
    pub fn submit(&self, session: &Session) -> String {
        session.increment_query_count(&self.incrementer);
        let query_id = Uuid::new_v4().to_string();
        debug!(session_id = %session.id(), query_id = %query_id, "Query submitted");
        query_id
    }
}

impl Default for QueryDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
