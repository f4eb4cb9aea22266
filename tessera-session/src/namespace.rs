//! Session-scoped temporary table names
//!
//! Maps the lower-cased name a client used to a generated
//! `{session_id}/{uuid}` alias. An alias is generated at most once per
//! original name for the lifetime of the session.

use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug)]
pub struct TemporaryObjectNamespace {
    session_id: String,
    tables: DashMap<String, String>,
}

impl TemporaryObjectNamespace {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            tables: DashMap::new(),
        }
    }

    fn generate_name(&self) -> String {
        format!("{}/{}", self.session_id, Uuid::new_v4())
    }

    /// Insert-if-absent; returns whichever alias ends up stored
    pub fn register(&self, original_name: &str) -> String {
        self.tables
            .entry(original_name.to_lowercase())
            .or_insert_with(|| self.generate_name())
            .value()
            .clone()
    }

    pub fn resolve(&self, original_name: &str) -> Option<String> {
        self.tables
            .get(&original_name.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, original_name: &str) -> Option<String> {
        self.tables
            .remove(&original_name.to_lowercase())
            .map(|(_, generated)| generated)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
