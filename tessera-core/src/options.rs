//! Option values
//!
//! The runtime option system is treated as an opaque key/value bag. Providers
//! hand back [`OptionValue`]s as supplemental session attributes and the
//! session stores them in its [`SessionOptions`] overlay.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Where an option value applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionScope {
    System,
    Session,
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionKind {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionKind::Bool(v) => write!(f, "{}", v),
            OptionKind::Long(v) => write!(f, "{}", v),
            OptionKind::Double(v) => write!(f, "{}", v),
            OptionKind::String(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionValue {
    pub scope: OptionScope,
    pub name: String,
    pub value: OptionKind,
}

impl OptionValue {
    pub fn string(scope: OptionScope, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            value: OptionKind::String(value.into()),
        }
    }

    pub fn bool(scope: OptionScope, name: impl Into<String>, value: bool) -> Self {
        Self {
            scope,
            name: name.into(),
            value: OptionKind::Bool(value),
        }
    }

    pub fn long(scope: OptionScope, name: impl Into<String>, value: i64) -> Self {
        Self {
            scope,
            name: name.into(),
            value: OptionKind::Long(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            OptionKind::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Produces the option overlay for a newly built session
pub trait OptionManagerFactory: Send + Sync {
    fn create(&self, session_id: &str) -> SessionOptions;
}

/// Process-wide option bag
#[derive(Debug, Default)]
pub struct SystemOptions {
    values: RwLock<HashMap<String, OptionValue>>,
}

impl SystemOptions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, value: OptionValue) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(value.name.to_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<OptionValue> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&name.to_lowercase()).cloned()
    }
}

impl OptionManagerFactory for Arc<SystemOptions> {
    fn create(&self, session_id: &str) -> SessionOptions {
        SessionOptions {
            session_id: session_id.to_string(),
            fallback: Some(Arc::clone(self)),
            values: RwLock::new(HashMap::new()),
        }
    }
}

/// Session-scoped overlay over the system options
#[derive(Debug)]
pub struct SessionOptions {
    session_id: String,
    fallback: Option<Arc<SystemOptions>>,
    values: RwLock<HashMap<String, OptionValue>>,
}

impl SessionOptions {
    /// Overlay with no system fallback
    pub fn standalone(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            fallback: None,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Store a value at session scope; option names are case-insensitive
    pub fn set(&self, value: OptionValue) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let value = OptionValue {
            scope: OptionScope::Session,
            ..value
        };
        values.insert(value.name.to_lowercase(), value);
    }

    pub fn apply_all(&self, options: impl IntoIterator<Item = OptionValue>) {
        for option in options {
            self.set(option);
        }
    }

    pub fn get(&self, name: &str) -> Option<OptionValue> {
        let local = {
            let values = self.values.read().unwrap_or_else(|e| e.into_inner());
            values.get(&name.to_lowercase()).cloned()
        };
        local.or_else(|| self.fallback.as_ref().and_then(|system| system.get(name)))
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
