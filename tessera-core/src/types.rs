//! Shared value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a connected principal.
///
/// Treated as a plain value by the rest of the system; the session only
/// guarantees it is never absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserCredentials {
    pub user_name: String,
}

impl UserCredentials {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
        }
    }
}

impl fmt::Display for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_name)
    }
}

/// Structured storage location: `scheme://root/segment/segment`.
///
/// Keeping the parts apart avoids two backends disagreeing on whether
/// `file:///tmp/x` and `/tmp/x` are the same location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoragePath {
    pub scheme: String,
    pub root: String,
    pub segments: Vec<String>,
}

impl StoragePath {
    pub fn new(scheme: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_lowercase(),
            root: root.into(),
            segments: Vec::new(),
        }
    }

    /// Local filesystem path rooted at `/`
    pub fn local() -> Self {
        Self::new("file", "")
    }

    /// Append one or more `/`-separated segments; empty segments are skipped
    pub fn join(&self, child: &str) -> Self {
        let mut joined = self.clone();
        joined.segments.extend(
            child
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        joined
    }

    /// Path component only, always starting with `/`
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.root, self.path())
    }
}
