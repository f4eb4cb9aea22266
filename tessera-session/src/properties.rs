//! Connection properties
//!
//! Only a closed set of keys is recognized. Keys are case-insensitive and
//! stored lower-cased; the last value for a key wins.

use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

pub const SCHEMA: &str = "schema";
pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const IMPERSONATION_TARGET: &str = "impersonation_target";

/// Recognized property names, lower case
pub const KNOWN_PROPERTIES: [&str; 4] = [SCHEMA, USER, PASSWORD, IMPERSONATION_TARGET];

#[derive(Debug, Default)]
pub struct PropertyBag {
    values: RwLock<HashMap<String, String>>,
}

impl PropertyBag {
    /// Keep the recognized properties from `raw`; unknown keys are logged and dropped
    pub fn from_raw<I, K, V>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values = HashMap::new();
        for (key, value) in raw {
            let key = key.as_ref().to_lowercase();
            if KNOWN_PROPERTIES.contains(&key.as_str()) {
                values.insert(key, value.into());
            } else {
                warn!(property = %key, "Ignoring unknown property");
            }
        }

        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&key.to_lowercase()).cloned()
    }

    /// Value for `key`, or an empty string when unset
    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    pub(crate) fn set(&self, key: &str, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_lowercase(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the stored properties; the password is left out
    pub fn snapshot(&self) -> HashMap<String, String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values
            .iter()
            .filter(|(key, _)| key.as_str() != PASSWORD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
