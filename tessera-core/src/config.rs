//! Server configuration

use crate::error::{ErrorContext, TesseraError, TesseraResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Type tag of the built-in no-op context provider
pub const DEFAULT_CONTEXT_HANDLER_TYPE: &str = "default";

/// Top-level configuration consumed by the session and security crates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub security: SecurityConfig,
    pub temporary: TemporaryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub context_load_policy: ContextLoadPolicy,
    pub missing_session_token_policy: MissingSessionTokenPolicy,
    pub authenticator: ExtensionSelection,
    pub context_handler: ExtensionSelection,
    pub custom_authenticator: CustomAuthenticatorConfig,
    /// Free-form settings for third-party providers
    pub extra: HashMap<String, String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            context_load_policy: ContextLoadPolicy::default(),
            missing_session_token_policy: MissingSessionTokenPolicy::default(),
            authenticator: ExtensionSelection::default(),
            context_handler: ExtensionSelection {
                type_tag: DEFAULT_CONTEXT_HANDLER_TYPE.to_string(),
            },
            custom_authenticator: CustomAuthenticatorConfig::default(),
            extra: HashMap::new(),
        }
    }
}

/// Selects one implementation of an extension point by type tag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionSelection {
    #[serde(rename = "type", default)]
    pub type_tag: String,
}

/// Settings of the HTTP reference authenticator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomAuthenticatorConfig {
    pub protocol: String,
    pub url: String,
    pub user_header: String,
    pub password_header: String,
    pub session_id_header: String,
    pub timeout_seconds: u64,
}

impl Default for CustomAuthenticatorConfig {
    fn default() -> Self {
        Self {
            protocol: "http://".to_string(),
            url: String::new(),
            user_header: "X-User".to_string(),
            password_header: "X-Password".to_string(),
            session_id_header: "X-Session-Id".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// What to do when the context provider fails to load session context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextLoadPolicy {
    /// Reject the connection
    #[default]
    Fail,
    /// Log a warning and continue with the unenriched session
    Warn,
}

/// What to do when an authenticator succeeds without returning a session token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSessionTokenPolicy {
    /// Succeed with no supplemental attributes
    #[default]
    Accept,
    /// Treat as an authentication failure
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporaryConfig {
    /// Dotted name of the schema where temporary tables live
    pub workspace: String,
}

impl Default for TemporaryConfig {
    fn default() -> Self {
        Self {
            workspace: "dfs.tmp".to_string(),
        }
    }
}

impl TemporaryConfig {
    /// Case-insensitive check of a full schema name against the temporary workspace
    pub fn is_temporary_workspace(&self, full_schema_name: &str) -> bool {
        !self.workspace.is_empty() && self.workspace.eq_ignore_ascii_case(full_schema_name)
    }
}

/// Read-only configuration handle passed to providers during `setup`
pub type ProviderConfig = Arc<ServerConfig>;

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> TesseraResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TesseraError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> TesseraResult<Self> {
        let config: ServerConfig = toml::from_str(content).map_err(|e| TesseraError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> TesseraResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TesseraError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| TesseraError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> TesseraResult<()> {
        if self.temporary.workspace.trim().is_empty() {
            return Err(TesseraError::Config {
                message: "temporary.workspace must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set temporary.workspace to a writable schema, e.g. dfs.tmp"),
            });
        }

        if self.security.custom_authenticator.timeout_seconds == 0 {
            return Err(TesseraError::Config {
                message: "custom_authenticator.timeout_seconds must be greater than 0"
                    .to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set a positive request timeout"),
            });
        }

        Ok(())
    }

    pub fn into_provider_config(self) -> ProviderConfig {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_select_noop_context_handler() {
        let config = ServerConfig::default();
        assert_eq!(config.security.authenticator.type_tag, "");
        assert_eq!(config.security.context_handler.type_tag, "default");
        assert_eq!(config.security.context_load_policy, ContextLoadPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parses_security_section() {
        let config = ServerConfig::from_toml_str(
            r#"
            [security]
            context_load_policy = "warn"
            missing_session_token_policy = "reject"

            [security.authenticator]
            type = "customAuthenticator"

            [security.custom_authenticator]
            protocol = "https://"
            url = "auth.internal/login"

            [security.extra]
            ldap_url = "ldap://directory"

            [temporary]
            workspace = "dfs.scratch"
            "#,
        )
        .unwrap();

        assert_eq!(config.security.authenticator.type_tag, "customAuthenticator");
        assert_eq!(config.security.context_handler.type_tag, "default");
        assert_eq!(config.security.context_load_policy, ContextLoadPolicy::Warn);
        assert_eq!(
            config.security.missing_session_token_policy,
            MissingSessionTokenPolicy::Reject
        );
        assert_eq!(config.security.custom_authenticator.user_header, "X-User");
        assert_eq!(config.security.extra["ldap_url"], "ldap://directory");
        assert!(config.temporary.is_temporary_workspace("DFS.Scratch"));
        assert!(!config.temporary.is_temporary_workspace("dfs.tmp"));
    }

    #[test]
    fn test_rejects_empty_workspace() {
        let result = ServerConfig::from_toml_str("[temporary]\nworkspace = \"  \"\n");
        assert!(matches!(result, Err(TesseraError::Config { .. })));
    }

    #[test]
    fn test_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessera.toml");
        let mut config = ServerConfig::default();
        config.security.authenticator.type_tag = "customAuthenticator".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = ServerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.security.authenticator.type_tag, "customAuthenticator");
    }
}
