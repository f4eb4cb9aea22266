//! Unified error handling system
//!
//! Provides the error taxonomy shared by the security and session crates, with
//! structured context for debugging and a recoverability classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, warn};

pub type TesseraResult<T> = Result<T, TesseraError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Which extension point a registry lookup was resolving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionKind {
    Authenticator,
    ContextHandler,
}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionKind::Authenticator => write!(f, "authenticator"),
            ExtensionKind::ContextHandler => write!(f, "context handler"),
        }
    }
}

/// Main error type for Tessera
#[derive(Error, Debug)]
pub enum TesseraError {
    /// Caller-visible text is identical for every failure reason of a given user.
    #[error("Authentication of '{user}' failed.")]
    AuthenticationFailed { user: String, context: ErrorContext },

    #[error("Failed to resolve {kind} implementation for type '{type_tag}': {message}")]
    SecurityExtensionResolution {
        kind: ExtensionKind,
        type_tag: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Provider startup error: {message}")]
    ProviderStartup {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Context load error for session {session_id}: {message}")]
    ContextLoad {
        session_id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Schema [{path}] is not valid with respect to either root schema or current default schema")]
    SchemaResolution { path: String, context: ErrorContext },

    #[error("Unauthorized operation: {message}")]
    UnauthorizedOperation {
        message: String,
        context: ErrorContext,
    },

    #[error("Temporary location should exist [{path}]")]
    StorageProvisioning {
        path: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TesseraError {
    /// Build the uniform authentication failure for `user`
    pub fn authentication_failed(user: &str, component: &str) -> Self {
        TesseraError::AuthenticationFailed {
            user: user.to_string(),
            context: ErrorContext::new(component)
                .with_operation("authenticate")
                .with_suggestion("Retry with different credentials"),
        }
    }

    pub fn unauthorized(message: impl Into<String>, component: &str) -> Self {
        TesseraError::UnauthorizedOperation {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn provider_startup(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        component: &str,
    ) -> Self {
        TesseraError::ProviderStartup {
            message: message.into(),
            source,
            context: ErrorContext::new(component)
                .with_operation("setup")
                .with_suggestion("Check the provider section of the server configuration"),
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            TesseraError::AuthenticationFailed { context, .. } => Some(context),
            TesseraError::SecurityExtensionResolution { context, .. } => Some(context),
            TesseraError::ProviderStartup { context, .. } => Some(context),
            TesseraError::ContextLoad { context, .. } => Some(context),
            TesseraError::SchemaResolution { context, .. } => Some(context),
            TesseraError::UnauthorizedOperation { context, .. } => Some(context),
            TesseraError::StorageProvisioning { context, .. } => Some(context),
            TesseraError::Storage { context, .. } => Some(context),
            TesseraError::Config { context, .. } => Some(context),
            TesseraError::Validation { context, .. } => Some(context),
            TesseraError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if the caller can keep serving after this error.
    ///
    /// Resolution and startup failures happen at server startup and leave the
    /// server without a usable authenticator, so they are never recoverable.
    /// `ContextLoad` depends on the configured policy and is reported as fatal
    /// for the connection here.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TesseraError::AuthenticationFailed { .. } => true,
            TesseraError::SchemaResolution { .. } => true,
            TesseraError::UnauthorizedOperation { .. } => true,
            TesseraError::StorageProvisioning { .. } => true,
            TesseraError::Storage { .. } => true,
            TesseraError::SecurityExtensionResolution { .. } => false,
            TesseraError::ProviderStartup { .. } => false,
            TesseraError::ContextLoad { .. } => false,
            TesseraError::Config { .. } => false,
            TesseraError::Validation { .. } => false,
            _ => false,
        }
    }

    /// Check if this error should prevent the server from starting
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            TesseraError::SecurityExtensionResolution { .. }
                | TesseraError::ProviderStartup { .. }
                | TesseraError::Config { .. }
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            TesseraError::SecurityExtensionResolution { .. }
            | TesseraError::ProviderStartup { .. }
            | TesseraError::Internal { .. } => {
                error!(error_id = ?error_id, error = %self, "Fatal error occurred");
            }
            TesseraError::Config { .. } | TesseraError::Validation { .. } => {
                error!(
                    error_id = ?error_id,
                    error = %self,
                    "Configuration or validation error"
                );
            }
            TesseraError::AuthenticationFailed { .. }
            | TesseraError::UnauthorizedOperation { .. }
            | TesseraError::SchemaResolution { .. } => {
                warn!(error_id = ?error_id, error = %self, "Request rejected");
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::TesseraError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your server configuration file"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::TesseraError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your server configuration file"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::TesseraError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::TesseraError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::TesseraError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}
