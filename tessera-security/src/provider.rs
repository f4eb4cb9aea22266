//! Extension point contracts
//!
//! A single resolved instance of each provider is shared by every session for
//! the lifetime of the process, so implementations must tolerate concurrent
//! `authenticate` / `load` calls.

use async_trait::async_trait;
use tessera_core::{OptionValue, ProviderConfig, TesseraResult};

/// Lifecycle shared by every security extension
#[async_trait]
pub trait SecurityExtension: Send + Sync {
    /// One-time initialization from process configuration.
    ///
    /// Fails with `ProviderStartup` when a required client or resource
    /// cannot be created.
    async fn setup(&mut self, config: &ProviderConfig) -> TesseraResult<()>;

    /// Release any held connections. Having nothing to release is not an error.
    async fn close(&self) -> TesseraResult<()>;
}

/// Validates credentials against an external identity system
#[async_trait]
pub trait AuthenticationProvider: SecurityExtension {
    /// Authenticate `user` and return supplemental session attributes.
    ///
    /// Every failure surfaces as `AuthenticationFailed { user }`; the reason
    /// is logged on the server only.
    async fn authenticate(&self, user: &str, password: &str) -> TesseraResult<Vec<OptionValue>>;
}

/// Enriches an authenticated session with attributes from an external system
#[async_trait]
pub trait ContextProvider: SecurityExtension {
    /// Fetch context for `session_id` and apply it to `attributes`, which
    /// holds what the authenticator returned. Fails with `ContextLoad`.
    async fn load(&self, _attributes: &mut Vec<OptionValue>, _session_id: &str) -> TesseraResult<()> {
        Ok(())
    }
}
