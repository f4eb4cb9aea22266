//! Built-in context provider

use crate::provider::{ContextProvider, SecurityExtension};
use async_trait::async_trait;
use tessera_core::{ProviderConfig, TesseraResult, DEFAULT_CONTEXT_HANDLER_TYPE};
use tracing::debug;

/// Leaves the authenticator attributes untouched
#[derive(Debug, Default)]
pub struct NoopContextProvider;

impl NoopContextProvider {
    pub const TYPE: &'static str = DEFAULT_CONTEXT_HANDLER_TYPE;
}

#[async_trait]
impl SecurityExtension for NoopContextProvider {
    async fn setup(&mut self, _config: &ProviderConfig) -> TesseraResult<()> {
        debug!("No-op context provider ready");
        Ok(())
    }

    async fn close(&self) -> TesseraResult<()> {
        Ok(())
    }
}

impl ContextProvider for NoopContextProvider {}
