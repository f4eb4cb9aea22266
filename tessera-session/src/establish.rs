//! Connect-time orchestration
//!
//! Builds the session for a new connection, authenticates it, and enriches it
//! with external context before it serves any query.

use crate::impersonation::ImpersonationAuthority;
use crate::properties::{PASSWORD, USER};
use crate::session::{Session, SessionConfig};
use std::sync::Arc;
use tessera_core::{
    ContextLoadPolicy, ErrorContext, OptionValue, ProviderConfig, TesseraError, TesseraResult,
};
use tessera_security::{AuthenticationProvider, ContextProvider, SecurityExtensionRegistry};
use tracing::{info, warn, Instrument, Span};

pub struct SessionEstablisher {
    authenticator: Arc<dyn AuthenticationProvider>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    context_load_policy: ContextLoadPolicy,
    impersonation: Option<Arc<ImpersonationAuthority>>,
    span: Span,
}

impl SessionEstablisher {
    pub fn new(
        authenticator: Arc<dyn AuthenticationProvider>,
        context_provider: Option<Arc<dyn ContextProvider>>,
        context_load_policy: ContextLoadPolicy,
        parent: &Span,
    ) -> Self {
        Self {
            authenticator,
            context_provider,
            context_load_policy,
            impersonation: None,
            span: tracing::info_span!(parent: parent, "session_establisher"),
        }
    }

    /// Sessions built from now on accept credential replacement from `authority`
    pub fn with_impersonation_authority(mut self, authority: Arc<ImpersonationAuthority>) -> Self {
        self.impersonation = Some(authority);
        self
    }

    /// Use the providers resolved by `registry` for `config`.
    ///
    /// Resolution failures are returned as is; they should stop the server.
    pub async fn from_registry(
        registry: &SecurityExtensionRegistry,
        config: &ProviderConfig,
        parent: &Span,
    ) -> TesseraResult<Self> {
        let authenticator = registry.authenticator(config).await?;
        let context_provider = registry.context_provider(config).await?;
        Ok(Self::new(
            authenticator,
            Some(context_provider),
            config.security.context_load_policy,
            parent,
        ))
    }

    /// Build, authenticate, and enrich a session.
    ///
    /// The user name comes from the `user` property, falling back to the
    /// connection credentials. When an impersonation authority is set and the
    /// `impersonation_target` property is present, the session switches to
    /// the target user once authenticated.
    pub async fn establish(&self, mut config: SessionConfig) -> TesseraResult<Session> {
        if let Some(authority) = &self.impersonation {
            config.impersonation_authority = Some(authority.id());
        }
        let session = Session::build(config)?;
        let user = session
            .property(USER)
            .unwrap_or_else(|| session.credentials().user_name);
        let password = session.property(PASSWORD).unwrap_or_default();

        let attributes = self
            .authenticator
            .authenticate(&user, &password)
            .instrument(self.span.clone())
            .await?;
        let attributes = self.load_context(attributes, session.id()).await?;

        let applied = attributes.len();
        session.options().apply_all(attributes);

        if let Some(authority) = &self.impersonation {
            authority.replace_session_user(&session)?;
        }

        let _guard = self.span.enter();
        info!(session_id = %session.id(), user = %user, attributes = applied, "Session established");
        Ok(session)
    }

    async fn load_context(
        &self,
        attributes: Vec<OptionValue>,
        session_id: &str,
    ) -> TesseraResult<Vec<OptionValue>> {
        let Some(context_provider) = &self.context_provider else {
            return Ok(attributes);
        };

        let mut enriched = attributes.clone();
        let result = context_provider
            .load(&mut enriched, session_id)
            .instrument(self.span.clone())
            .await;

        match (result, self.context_load_policy) {
            (Ok(()), _) => Ok(enriched),
            (Err(e), ContextLoadPolicy::Fail) => Err(Self::context_load_error(e, session_id)),
            (Err(e), ContextLoadPolicy::Warn) => {
                let _guard = self.span.enter();
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Context load failed; continuing with authentication attributes only"
                );
                Ok(attributes)
            }
        }
    }

    fn context_load_error(error: TesseraError, session_id: &str) -> TesseraError {
        match error {
            TesseraError::ContextLoad { .. } => error,
            other => TesseraError::ContextLoad {
                session_id: session_id.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
                context: ErrorContext::new("session_establisher").with_operation("load_context"),
            },
        }
    }

    /// Release provider resources; close failures are logged
    pub async fn shutdown(&self) {
        async {
            if let Err(e) = self.authenticator.close().await {
                warn!(error = %e, "Failed to close authenticator");
            }
            if let Some(context_provider) = &self.context_provider {
                if let Err(e) = context_provider.close().await {
                    warn!(error = %e, "Failed to close context provider");
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
