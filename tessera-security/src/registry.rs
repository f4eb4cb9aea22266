//! Security extension registry
//!
//! Implementations are registered up front as named factory functions tagged
//! with a type string. At startup the configured tag picks exactly one of
//! them, which is constructed, set up, and then kept for the life of the
//! process.

use crate::context::NoopContextProvider;
use crate::http_authenticator::CustomHttpAuthenticator;
use crate::provider::{AuthenticationProvider, ContextProvider, SecurityExtension};
use std::sync::Arc;
use tessera_core::{ErrorContext, ExtensionKind, ProviderConfig, TesseraError, TesseraResult};
use tokio::sync::OnceCell;
use tracing::{error, info, warn, Instrument, Span};

const COMPONENT: &str = "security_registry";

/// A registered implementation of one extension point.
///
/// `type_tag` and `factory` are optional so that incomplete registrations can
/// be reported and skipped instead of failing the whole registry.
pub struct ProviderCandidate<T: ?Sized> {
    pub name: String,
    pub type_tag: Option<String>,
    pub factory: Option<fn() -> Box<T>>,
}

impl<T: ?Sized> ProviderCandidate<T> {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>, factory: fn() -> Box<T>) -> Self {
        Self {
            name: name.into(),
            type_tag: Some(type_tag.into()),
            factory: Some(factory),
        }
    }
}

impl<T: ?Sized> Clone for ProviderCandidate<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            type_tag: self.type_tag.clone(),
            factory: self.factory,
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ProviderCandidate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCandidate")
            .field("name", &self.name)
            .field("type_tag", &self.type_tag)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

pub type AuthenticatorCandidate = ProviderCandidate<dyn AuthenticationProvider>;
pub type ContextProviderCandidate = ProviderCandidate<dyn ContextProvider>;

fn resolution_error(
    kind: ExtensionKind,
    type_tag: &str,
    message: String,
    source: Option<TesseraError>,
) -> TesseraError {
    error!(kind = %kind, type_tag = type_tag, "{}", message);
    TesseraError::SecurityExtensionResolution {
        kind,
        type_tag: type_tag.to_string(),
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        context: ErrorContext::new(COMPONENT)
            .with_operation("resolve")
            .with_metadata("kind", &kind.to_string())
            .with_suggestion("Check the configured type tag against the registered providers"),
    }
}

/// Pick the candidate whose tag matches `type_tag` (case-insensitive),
/// construct it, and run `setup`.
///
/// Candidates without a tag or a factory are skipped with a warning. An empty
/// tag, no match, more than one match, or a failing `setup` is an error.
pub async fn resolve<T>(
    kind: ExtensionKind,
    type_tag: &str,
    candidates: &[ProviderCandidate<T>],
    config: &ProviderConfig,
) -> TesseraResult<Arc<T>>
where
    T: SecurityExtension + ?Sized,
{
    if type_tag.trim().is_empty() {
        return Err(resolution_error(
            kind,
            type_tag,
            format!("No {} type configured", kind),
            None,
        ));
    }

    let mut matches = Vec::new();
    for candidate in candidates {
        let tag = match candidate.type_tag.as_deref() {
            Some(tag) if !tag.trim().is_empty() => tag,
            _ => {
                warn!(candidate = %candidate.name, kind = %kind, "Candidate has no type tag. Skipping.");
                continue;
            }
        };

        if !tag.eq_ignore_ascii_case(type_tag) {
            continue;
        }

        match candidate.factory {
            Some(factory) => matches.push((candidate.name.as_str(), factory)),
            None => {
                warn!(
                    candidate = %candidate.name,
                    kind = %kind,
                    "Candidate has no zero-argument constructor. Skipping."
                );
            }
        }
    }

    let (name, factory) = match matches.as_slice() {
        [] => {
            return Err(resolution_error(
                kind,
                type_tag,
                format!("Failed to find the {} implementation for type '{}'", kind, type_tag),
                None,
            ))
        }
        [single] => *single,
        _ => {
            let names: Vec<&str> = matches.iter().map(|(name, _)| *name).collect();
            return Err(resolution_error(
                kind,
                type_tag,
                format!(
                    "Type '{}' is claimed by several {} implementations: {}",
                    type_tag,
                    kind,
                    names.join(", ")
                ),
                None,
            ));
        }
    };

    let mut instance = factory();
    if let Err(e) = instance.setup(config).await {
        return Err(resolution_error(
            kind,
            type_tag,
            format!("Failed to create and initialize the {} '{}'", kind, name),
            Some(e),
        ));
    }

    info!(candidate = name, kind = %kind, type_tag = type_tag, "Security extension resolved");
    Ok(Arc::from(instance))
}

fn new_http_authenticator() -> Box<dyn AuthenticationProvider> {
    Box::new(CustomHttpAuthenticator::new())
}

fn new_noop_context_provider() -> Box<dyn ContextProvider> {
    Box::new(NoopContextProvider)
}

/// Owns the candidate lists and the resolved singletons
pub struct SecurityExtensionRegistry {
    authenticators: Vec<AuthenticatorCandidate>,
    context_providers: Vec<ContextProviderCandidate>,
    authenticator: OnceCell<Arc<dyn AuthenticationProvider>>,
    context_provider: OnceCell<Arc<dyn ContextProvider>>,
    span: Span,
}

impl SecurityExtensionRegistry {
    /// Empty registry; events are recorded under `parent`
    pub fn new(parent: &Span) -> Self {
        Self {
            authenticators: Vec::new(),
            context_providers: Vec::new(),
            authenticator: OnceCell::new(),
            context_provider: OnceCell::new(),
            span: tracing::info_span!(parent: parent, "security_registry"),
        }
    }

    /// Registry pre-populated with the built-in providers
    pub fn with_builtin(parent: &Span) -> Self {
        let mut registry = Self::new(parent);
        registry.register_authenticator(AuthenticatorCandidate::new(
            "CustomHttpAuthenticator",
            CustomHttpAuthenticator::TYPE,
            new_http_authenticator,
        ));
        registry.register_context_provider(ContextProviderCandidate::new(
            "NoopContextProvider",
            NoopContextProvider::TYPE,
            new_noop_context_provider,
        ));
        registry
    }

    pub fn register_authenticator(&mut self, candidate: AuthenticatorCandidate) -> &mut Self {
        self.authenticators.push(candidate);
        self
    }

    pub fn register_context_provider(&mut self, candidate: ContextProviderCandidate) -> &mut Self {
        self.context_providers.push(candidate);
        self
    }

    pub fn authenticator_candidates(&self) -> &[AuthenticatorCandidate] {
        &self.authenticators
    }

    pub fn context_provider_candidates(&self) -> &[ContextProviderCandidate] {
        &self.context_providers
    }

    /// The process-wide authenticator, resolved on first call from
    /// `security.authenticator.type`
    pub async fn authenticator(
        &self,
        config: &ProviderConfig,
    ) -> TesseraResult<Arc<dyn AuthenticationProvider>> {
        self.authenticator
            .get_or_try_init(|| {
                resolve(
                    ExtensionKind::Authenticator,
                    &config.security.authenticator.type_tag,
                    &self.authenticators,
                    config,
                )
                .instrument(self.span.clone())
            })
            .await
            .map(Arc::clone)
    }

    /// The process-wide context provider, resolved on first call from
    /// `security.context_handler.type`
    pub async fn context_provider(
        &self,
        config: &ProviderConfig,
    ) -> TesseraResult<Arc<dyn ContextProvider>> {
        self.context_provider
            .get_or_try_init(|| {
                resolve(
                    ExtensionKind::ContextHandler,
                    &config.security.context_handler.type_tag,
                    &self.context_providers,
                    config,
                )
                .instrument(self.span.clone())
            })
            .await
            .map(Arc::clone)
    }

    /// Close whatever was resolved; failures are logged and do not stop the other close
    pub async fn close(&self) {
        async {
            if let Some(authenticator) = self.authenticator.get() {
                if let Err(e) = authenticator.close().await {
                    warn!(error = %e, "Failed to close authenticator");
                }
            }
            if let Some(context_provider) = self.context_provider.get() {
                if let Err(e) = context_provider.close().await {
                    warn!(error = %e, "Failed to close context provider");
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
