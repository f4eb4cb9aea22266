//! The per-connection session aggregate

use crate::dispatcher::QueryCountIncrementer;
use crate::impersonation::{AuthorityId, ImpersonationToken};
use crate::locations::TemporaryLocationTracker;
use crate::namespace::TemporaryObjectNamespace;
use crate::properties::{PropertyBag, IMPERSONATION_TARGET, SCHEMA};
use crate::schema::{find_schema, resolve_schema, schema_path, SchemaNode, TableKind, WorkspaceSchema};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tessera_core::{
    validation_error, ErrorContext, OptionManagerFactory, SessionOptions, TemporaryConfig,
    TesseraError, TesseraResult, UserCredentials,
};
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

/// Everything needed to build a [`Session`]
pub struct SessionConfig {
    pub credentials: Option<UserCredentials>,
    /// Raw connection properties as sent by the client
    pub properties: Vec<(String, String)>,
    pub option_manager_factory: Option<Arc<dyn OptionManagerFactory>>,
    pub supports_complex_types: bool,
    /// The only authority allowed to replace this session's credentials
    pub impersonation_authority: Option<AuthorityId>,
    pub parent_span: Span,
}

impl SessionConfig {
    pub fn new(credentials: UserCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            properties: Vec::new(),
            option_manager_factory: None,
            supports_complex_types: false,
            impersonation_authority: None,
            parent_span: Span::current(),
        }
    }
}

pub struct Session {
    id: String,
    credentials: RwLock<UserCredentials>,
    properties: PropertyBag,
    options: SessionOptions,
    supports_complex_types: bool,
    impersonation_authority: Option<AuthorityId>,
    query_count: AtomicU64,
    temporary_tables: TemporaryObjectNamespace,
    temporary_locations: TemporaryLocationTracker,
    span: Span,
}

impl Session {
    /// Build a fully initialized session.
    ///
    /// Unknown properties are dropped with a warning. Fails when no
    /// credentials are given.
    pub fn build(config: SessionConfig) -> TesseraResult<Self> {
        let credentials = config.credentials.ok_or_else(|| {
            validation_error!("Session credentials are required", "credentials", "session")
        })?;

        let id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            parent: &config.parent_span,
            "session",
            session_id = %id,
            user = %credentials.user_name
        );

        let (properties, options) = span.in_scope(|| {
            let properties = PropertyBag::from_raw(config.properties);
            let options = match &config.option_manager_factory {
                Some(factory) => factory.create(&id),
                None => SessionOptions::standalone(&id),
            };
            (properties, options)
        });

        let session = Self {
            temporary_tables: TemporaryObjectNamespace::new(&id),
            temporary_locations: TemporaryLocationTracker::new(&id, &span),
            id,
            credentials: RwLock::new(credentials),
            properties,
            options,
            supports_complex_types: config.supports_complex_types,
            impersonation_authority: config.impersonation_authority,
            query_count: AtomicU64::new(0),
            span,
        };

        session.span.in_scope(|| {
            debug!(properties = session.properties.len(), "Session built");
        });
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credentials(&self) -> UserCredentials {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap the session principal. Only the authority this session was built
    /// with may do this; any other token leaves the credentials untouched.
    pub fn replace_credentials(
        &self,
        token: &ImpersonationToken,
        new_credentials: UserCredentials,
    ) -> TesseraResult<()> {
        if self.impersonation_authority != Some(token.authority()) {
            let _guard = self.span.enter();
            warn!("Rejected credential replacement from an unrecognized authority");
            return Err(TesseraError::UnauthorizedOperation {
                message: "Only the impersonation authority can replace session credentials"
                    .to_string(),
                context: ErrorContext::new("session")
                    .with_operation("replace_credentials")
                    .with_metadata("session_id", &self.id),
            });
        }
        if new_credentials.user_name.is_empty() {
            return Err(validation_error!(
                "Replacement credentials must name a user",
                "credentials",
                "session"
            ));
        }

        let mut credentials = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        *credentials = new_credentials;
        Ok(())
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key)
    }

    /// Stored connection properties, without the password
    pub fn properties(&self) -> HashMap<String, String> {
        self.properties.snapshot()
    }

    pub fn target_user_name(&self) -> Option<String> {
        self.properties.get(IMPERSONATION_TARGET)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn supports_complex_types(&self) -> bool {
        self.supports_complex_types
    }

    /// Dotted default schema path; empty when none was set
    pub fn default_schema_path(&self) -> String {
        self.properties.get_or_empty(SCHEMA)
    }

    /// Full dotted name of the default schema, as stored in the `schema` property
    pub fn default_schema_name(&self) -> String {
        self.properties.get_or_empty(SCHEMA)
    }

    /// Resolve `new_path` against `current` and store its canonical form.
    ///
    /// The stored path is unchanged when resolution fails.
    pub fn set_default_schema_path(
        &self,
        new_path: &str,
        current: &Arc<dyn SchemaNode>,
    ) -> TesseraResult<()> {
        let resolved = resolve_schema(current, new_path)?;
        let canonical = schema_path(&resolved);
        self.properties.set(SCHEMA, canonical.as_str());

        let _guard = self.span.enter();
        debug!(schema = %canonical, "Default schema changed");
        Ok(())
    }

    /// The default schema node under `root`, if a path is set and still resolves
    pub fn default_schema(&self, root: &Arc<dyn SchemaNode>) -> Option<Arc<dyn SchemaNode>> {
        let path = self.default_schema_path();
        if path.is_empty() {
            return None;
        }
        let segments: Vec<&str> = path.split('.').collect();
        find_schema(root, &segments)
    }

    pub fn increment_query_count(&self, _incrementer: &QueryCountIncrementer) {
        self.query_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Make sure the session location in `workspace` exists, then register
    /// `original_name` and return its generated name.
    ///
    /// Safe to retry and to call concurrently for the same name: every caller
    /// gets the same generated name.
    pub async fn register_temporary_table(
        &self,
        workspace: &dyn WorkspaceSchema,
        original_name: &str,
    ) -> TesseraResult<String> {
        self.temporary_locations.ensure(workspace).await?;
        let generated = self.temporary_tables.register(original_name);

        let _guard = self.span.enter();
        debug!(table = %original_name, generated = %generated, "Temporary table registered");
        Ok(generated)
    }

    pub fn resolve_temporary_table_name(&self, original_name: &str) -> Option<String> {
        self.temporary_tables.resolve(original_name)
    }

    /// Whether `original_name` is a live temporary table of this session in `workspace`
    pub async fn is_temporary_table(
        &self,
        workspace: &dyn WorkspaceSchema,
        config: &TemporaryConfig,
        original_name: &str,
    ) -> TesseraResult<bool> {
        if !config.is_temporary_workspace(&workspace.full_schema_name()) {
            return Ok(false);
        }
        let Some(generated) = self.temporary_tables.resolve(original_name) else {
            return Ok(false);
        };
        let kind = workspace
            .table_kind(&generated)
            .instrument(self.span.clone())
            .await?;
        Ok(kind == Some(TableKind::Table))
    }

    /// Drop the temporary table registered as `original_name`.
    ///
    /// No-op when nothing is registered. The mapping is forgotten only once
    /// the drop succeeded, so a failed drop can be retried.
    pub async fn remove_temporary_table(
        &self,
        workspace: &dyn WorkspaceSchema,
        original_name: &str,
    ) -> TesseraResult<()> {
        let Some(generated) = self.temporary_tables.resolve(original_name) else {
            return Ok(());
        };

        workspace
            .drop_table(&generated)
            .instrument(self.span.clone())
            .await?;
        self.temporary_tables.remove(original_name);

        let _guard = self.span.enter();
        info!(table = %original_name, generated = %generated, "Temporary table removed");
        Ok(())
    }

    pub fn temporary_table_count(&self) -> usize {
        self.temporary_tables.len()
    }

    pub fn temporary_location_count(&self) -> usize {
        self.temporary_locations.len()
    }

    /// Delete every temporary location of this session.
    ///
    /// Never fails; deletion errors are logged per location. Registrations
    /// still creating their location are waited for, and later ones fail with
    /// `StorageProvisioning`. A second call finds nothing left to delete.
    pub async fn close(&self) {
        let deleted = self
            .temporary_locations
            .cleanup()
            .instrument(self.span.clone())
            .await;

        let _guard = self.span.enter();
        info!(
            deleted_locations = deleted,
            queries = self.query_count(),
            "Session closed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.temporary_locations.is_empty() {
            let _guard = self.span.enter();
            warn!(
                locations = self.temporary_locations.len(),
                "Session dropped without close; temporary locations were left behind"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("credentials", &self.credentials())
            .field("properties", &self.properties())
            .field("query_count", &self.query_count())
            .finish()
    }
}
