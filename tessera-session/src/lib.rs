//! Tessera Session - per-connection state
//!
//! A [`Session`] owns the connection's credentials and properties, its
//! session-scoped temporary table names, and the storage locations created
//! for them. Temporary table registration may be called concurrently by
//! query threads; [`Session::close`] removes every location when the
//! connection ends.
//!
//! [`SessionEstablisher`] runs authentication and context loading when a
//! connection is accepted.

pub mod dispatcher;
pub mod establish;
pub mod impersonation;
pub mod locations;
pub mod namespace;
pub mod properties;
pub mod schema;
pub mod session;
pub mod storage;

pub use dispatcher::{QueryCountIncrementer, QueryDispatcher};
pub use establish::SessionEstablisher;
pub use impersonation::{
    AuthorityId, ImpersonationAuthority, ImpersonationPolicy, ImpersonationToken, Principals,
};
pub use locations::TemporaryLocationTracker;
pub use namespace::TemporaryObjectNamespace;
pub use properties::PropertyBag;
pub use schema::{
    find_schema, resolve_schema, root_of, schema_path, SchemaNode, TableKind, WorkspaceSchema,
};
pub use session::{Session, SessionConfig};
pub use storage::{LocalStorage, StorageStrategy, TemporaryStorage};
