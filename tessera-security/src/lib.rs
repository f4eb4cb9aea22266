//! Tessera Security - pluggable authentication and session context
//!
//! Two extension points are exposed:
//!
//! - [`AuthenticationProvider`]: turns a username/password into supplemental
//!   session attributes, or rejects the connection
//! - [`ContextProvider`]: enriches an authenticated session with attributes
//!   from an external system, keyed by session id
//!
//! Implementations are selected at startup by [`SecurityExtensionRegistry`]
//! from a set of named factories using the configured type tag.

pub mod context;
pub mod http_authenticator;
pub mod provider;
pub mod registry;

pub use context::NoopContextProvider;
pub use http_authenticator::{CustomHttpAuthenticator, SESSION_ID_OPTION};
pub use provider::{AuthenticationProvider, ContextProvider, SecurityExtension};
pub use registry::{
    resolve, AuthenticatorCandidate, ContextProviderCandidate, ProviderCandidate,
    SecurityExtensionRegistry,
};
