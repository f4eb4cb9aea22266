//! Tessera Core - shared building blocks for session and security services
//!
//! Defines the error taxonomy, server configuration, logging setup, and the
//! value types (credentials, option values, storage paths) exchanged between
//! the security and session crates

pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use options::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
