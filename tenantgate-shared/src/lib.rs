//! # TenantGate Shared Library
//!
//! Core of the multi-tenant provisioning and credential engine, shared by
//! the API server and the repair worker.
//!
//! ## Module Organization
//!
//! - `schema`: validation of tenant-declared user-record schemas
//! - `query`: namespace naming and statement construction
//! - `identity`: tenant metadata store (Postgres and in-memory)
//! - `provision`: per-tenant namespaces and statement execution
//! - `coordinator`: tenant registration across both stores, and repair
//! - `credentials`: signup and login
//! - `hashing`: pluggable secret hashing
//! - `deadline`: per-call store deadlines
//! - `db`: connection pools and migrations
//! - `redis`: Redis client used for login throttling
//! - `error`: the engine's error taxonomy

pub mod coordinator;
pub mod credentials;
pub mod db;
pub mod deadline;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod provision;
pub mod query;
pub mod redis;
pub mod schema;

pub use error::{TenantError, TenantResult};

/// Current version of the TenantGate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
