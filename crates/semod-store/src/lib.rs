//! Policy store capability interface and backends for semod.
//!
//! This crate models the SELinux policy store subsystem as the
//! `PolicyStoreBackend` trait: handle lifecycle, store selection, managed and
//! access checks, connection, module enumeration, the four staged mutations,
//! and commit. Calls report raw signed status codes exactly as the store
//! subsystem does; translating them into typed outcomes is left to the
//! transaction core. Two backends are provided: `semodule`, which drives the
//! system `semodule(8)` tool, and `mock`, an in-memory store used by tests.

pub mod backend;
pub mod mock;
pub mod record;
pub mod semodule;
pub mod status;

pub use backend::{select_backend, BackendOptions, HandleId, PolicyStoreBackend};
pub use mock::{MockCall, MockFault, MockStore};
pub use record::{AccessLevel, ModuleRecord};
pub use semodule::SemoduleBackend;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("invalid mock store state: {0}")]
    InvalidState(String),
}
