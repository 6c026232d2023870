//! Policy store transaction core for semod.
//!
//! This crate drives one idempotent change against an SELinux policy store:
//! `StoreHandle` acquires and validates a scoped session, `catalog` answers
//! installed/enabled questions fresh from the store, `TransactionOps` decides
//! whether a mutation is needed and performs it, `commit` applies staged
//! changes, and the `Orchestrator` sequences all of it for a single
//! `ModuleRequest`.

pub mod catalog;
pub mod commit;
pub mod concurrency;
pub mod config;
pub mod handle;
pub mod ops;
pub mod orchestrator;
pub mod request;
pub mod status;

pub use catalog::ModuleFacts;
pub use concurrency::{install_signal_handler, shutdown_requested};
pub use config::SemodConfig;
pub use handle::StoreHandle;
pub use ops::{RunMode, TransactionOps};
pub use orchestrator::{ApplyOutcome, Orchestrator};
pub use request::{ModuleRequest, TargetState};
pub use status::{OpKind, OpStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("could not create policy store handle")]
    HandleCreation,
    #[error("SELinux policy is not managed or store cannot be accessed")]
    StoreUnmanaged,
    #[error("cannot write policy store (access level: {0})")]
    InsufficientAccess(semod_store::AccessLevel),
    #[error("could not establish policy store connection (status {0})")]
    Connection(i32),
    #[error("could not list SELinux modules (status {0})")]
    CatalogList(i32),
    #[error("could not get enabled status of module {0} (not installed)")]
    ModuleNotFound(String),
    #[error("could not {op} module {target} (status {code})")]
    Operation {
        op: OpKind,
        target: String,
        code: i32,
    },
    #[error("could not commit policy store transaction (status {0})")]
    Commit(i32),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("interrupted before {0}")]
    Interrupted(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(#[from] semod_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal failure of one invocation, naming the module it was about.
#[derive(Debug, Error)]
#[error("failed to manage module {name}: {source}")]
pub struct ManageError {
    pub name: String,
    pub state: TargetState,
    #[source]
    pub source: CoreError,
}
