use crate::catalog::{self, ModuleFacts};
use crate::config::SemodConfig;
use crate::handle::StoreHandle;
use crate::ops::{RunMode, TransactionOps};
use crate::request::{ModuleRequest, TargetState};
use crate::{CoreError, ManageError};
use semod_store::{select_backend, AccessLevel, ModuleRecord, PolicyStoreBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Successful result of one request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub name: String,
    pub state: TargetState,
    pub changed: bool,
    pub check_mode: bool,
}

/// Runs one module request against a policy store backend.
///
/// Each call opens its own store handle, does its work, and releases the
/// handle before returning, whether it succeeded or not.
pub struct Orchestrator {
    backend: Box<dyn PolicyStoreBackend>,
}

impl Orchestrator {
    pub fn new(backend: Box<dyn PolicyStoreBackend>) -> Self {
        Self { backend }
    }

    /// Build an orchestrator over the backend named in `config`.
    pub fn from_config(config: &SemodConfig) -> Result<Self, CoreError> {
        let backend = select_backend(&config.backend, &config.backend_options())?;
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> &dyn PolicyStoreBackend {
        self.backend.as_ref()
    }

    pub fn apply(
        &self,
        request: &ModuleRequest,
        mode: RunMode,
    ) -> Result<ApplyOutcome, ManageError> {
        let changed = self.run(request, mode).map_err(|source| ManageError {
            name: request.name.clone(),
            state: request.state,
            source,
        })?;

        info!(
            "module {} {}: {}",
            request.name,
            request.state,
            if changed { "changed" } else { "unchanged" }
        );
        Ok(ApplyOutcome {
            name: request.name.clone(),
            state: request.state,
            changed,
            check_mode: mode == RunMode::Check,
        })
    }

    fn run(&self, request: &ModuleRequest, mode: RunMode) -> Result<bool, CoreError> {
        request.validate()?;
        let handle = StoreHandle::open(self.backend.as_ref(), &request.store)?;
        TransactionOps::new(&handle, mode).apply(request)
    }

    /// Every installed module in `store` (empty for the default store).
    pub fn list(&self, store: &str) -> Result<Vec<ModuleRecord>, CoreError> {
        let handle = StoreHandle::open_with_access(self.backend.as_ref(), store, AccessLevel::Read)?;
        catalog::list_all(&handle)
    }

    /// Facts for the named modules, or all modules when `names` is empty.
    pub fn facts(
        &self,
        store: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, ModuleFacts>, CoreError> {
        let handle = StoreHandle::open_with_access(self.backend.as_ref(), store, AccessLevel::Read)?;
        catalog::facts(&handle, names)
    }
}
