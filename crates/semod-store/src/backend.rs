use crate::record::ModuleRecord;
use crate::StoreError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque token for one session with the store subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capability interface of the SELinux policy store subsystem.
///
/// Every call after `create_handle` takes the handle explicitly. Mutating
/// calls only stage changes; nothing is durable until `commit` succeeds.
/// Status-returning calls use the raw codes from [`crate::status`].
pub trait PolicyStoreBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Allocate a new session. `None` when the subsystem cannot allocate one.
    fn create_handle(&self) -> Option<HandleId>;

    /// Release a session and discard anything it staged.
    fn destroy_handle(&self, handle: HandleId);

    /// Select a named store in direct-connect mode.
    fn select_store(&self, handle: HandleId, store: &str) -> i32;

    /// Positive when the selected store is managed, zero when it is not,
    /// negative on error.
    fn is_managed(&self, handle: HandleId) -> i32;

    fn access_check(&self, handle: HandleId) -> i32;

    fn connect(&self, handle: HandleId) -> i32;

    /// Enumerate installed modules, or the negative status of the failed call.
    fn list_modules(&self, handle: HandleId) -> Result<Vec<ModuleRecord>, i32>;

    fn enable(&self, handle: HandleId, name: &str) -> i32;

    fn disable(&self, handle: HandleId, name: &str) -> i32;

    fn install_file(&self, handle: HandleId, path: &Path) -> i32;

    fn remove(&self, handle: HandleId, name: &str) -> i32;

    fn commit(&self, handle: HandleId) -> i32;
}

impl<T: PolicyStoreBackend + ?Sized> PolicyStoreBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn available(&self) -> bool {
        (**self).available()
    }

    fn create_handle(&self) -> Option<HandleId> {
        (**self).create_handle()
    }

    fn destroy_handle(&self, handle: HandleId) {
        (**self).destroy_handle(handle);
    }

    fn select_store(&self, handle: HandleId, store: &str) -> i32 {
        (**self).select_store(handle, store)
    }

    fn is_managed(&self, handle: HandleId) -> i32 {
        (**self).is_managed(handle)
    }

    fn access_check(&self, handle: HandleId) -> i32 {
        (**self).access_check(handle)
    }

    fn connect(&self, handle: HandleId) -> i32 {
        (**self).connect(handle)
    }

    fn list_modules(&self, handle: HandleId) -> Result<Vec<ModuleRecord>, i32> {
        (**self).list_modules(handle)
    }

    fn enable(&self, handle: HandleId, name: &str) -> i32 {
        (**self).enable(handle, name)
    }

    fn disable(&self, handle: HandleId, name: &str) -> i32 {
        (**self).disable(handle, name)
    }

    fn install_file(&self, handle: HandleId, path: &Path) -> i32 {
        (**self).install_file(handle, path)
    }

    fn remove(&self, handle: HandleId, name: &str) -> i32 {
        (**self).remove(handle, name)
    }

    fn commit(&self, handle: HandleId) -> i32 {
        (**self).commit(handle)
    }
}

/// Backend construction knobs, filled from configuration.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Path or name of the `semodule` executable.
    pub semodule_path: Option<PathBuf>,
    /// JSON state file for the mock backend. In-memory only when unset.
    pub mock_state: Option<PathBuf>,
}

pub fn select_backend(
    name: &str,
    options: &BackendOptions,
) -> Result<Box<dyn PolicyStoreBackend>, StoreError> {
    match name {
        "semodule" => {
            let backend = match &options.semodule_path {
                Some(path) => crate::semodule::SemoduleBackend::with_binary(path),
                None => crate::semodule::SemoduleBackend::new(),
            };
            Ok(Box::new(backend))
        }
        "mock" => {
            let backend = match &options.mock_state {
                Some(path) => crate::mock::MockStore::with_state_file(path)?,
                None => crate::mock::MockStore::new(),
            };
            Ok(Box::new(backend))
        }
        other => Err(StoreError::BackendUnavailable(other.to_owned())),
    }
}
