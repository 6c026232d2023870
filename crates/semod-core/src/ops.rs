//! The four idempotent module operations.
//!
//! Each operation asks the catalog whether a change is needed. If not, it
//! reports `false` without touching the store. Otherwise it performs the
//! mutating call and commits, or in check mode stops right there and
//! reports `true`.

use crate::catalog;
use crate::commit::commit;
use crate::concurrency::shutdown_requested;
use crate::handle::StoreHandle;
use crate::request::{ModuleRequest, TargetState};
use crate::status::{OpKind, OpStatus};
use crate::CoreError;
use semod_store::{HandleId, PolicyStoreBackend};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Apply,
    /// Report what would change without mutating or committing.
    Check,
}

pub struct TransactionOps<'h, 'a> {
    handle: &'h StoreHandle<'a>,
    mode: RunMode,
    cancel: fn() -> bool,
}

impl<'h, 'a> TransactionOps<'h, 'a> {
    pub fn new(handle: &'h StoreHandle<'a>, mode: RunMode) -> Self {
        Self {
            handle,
            mode,
            cancel: shutdown_requested,
        }
    }

    /// Replace the predicate consulted before each mutation.
    #[must_use]
    pub fn with_cancel(mut self, cancel: fn() -> bool) -> Self {
        self.cancel = cancel;
        self
    }

    /// Dispatch a request to the operation matching its target state.
    pub fn apply(&self, request: &ModuleRequest) -> Result<bool, CoreError> {
        match request.state {
            TargetState::Enabled => self.enable(&request.name),
            TargetState::Disabled => self.disable(&request.name),
            TargetState::Present => {
                let path = request.path.as_deref().ok_or_else(|| {
                    CoreError::InvalidRequest(
                        "state is present but no module package path was given".to_owned(),
                    )
                })?;
                self.install(&request.name, path)
            }
            TargetState::Absent => self.remove(&request.name),
        }
    }

    pub fn enable(&self, name: &str) -> Result<bool, CoreError> {
        let needed = !catalog::is_enabled(self.handle, name)?;
        self.transact(OpKind::Enable, name, needed, |backend, id| {
            backend.enable(id, name)
        })
    }

    pub fn disable(&self, name: &str) -> Result<bool, CoreError> {
        let needed = catalog::is_enabled(self.handle, name)?;
        self.transact(OpKind::Disable, name, needed, |backend, id| {
            backend.disable(id, name)
        })
    }

    /// Install `name` from the package at `path` unless it is already installed.
    pub fn install(&self, name: &str, path: &Path) -> Result<bool, CoreError> {
        let needed = !catalog::is_installed(self.handle, name)?;
        let target = format!("{name} from {}", path.display());
        self.transact(OpKind::Install, &target, needed, |backend, id| {
            backend.install_file(id, path)
        })
    }

    pub fn remove(&self, name: &str) -> Result<bool, CoreError> {
        let needed = catalog::is_installed(self.handle, name)?;
        self.transact(OpKind::Remove, name, needed, |backend, id| {
            backend.remove(id, name)
        })
    }

    fn transact(
        &self,
        kind: OpKind,
        target: &str,
        needed: bool,
        mutate: impl FnOnce(&dyn PolicyStoreBackend, HandleId) -> i32,
    ) -> Result<bool, CoreError> {
        if !needed {
            debug!("{target}: no {kind} needed");
            return Ok(false);
        }
        if !self.handle.is_writable() {
            return Err(CoreError::InsufficientAccess(self.handle.access()));
        }
        if self.mode == RunMode::Check {
            info!("check mode: would {kind} {target}");
            return Ok(true);
        }
        if (self.cancel)() {
            return Err(CoreError::Interrupted(format!("{kind} {target}")));
        }

        let rc = mutate(self.handle.backend(), self.handle.id());
        match OpStatus::classify(kind, rc) {
            OpStatus::Mutated => {
                info!("staged {kind} of {target}");
                commit(self.handle)?;
                Ok(true)
            }
            OpStatus::AlreadyInState => {
                debug!("store reports {target} already in place for {kind}; nothing to commit");
                Ok(false)
            }
            OpStatus::Failed(code) => Err(CoreError::Operation {
                op: kind,
                target: target.to_owned(),
                code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semod_store::status::{STATUS_ALREADY_IN_STATE, STATUS_MODULE_ABSENT};
    use semod_store::{AccessLevel, MockCall, MockFault, MockStore};

    #[test]
    fn enable_disabled_module_commits() {
        let store = MockStore::new().with_module("xen", "1.1.0", false);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(ops.enable("xen").unwrap());
        assert!(catalog::is_enabled(&handle, "xen").unwrap());
        assert_eq!(store.count_calls(&MockCall::Commit), 1);
    }

    #[test]
    fn enable_enabled_module_is_noop() {
        let store = MockStore::new().with_module("xen", "1.1.0", true);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(!ops.enable("xen").unwrap());
        assert!(store.mutating_calls().is_empty());
    }

    #[test]
    fn disable_twice_changes_once() {
        let store = MockStore::new().with_module("xen", "1.1.0", true);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(ops.disable("xen").unwrap());
        assert!(!catalog::is_enabled(&handle, "xen").unwrap());
        assert!(!ops.disable("xen").unwrap());
        assert_eq!(store.count_calls(&MockCall::Disable("xen".to_owned())), 1);
    }

    #[test]
    fn toggle_on_missing_module_is_not_found() {
        let store = MockStore::new();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(matches!(ops.enable("ghost"), Err(CoreError::ModuleNotFound(_))));
        assert!(matches!(ops.disable("ghost"), Err(CoreError::ModuleNotFound(_))));
        assert!(store.mutating_calls().is_empty());
    }

    #[test]
    fn already_enabled_code_skips_commit() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", false)
            .fail(MockFault::Enable, STATUS_ALREADY_IN_STATE);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(!ops.enable("xen").unwrap());
        assert_eq!(store.count_calls(&MockCall::Commit), 0);
    }

    #[test]
    fn already_absent_code_skips_commit() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", true)
            .fail(MockFault::Remove, STATUS_MODULE_ABSENT);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(!ops.remove("xen").unwrap());
        assert_eq!(store.count_calls(&MockCall::Commit), 0);
    }

    #[test]
    fn enable_failure_is_operation_error() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", false)
            .fail(MockFault::Enable, -1);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        let err = ops.enable("xen").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Operation { op: OpKind::Enable, code: -1, .. }
        ));
        assert_eq!(store.count_calls(&MockCall::Commit), 0);
    }

    #[test]
    fn install_negative_code_is_fatal() {
        let store = MockStore::new().fail(MockFault::InstallFile, STATUS_MODULE_ABSENT);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        let err = ops.install("xen", Path::new("/pkgs/xen.pp")).unwrap_err();
        assert!(err.to_string().contains("xen from /pkgs/xen.pp"));
    }

    #[test]
    fn install_then_installed() {
        let store = MockStore::new();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(ops.install("xen", Path::new("/pkgs/xen.pp")).unwrap());
        assert!(catalog::is_installed(&handle, "xen").unwrap());
        assert!(!ops.install("xen", Path::new("/pkgs/xen.pp")).unwrap());
    }

    #[test]
    fn remove_missing_module_is_noop() {
        let store = MockStore::new();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(!ops.remove("xen").unwrap());
        assert!(store.mutating_calls().is_empty());
    }

    #[test]
    fn commit_failure_propagates() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", true)
            .fail(MockFault::Commit, -1);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(matches!(ops.remove("xen"), Err(CoreError::Commit(-1))));
        assert!(store.module("xen").is_some());
    }

    #[test]
    fn check_mode_reports_change_without_mutating() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", false)
            .with_module("mysql", "1.12.0", true)
            .forbid_mutations();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Check);

        assert!(ops.enable("xen").unwrap());
        assert!(ops.disable("mysql").unwrap());
        assert!(ops.install("apache", Path::new("/pkgs/apache.pp")).unwrap());
        assert!(ops.remove("mysql").unwrap());
        assert!(store.mutating_calls().is_empty());
    }

    #[test]
    fn check_mode_reports_noop_as_unchanged() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", true)
            .forbid_mutations();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Check);

        assert!(!ops.enable("xen").unwrap());
        assert!(!ops.install("xen", Path::new("/pkgs/xen.pp")).unwrap());
        assert!(!ops.remove("apache").unwrap());
    }

    #[test]
    fn read_only_handle_cannot_mutate() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", false)
            .with_access(AccessLevel::Read)
            .forbid_mutations();
        let handle = StoreHandle::open_with_access(&store, "", AccessLevel::Read).unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        assert!(matches!(
            ops.enable("xen"),
            Err(CoreError::InsufficientAccess(AccessLevel::Read))
        ));
    }

    #[test]
    fn apply_dispatches_by_state() {
        let store = MockStore::new().with_module("xen", "1.1.0", true);
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        let req = ModuleRequest::new("xen", TargetState::Absent);
        assert!(ops.apply(&req).unwrap());
        assert_eq!(
            store.mutating_calls(),
            vec![MockCall::Remove("xen".to_owned()), MockCall::Commit]
        );
    }

    #[test]
    fn apply_present_without_path_is_invalid() {
        let store = MockStore::new();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Apply);

        let req = ModuleRequest::new("xen", TargetState::Present);
        assert!(matches!(ops.apply(&req), Err(CoreError::InvalidRequest(_))));
    }

    #[test]
    fn cancelled_op_is_interrupted_before_mutating() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", false)
            .with_module("mysql", "1.12.0", true);
        {
            let handle = StoreHandle::open(&store, "").unwrap();
            let ops = TransactionOps::new(&handle, RunMode::Apply).with_cancel(|| true);

            let err = ops.enable("xen").unwrap_err();
            assert!(matches!(err, CoreError::Interrupted(ref what) if what == "enable xen"));
            assert!(matches!(
                ops.remove("mysql"),
                Err(CoreError::Interrupted(_))
            ));
            // Nothing to do is still answered without consulting the predicate.
            assert!(!ops.disable("xen").unwrap());
        }
        assert!(store.mutating_calls().is_empty());
        assert!(!store.module("xen").unwrap().enabled);
        assert_eq!(store.handles_created(), 1);
        assert_eq!(store.handles_destroyed(), 1);
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn cancel_is_not_consulted_in_check_mode() {
        let store = MockStore::new()
            .with_module("xen", "1.1.0", false)
            .forbid_mutations();
        let handle = StoreHandle::open(&store, "").unwrap();
        let ops = TransactionOps::new(&handle, RunMode::Check).with_cancel(|| true);
        assert!(ops.enable("xen").unwrap());
    }
}
