use crate::CoreError;
use semod_store::{AccessLevel, HandleId, PolicyStoreBackend};
use tracing::{debug, warn};

/// A validated, connected session with a policy store.
///
/// The backend session is released when the handle is dropped, so every
/// exit path (including a failed `open`) releases it exactly once.
pub struct StoreHandle<'a> {
    backend: &'a dyn PolicyStoreBackend,
    id: HandleId,
    store: Option<String>,
    access: AccessLevel,
}

impl<'a> StoreHandle<'a> {
    /// Open the store named by `selector` (empty for the default store) for writing.
    pub fn open(backend: &'a dyn PolicyStoreBackend, selector: &str) -> Result<Self, CoreError> {
        Self::open_with_access(backend, selector, AccessLevel::Write)
    }

    pub fn open_with_access(
        backend: &'a dyn PolicyStoreBackend,
        selector: &str,
        minimum: AccessLevel,
    ) -> Result<Self, CoreError> {
        let id = backend.create_handle().ok_or(CoreError::HandleCreation)?;
        let mut handle = Self {
            backend,
            id,
            store: None,
            access: AccessLevel::None,
        };
        debug!("opened {} store handle {id}", backend.name());

        if !selector.is_empty() {
            let rc = backend.select_store(id, selector);
            if rc < 0 {
                warn!("selecting store '{selector}' failed (status {rc})");
            }
            handle.store = Some(selector.to_owned());
        }

        if backend.is_managed(id) <= 0 {
            return Err(CoreError::StoreUnmanaged);
        }

        handle.access = AccessLevel::from_raw(backend.access_check(id));
        if handle.access < minimum {
            return Err(CoreError::InsufficientAccess(handle.access));
        }

        let rc = backend.connect(id);
        if rc < 0 {
            return Err(CoreError::Connection(rc));
        }

        Ok(handle)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn backend(&self) -> &'a dyn PolicyStoreBackend {
        self.backend
    }

    /// The explicitly selected store, `None` for the default one.
    pub fn store(&self) -> Option<&str> {
        self.store.as_deref()
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    pub fn is_writable(&self) -> bool {
        self.access >= AccessLevel::Write
    }
}

impl Drop for StoreHandle<'_> {
    fn drop(&mut self) {
        debug!("releasing store handle {}", self.id);
        self.backend.destroy_handle(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semod_store::mock::MockFault;
    use semod_store::{MockCall, MockStore};

    #[test]
    fn open_default_store() {
        let store = MockStore::new();
        {
            let handle = StoreHandle::open(&store, "").unwrap();
            assert!(handle.is_writable());
            assert_eq!(handle.store(), None);
            assert_eq!(store.count_calls(&MockCall::Connect), 1);
        }
        assert_eq!(store.handles_destroyed(), 1);
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn open_named_store_selects_it() {
        let store = MockStore::new();
        let handle = StoreHandle::open(&store, "mls").unwrap();
        assert_eq!(handle.store(), Some("mls"));
        assert_eq!(store.selected_store(handle.id()).as_deref(), Some("mls"));
        assert_eq!(store.count_calls(&MockCall::SelectStore("mls".to_owned())), 1);
    }

    #[test]
    fn handle_creation_failure_releases_nothing() {
        let store = MockStore::new().fail(MockFault::CreateHandle, -1);
        let err = StoreHandle::open(&store, "").err().unwrap();
        assert!(matches!(err, CoreError::HandleCreation));
        assert_eq!(store.handles_destroyed(), 0);
    }

    #[test]
    fn unmanaged_store_released_once() {
        let store = MockStore::new().unmanaged();
        let err = StoreHandle::open(&store, "").err().unwrap();
        assert!(matches!(err, CoreError::StoreUnmanaged));
        assert_eq!(store.handles_created(), 1);
        assert_eq!(store.handles_destroyed(), 1);
        assert_eq!(store.count_calls(&MockCall::Connect), 0);
    }

    #[test]
    fn read_only_access_rejected_for_write() {
        let store = MockStore::new().with_access(AccessLevel::Read);
        let err = StoreHandle::open(&store, "").err().unwrap();
        assert!(matches!(err, CoreError::InsufficientAccess(AccessLevel::Read)));
        assert_eq!(store.handles_destroyed(), 1);
    }

    #[test]
    fn read_only_access_accepted_for_read() {
        let store = MockStore::new().with_access(AccessLevel::Read);
        let handle = StoreHandle::open_with_access(&store, "", AccessLevel::Read).unwrap();
        assert!(!handle.is_writable());
    }

    #[test]
    fn connection_failure_released_once() {
        let store = MockStore::new().fail(MockFault::Connect, -4);
        let err = StoreHandle::open(&store, "").err().unwrap();
        assert!(matches!(err, CoreError::Connection(-4)));
        assert_eq!(store.handles_destroyed(), 1);
    }
}
