use crate::backend::{HandleId, PolicyStoreBackend};
use crate::record::{AccessLevel, ModuleRecord};
use crate::status::{
    MANAGED, NOT_MANAGED, STATUS_ALREADY_IN_STATE, STATUS_ERR, STATUS_MODULE_ABSENT, STATUS_OK,
};
use crate::StoreError;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Version recorded for modules installed through the mock store.
pub const MOCK_MODULE_VERSION: &str = "1.0.0-mock";

/// A call made against the mock store, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateHandle,
    DestroyHandle(HandleId),
    SelectStore(String),
    IsManaged,
    AccessCheck,
    Connect,
    ListModules,
    Enable(String),
    Disable(String),
    InstallFile(PathBuf),
    Remove(String),
    Commit,
}

impl MockCall {
    /// True for calls that stage or apply changes to the store.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            MockCall::Enable(_)
                | MockCall::Disable(_)
                | MockCall::InstallFile(_)
                | MockCall::Remove(_)
                | MockCall::Commit
        )
    }
}

/// Injection points for failing statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFault {
    CreateHandle,
    Connect,
    ListModules,
    Enable,
    Disable,
    InstallFile,
    Remove,
    Commit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default = "default_managed")]
    managed: bool,
    #[serde(default = "default_access")]
    access: AccessLevel,
    #[serde(default)]
    modules: Vec<ModuleRecord>,
}

fn default_managed() -> bool {
    true
}

fn default_access() -> AccessLevel {
    AccessLevel::Write
}

#[derive(Debug)]
enum Staged {
    Enable(String),
    Disable(String),
    Install(ModuleRecord),
    Remove(String),
}

#[derive(Debug, Default)]
struct Session {
    store: Option<String>,
    connected: bool,
    staged: Vec<Staged>,
}

#[derive(Debug)]
struct Inner {
    modules: BTreeMap<String, ModuleRecord>,
    managed: bool,
    access: AccessLevel,
    faults: HashMap<MockFault, i32>,
    sessions: HashMap<HandleId, Session>,
    next_handle: u64,
    created: usize,
    destroyed: Vec<HandleId>,
    calls: Vec<MockCall>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            modules: BTreeMap::new(),
            managed: true,
            access: AccessLevel::Write,
            faults: HashMap::new(),
            sessions: HashMap::new(),
            next_handle: 1,
            created: 0,
            destroyed: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl Inner {
    fn connected_session(&mut self, handle: HandleId) -> Option<&mut Session> {
        self.sessions.get_mut(&handle).filter(|s| s.connected)
    }

    /// Committed modules with the session's staged changes applied.
    fn effective_modules(&self, handle: HandleId) -> BTreeMap<String, ModuleRecord> {
        let mut modules = self.modules.clone();
        if let Some(session) = self.sessions.get(&handle) {
            apply_staged(&mut modules, &session.staged);
        }
        modules
    }

    fn load(&mut self, state: PersistedState) {
        self.managed = state.managed;
        self.access = state.access;
        self.modules = state
            .modules
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();
    }

    fn snapshot(&self) -> PersistedState {
        PersistedState {
            managed: self.managed,
            access: self.access,
            modules: self.modules.values().cloned().collect(),
        }
    }
}

fn apply_staged(modules: &mut BTreeMap<String, ModuleRecord>, staged: &[Staged]) {
    for change in staged {
        match change {
            Staged::Enable(name) => {
                if let Some(m) = modules.get_mut(name) {
                    m.enabled = true;
                }
            }
            Staged::Disable(name) => {
                if let Some(m) = modules.get_mut(name) {
                    m.enabled = false;
                }
            }
            Staged::Install(record) => {
                modules.insert(record.name.clone(), record.clone());
            }
            Staged::Remove(name) => {
                modules.remove(name);
            }
        }
    }
}

/// Derive the module name a package file would install, e.g. `xen.pp.bz2` -> `xen`.
pub fn module_name_from_package(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_owned())
    }
}

/// In-memory policy store.
///
/// Changes are staged per handle and applied on `commit`. When constructed
/// with a state file, the store is reloaded from it on every `create_handle`
/// and written back atomically on every successful commit, so separate
/// processes observe each other's commits.
pub struct MockStore {
    inner: Mutex<Inner>,
    state_file: Option<PathBuf>,
    forbid_mutations: bool,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            state_file: None,
            forbid_mutations: false,
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_file(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = Inner::default();
        if path.exists() {
            inner.load(read_state(&path)?);
        }
        Ok(Self {
            inner: Mutex::new(inner),
            state_file: Some(path),
            forbid_mutations: false,
        })
    }

    #[must_use]
    pub fn with_module(mut self, name: &str, version: &str, enabled: bool) -> Self {
        self.inner_mut()
            .modules
            .insert(name.to_owned(), ModuleRecord::new(name, version, enabled));
        self
    }

    #[must_use]
    pub fn unmanaged(mut self) -> Self {
        self.inner_mut().managed = false;
        self
    }

    #[must_use]
    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.inner_mut().access = access;
        self
    }

    /// Make the given call report `code` instead of its normal status.
    #[must_use]
    pub fn fail(mut self, fault: MockFault, code: i32) -> Self {
        self.inner_mut().faults.insert(fault, code);
        self
    }

    /// Panic on any mutating call. Used to prove check mode never mutates.
    #[must_use]
    pub fn forbid_mutations(mut self) -> Self {
        self.forbid_mutations = true;
        self
    }

    /// Write the current state to the state file, if one is configured.
    pub fn save(&self) -> Result<(), StoreError> {
        let snapshot = self.lock().snapshot();
        self.persist(&snapshot)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<MockCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn count_calls(&self, call: &MockCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn module(&self, name: &str) -> Option<ModuleRecord> {
        self.lock().modules.get(name).cloned()
    }

    pub fn handles_created(&self) -> usize {
        self.lock().created
    }

    pub fn handles_destroyed(&self) -> usize {
        self.lock().destroyed.len()
    }

    /// How many times a specific handle was destroyed.
    pub fn destroy_count(&self, handle: HandleId) -> usize {
        self.lock().destroyed.iter().filter(|h| **h == handle).count()
    }

    pub fn open_handles(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Store selected on a live handle, if any.
    pub fn selected_store(&self, handle: HandleId) -> Option<String> {
        self.lock()
            .sessions
            .get(&handle)
            .and_then(|s| s.store.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard_mutation(&self, call: &MockCall) {
        if self.forbid_mutations {
            panic!("mutating call {call:?} on a mock store that forbids mutations");
        }
    }

    fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path.with_extension("lock"))?;
        lock_file.lock_exclusive()?;

        let content = serde_json::to_string_pretty(state)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        let _ = FileExt::unlock(&lock_file);
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<PersistedState, StoreError> {
    let content = fs::read_to_string(path)?;
    let state: PersistedState = serde_json::from_str(&content)?;

    let mut seen = HashSet::new();
    for module in &state.modules {
        if !seen.insert(module.name.as_str()) {
            return Err(StoreError::InvalidState(format!(
                "module '{}' listed more than once in {}",
                module.name,
                path.display()
            )));
        }
    }
    Ok(state)
}

impl PolicyStoreBackend for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn create_handle(&self) -> Option<HandleId> {
        let reloaded = match &self.state_file {
            Some(path) if path.exists() => match read_state(path) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("cannot load mock store state from {}: {e}", path.display());
                    return None;
                }
            },
            _ => None,
        };

        let mut inner = self.lock();
        inner.calls.push(MockCall::CreateHandle);
        if inner.faults.contains_key(&MockFault::CreateHandle) {
            return None;
        }
        if let Some(state) = reloaded {
            inner.load(state);
        }
        let handle = HandleId::new(inner.next_handle);
        inner.next_handle += 1;
        inner.created += 1;
        inner.sessions.insert(handle, Session::default());
        debug!("mock store: created handle {handle}");
        Some(handle)
    }

    fn destroy_handle(&self, handle: HandleId) {
        let mut inner = self.lock();
        inner.calls.push(MockCall::DestroyHandle(handle));
        inner.destroyed.push(handle);
        inner.sessions.remove(&handle);
    }

    fn select_store(&self, handle: HandleId, store: &str) -> i32 {
        let mut inner = self.lock();
        inner.calls.push(MockCall::SelectStore(store.to_owned()));
        match inner.sessions.get_mut(&handle) {
            Some(session) => {
                session.store = Some(store.to_owned());
                STATUS_OK
            }
            None => STATUS_ERR,
        }
    }

    fn is_managed(&self, handle: HandleId) -> i32 {
        let mut inner = self.lock();
        inner.calls.push(MockCall::IsManaged);
        if !inner.sessions.contains_key(&handle) {
            return STATUS_ERR;
        }
        if inner.managed {
            MANAGED
        } else {
            NOT_MANAGED
        }
    }

    fn access_check(&self, handle: HandleId) -> i32 {
        let mut inner = self.lock();
        inner.calls.push(MockCall::AccessCheck);
        if !inner.sessions.contains_key(&handle) {
            return STATUS_ERR;
        }
        inner.access.to_raw()
    }

    fn connect(&self, handle: HandleId) -> i32 {
        let mut inner = self.lock();
        inner.calls.push(MockCall::Connect);
        if let Some(code) = inner.faults.get(&MockFault::Connect).copied() {
            return code;
        }
        match inner.sessions.get_mut(&handle) {
            Some(session) => {
                session.connected = true;
                STATUS_OK
            }
            None => STATUS_ERR,
        }
    }

    fn list_modules(&self, handle: HandleId) -> Result<Vec<ModuleRecord>, i32> {
        let mut inner = self.lock();
        inner.calls.push(MockCall::ListModules);
        if let Some(code) = inner.faults.get(&MockFault::ListModules).copied() {
            return Err(code);
        }
        if inner.connected_session(handle).is_none() {
            return Err(STATUS_ERR);
        }
        Ok(inner.modules.values().cloned().collect())
    }

    fn enable(&self, handle: HandleId, name: &str) -> i32 {
        let call = MockCall::Enable(name.to_owned());
        self.guard_mutation(&call);
        let mut inner = self.lock();
        inner.calls.push(call);
        if let Some(code) = inner.faults.get(&MockFault::Enable).copied() {
            return code;
        }
        let current = inner.effective_modules(handle).get(name).map(|m| m.enabled);
        let Some(session) = inner.connected_session(handle) else {
            return STATUS_ERR;
        };
        match current {
            None => STATUS_ERR,
            Some(true) => STATUS_ALREADY_IN_STATE,
            Some(false) => {
                session.staged.push(Staged::Enable(name.to_owned()));
                STATUS_OK
            }
        }
    }

    fn disable(&self, handle: HandleId, name: &str) -> i32 {
        let call = MockCall::Disable(name.to_owned());
        self.guard_mutation(&call);
        let mut inner = self.lock();
        inner.calls.push(call);
        if let Some(code) = inner.faults.get(&MockFault::Disable).copied() {
            return code;
        }
        let current = inner.effective_modules(handle).get(name).map(|m| m.enabled);
        let Some(session) = inner.connected_session(handle) else {
            return STATUS_ERR;
        };
        match current {
            None => STATUS_ERR,
            Some(false) => STATUS_ALREADY_IN_STATE,
            Some(true) => {
                session.staged.push(Staged::Disable(name.to_owned()));
                STATUS_OK
            }
        }
    }

    fn install_file(&self, handle: HandleId, path: &Path) -> i32 {
        let call = MockCall::InstallFile(path.to_path_buf());
        self.guard_mutation(&call);
        let mut inner = self.lock();
        inner.calls.push(call);
        if let Some(code) = inner.faults.get(&MockFault::InstallFile).copied() {
            return code;
        }
        let Some(name) = module_name_from_package(path) else {
            return STATUS_ERR;
        };
        let Some(session) = inner.connected_session(handle) else {
            return STATUS_ERR;
        };
        session.staged.push(Staged::Install(ModuleRecord::new(
            name,
            MOCK_MODULE_VERSION,
            true,
        )));
        STATUS_OK
    }

    fn remove(&self, handle: HandleId, name: &str) -> i32 {
        let call = MockCall::Remove(name.to_owned());
        self.guard_mutation(&call);
        let mut inner = self.lock();
        inner.calls.push(call);
        if let Some(code) = inner.faults.get(&MockFault::Remove).copied() {
            return code;
        }
        let installed = inner.effective_modules(handle).contains_key(name);
        let Some(session) = inner.connected_session(handle) else {
            return STATUS_ERR;
        };
        if !installed {
            return STATUS_MODULE_ABSENT;
        }
        session.staged.push(Staged::Remove(name.to_owned()));
        STATUS_OK
    }

    fn commit(&self, handle: HandleId) -> i32 {
        self.guard_mutation(&MockCall::Commit);
        let mut inner = self.lock();
        inner.calls.push(MockCall::Commit);
        let fault = inner.faults.get(&MockFault::Commit).copied();
        let Some(session) = inner.connected_session(handle) else {
            return STATUS_ERR;
        };
        let staged = std::mem::take(&mut session.staged);
        if let Some(code) = fault {
            return code;
        }

        let mut next = inner.modules.clone();
        apply_staged(&mut next, &staged);
        let previous = std::mem::replace(&mut inner.modules, next);
        let snapshot = inner.snapshot();
        drop(inner);

        if let Err(e) = self.persist(&snapshot) {
            warn!("mock store: failed to persist state: {e}");
            self.lock().modules = previous;
            return STATUS_ERR;
        }
        debug!("mock store: committed {} staged change(s)", staged.len());
        STATUS_OK
    }
}
