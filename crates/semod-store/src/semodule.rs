//! Backend driving the system `semodule(8)` tool.
//!
//! Each handle is a session that remembers the selected store and the
//! arguments staged by enable/disable/install/remove. `commit` runs one
//! `semodule` invocation carrying every staged argument, which libsemanage
//! applies as a single transaction.

use crate::backend::{HandleId, PolicyStoreBackend};
use crate::record::ModuleRecord;
use crate::status::{ACCESS_CAN_READ, ACCESS_CAN_WRITE, MANAGED, NOT_MANAGED, STATUS_ERR, STATUS_OK};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const DEFAULT_BINARY: &str = "semodule";

#[derive(Debug, Default)]
struct CliSession {
    store: Option<String>,
    connected: bool,
    staged: Vec<OsString>,
}

impl CliSession {
    fn store_args(&self) -> Vec<OsString> {
        match &self.store {
            Some(store) => vec!["-s".into(), store.into()],
            None => Vec::new(),
        }
    }
}

pub struct SemoduleBackend {
    binary: PathBuf,
    sessions: Mutex<HashMap<HandleId, CliSession>>,
    next_handle: AtomicU64,
}

impl Default for SemoduleBackend {
    fn default() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }
}

impl SemoduleBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            sessions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<HandleId, CliSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, args: &[OsString]) -> std::io::Result<Output> {
        debug!("running {} {:?}", self.binary.display(), args);
        Command::new(&self.binary).args(args).output()
    }

    fn store_args(&self, handle: HandleId) -> Option<Vec<OsString>> {
        self.sessions().get(&handle).map(CliSession::store_args)
    }

    fn list_raw(&self, handle: HandleId) -> Result<Vec<ModuleRecord>, i32> {
        let mut args = self.store_args(handle).ok_or(STATUS_ERR)?;
        args.push("--list-modules=full".into());
        match self.run(&args) {
            Ok(out) if out.status.success() => {
                Ok(parse_module_listing(&String::from_utf8_lossy(&out.stdout)))
            }
            Ok(out) => {
                debug!(
                    "full listing unsupported, falling back to -l: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                self.list_legacy(handle)
            }
            Err(e) => {
                warn!("cannot execute {}: {e}", self.binary.display());
                Err(STATUS_ERR)
            }
        }
    }

    fn list_legacy(&self, handle: HandleId) -> Result<Vec<ModuleRecord>, i32> {
        let mut args = self.store_args(handle).ok_or(STATUS_ERR)?;
        args.push("-l".into());
        match self.run(&args) {
            Ok(out) if out.status.success() => {
                Ok(parse_module_listing(&String::from_utf8_lossy(&out.stdout)))
            }
            Ok(out) => {
                warn!(
                    "module listing failed: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                Err(STATUS_ERR)
            }
            Err(e) => {
                warn!("cannot execute {}: {e}", self.binary.display());
                Err(STATUS_ERR)
            }
        }
    }

    fn stage(&self, handle: HandleId, flag: &str, operand: OsString) -> i32 {
        let mut sessions = self.sessions();
        match sessions.get_mut(&handle) {
            Some(session) if session.connected => {
                session.staged.push(flag.into());
                session.staged.push(operand);
                STATUS_OK
            }
            _ => STATUS_ERR,
        }
    }
}

/// Parse `semodule --list-modules=full` or legacy `semodule -l` output.
///
/// Full lines look like `100 xen pp disabled`; when a module is installed at
/// several priorities the highest one wins and is reported as the version,
/// since modern stores no longer record module versions. Legacy lines look
/// like `xen 1.1.0 Disabled`.
pub fn parse_module_listing(output: &str) -> Vec<ModuleRecord> {
    let mut by_name: BTreeMap<String, (u32, ModuleRecord)> = BTreeMap::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let disabled = fields
            .iter()
            .skip(1)
            .any(|f| f.eq_ignore_ascii_case("disabled"));

        let (priority, record) = match fields[0].parse::<u32>() {
            Ok(priority) if fields.len() >= 3 => (
                priority,
                ModuleRecord::new(fields[1], priority.to_string(), !disabled),
            ),
            _ => {
                let version = fields
                    .get(1)
                    .filter(|f| !f.eq_ignore_ascii_case("disabled"))
                    .copied()
                    .unwrap_or("");
                (0, ModuleRecord::new(fields[0], version, !disabled))
            }
        };

        match by_name.get(&record.name) {
            Some((existing, _)) if *existing >= priority => {}
            _ => {
                by_name.insert(record.name.clone(), (priority, record));
            }
        }
    }

    by_name.into_values().map(|(_, record)| record).collect()
}

/// Safe wrapper around libc::geteuid().
#[allow(unsafe_code)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

fn command_exists(name: &Path) -> bool {
    if name.components().count() > 1 {
        return name.is_file();
    }
    std::env::var_os("PATH").is_some_and(|path| {
        std::env::split_paths(&path).any(|dir| dir.join(name).is_file())
    })
}

impl PolicyStoreBackend for SemoduleBackend {
    fn name(&self) -> &str {
        "semodule"
    }

    fn available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn create_handle(&self) -> Option<HandleId> {
        let handle = HandleId::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.sessions().insert(handle, CliSession::default());
        Some(handle)
    }

    fn destroy_handle(&self, handle: HandleId) {
        if let Some(session) = self.sessions().remove(&handle) {
            if !session.staged.is_empty() {
                debug!(
                    "discarding {} uncommitted argument(s) for handle {handle}",
                    session.staged.len()
                );
            }
        }
    }

    fn select_store(&self, handle: HandleId, store: &str) -> i32 {
        match self.sessions().get_mut(&handle) {
            Some(session) => {
                session.store = Some(store.to_owned());
                STATUS_OK
            }
            None => STATUS_ERR,
        }
    }

    fn is_managed(&self, handle: HandleId) -> i32 {
        if !self.sessions().contains_key(&handle) {
            return STATUS_ERR;
        }
        match self.list_raw(handle) {
            Ok(_) => MANAGED,
            Err(_) => NOT_MANAGED,
        }
    }

    fn access_check(&self, handle: HandleId) -> i32 {
        if !self.sessions().contains_key(&handle) {
            return STATUS_ERR;
        }
        if effective_uid() == 0 {
            ACCESS_CAN_WRITE
        } else {
            ACCESS_CAN_READ
        }
    }

    fn connect(&self, handle: HandleId) -> i32 {
        match self.sessions().get_mut(&handle) {
            Some(session) => {
                session.connected = true;
                STATUS_OK
            }
            None => STATUS_ERR,
        }
    }

    fn list_modules(&self, handle: HandleId) -> Result<Vec<ModuleRecord>, i32> {
        let connected = self
            .sessions()
            .get(&handle)
            .is_some_and(|s| s.connected);
        if !connected {
            return Err(STATUS_ERR);
        }
        self.list_raw(handle)
    }

    fn enable(&self, handle: HandleId, name: &str) -> i32 {
        self.stage(handle, "-e", name.into())
    }

    fn disable(&self, handle: HandleId, name: &str) -> i32 {
        self.stage(handle, "-d", name.into())
    }

    fn install_file(&self, handle: HandleId, path: &Path) -> i32 {
        self.stage(handle, "-i", path.as_os_str().to_owned())
    }

    fn remove(&self, handle: HandleId, name: &str) -> i32 {
        self.stage(handle, "-r", name.into())
    }

    fn commit(&self, handle: HandleId) -> i32 {
        let args = {
            let mut sessions = self.sessions();
            let Some(session) = sessions.get_mut(&handle).filter(|s| s.connected) else {
                return STATUS_ERR;
            };
            if session.staged.is_empty() {
                return STATUS_OK;
            }
            let mut args = session.store_args();
            args.append(&mut session.staged);
            args
        };

        match self.run(&args) {
            Ok(out) if out.status.success() => {
                info!("semodule transaction committed");
                STATUS_OK
            }
            Ok(out) => {
                warn!(
                    "semodule transaction failed: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                STATUS_ERR
            }
            Err(e) => {
                warn!("cannot execute {}: {e}", self.binary.display());
                STATUS_ERR
            }
        }
    }
}
