//! Read-only queries over the modules installed in a store.
//!
//! Every query enumerates the store afresh. Nothing is cached between calls,
//! since another process may change the store at any time.

use crate::handle::StoreHandle;
use crate::CoreError;
use semod_store::ModuleRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version and enabled state of one installed module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleFacts {
    pub version: String,
    pub enabled: bool,
}

impl From<&ModuleRecord> for ModuleFacts {
    fn from(record: &ModuleRecord) -> Self {
        Self {
            version: record.version.clone(),
            enabled: record.enabled,
        }
    }
}

pub fn list_all(handle: &StoreHandle<'_>) -> Result<Vec<ModuleRecord>, CoreError> {
    handle
        .backend()
        .list_modules(handle.id())
        .map_err(CoreError::CatalogList)
}

pub fn lookup(handle: &StoreHandle<'_>, name: &str) -> Result<Option<ModuleRecord>, CoreError> {
    Ok(list_all(handle)?.into_iter().find(|m| m.name == name))
}

/// Whether `name` is enabled. A module that is not installed has no
/// enabled state and yields `ModuleNotFound`.
pub fn is_enabled(handle: &StoreHandle<'_>, name: &str) -> Result<bool, CoreError> {
    lookup(handle, name)?
        .map(|m| m.enabled)
        .ok_or_else(|| CoreError::ModuleNotFound(name.to_owned()))
}

/// Whether `name` is installed. Absence is `Ok(false)`; only a failing
/// enumeration is an error.
pub fn is_installed(handle: &StoreHandle<'_>, name: &str) -> Result<bool, CoreError> {
    Ok(lookup(handle, name)?.is_some())
}

/// Facts for the installed modules among `names`, or for every installed
/// module when `names` is empty. Names that are not installed are omitted.
pub fn facts(
    handle: &StoreHandle<'_>,
    names: &[String],
) -> Result<BTreeMap<String, ModuleFacts>, CoreError> {
    Ok(list_all(handle)?
        .iter()
        .filter(|m| names.is_empty() || names.contains(&m.name))
        .map(|m| (m.name.clone(), ModuleFacts::from(m)))
        .collect())
}
