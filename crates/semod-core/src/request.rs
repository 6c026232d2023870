use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Desired end state of a module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Enabled,
    Disabled,
    Present,
    Absent,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Enabled => write!(f, "enabled"),
            TargetState::Disabled => write!(f, "disabled"),
            TargetState::Present => write!(f, "present"),
            TargetState::Absent => write!(f, "absent"),
        }
    }
}

impl FromStr for TargetState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(TargetState::Enabled),
            "disabled" => Ok(TargetState::Disabled),
            "present" => Ok(TargetState::Present),
            "absent" => Ok(TargetState::Absent),
            other => Err(CoreError::InvalidRequest(format!(
                "unknown state '{other}' (expected enabled, disabled, present or absent)"
            ))),
        }
    }
}

/// Desired state for one module, as handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleRequest {
    pub name: String,
    pub state: TargetState,
    /// Module package to install. Only meaningful for `present`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Store to operate on; empty selects the default store.
    #[serde(default)]
    pub store: String,
}

impl ModuleRequest {
    pub fn new(name: impl Into<String>, state: TargetState) -> Self {
        Self {
            name: name.into(),
            state,
            path: None,
            store: String::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    /// Load a request from a JSON argument file such as
    /// `{"name": "xen", "state": "present", "path": "/pkgs/xen.pp"}`.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::InvalidRequest(format!("cannot parse {}: {e}", path.display()))
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_module_name(&self.name)?;
        match (self.state, &self.path) {
            (TargetState::Present, None) => Err(CoreError::InvalidRequest(
                "state is present but no module package path was given".to_owned(),
            )),
            (TargetState::Present, Some(p)) if p.as_os_str().is_empty() => Err(
                CoreError::InvalidRequest("module package path is empty".to_owned()),
            ),
            (TargetState::Enabled | TargetState::Disabled | TargetState::Absent, Some(_)) => {
                Err(CoreError::InvalidRequest(format!(
                    "a package path is only accepted with state present, not {}",
                    self.state
                )))
            }
            _ => Ok(()),
        }
    }
}

pub fn validate_module_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > 255 {
        return Err(CoreError::InvalidRequest(
            "module name must be 1-255 characters".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(CoreError::InvalidRequest(format!(
            "module name '{name}' must match [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}
