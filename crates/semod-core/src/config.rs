use crate::CoreError;
use semod_store::BackendOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/semod/semod.toml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV: &str = "SEMOD_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SemodConfig {
    /// Store backend: `semodule` or `mock`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Store to operate on; empty selects the default store.
    #[serde(default)]
    pub store: String,
    #[serde(default = "default_semodule_path")]
    pub semodule_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_state: Option<PathBuf>,
}

fn default_backend() -> String {
    "semodule".to_owned()
}

fn default_semodule_path() -> PathBuf {
    PathBuf::from("semodule")
}

impl Default for SemodConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            store: String::new(),
            semodule_path: default_semodule_path(),
            mock_state: None,
        }
    }
}

impl SemodConfig {
    /// Load from `$SEMOD_CONFIG` or the default path. A missing default
    /// file yields the defaults; a missing file named explicitly is an error.
    pub fn load_default() -> Result<Self, CoreError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            semodule_path: Some(self.semodule_path.clone()),
            mock_state: self.mock_state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SemodConfig::parse("").unwrap();
        assert_eq!(config, SemodConfig::default());
        assert_eq!(config.backend, "semodule");
        assert!(config.store.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config = SemodConfig::parse(
            r#"
backend = "mock"
store = "mls"
semodule_path = "/usr/sbin/semodule"
mock_state = "/tmp/store.json"
"#,
        )
        .unwrap();
        assert_eq!(config.backend, "mock");
        assert_eq!(config.store, "mls");
        assert_eq!(config.semodule_path, PathBuf::from("/usr/sbin/semodule"));
        assert_eq!(config.mock_state, Some(PathBuf::from("/tmp/store.json")));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(SemodConfig::parse("bakend = \"mock\"").is_err());
    }

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/semod.toml");

        let config = SemodConfig {
            backend: "mock".to_owned(),
            store: "targeted".to_owned(),
            mock_state: Some(dir.path().join("state.json")),
            ..SemodConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SemodConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SemodConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn backend_options_carry_paths() {
        let config = SemodConfig {
            mock_state: Some(PathBuf::from("/tmp/s.json")),
            ..SemodConfig::default()
        };
        let opts = config.backend_options();
        assert_eq!(opts.semodule_path, Some(PathBuf::from("semodule")));
        assert_eq!(opts.mock_state, Some(PathBuf::from("/tmp/s.json")));
    }
}
