use crate::status::{ACCESS_CAN_READ, ACCESS_CAN_WRITE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One installed policy module as reported by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub version: String,
    pub enabled: bool,
}

impl ModuleRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            enabled,
        }
    }
}

/// Access the current process has to a policy store, ordered from least to most.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    None,
    Read,
    Write,
}

impl AccessLevel {
    /// Translate a raw `access_check` status.
    pub fn from_raw(rc: i32) -> Self {
        if rc >= ACCESS_CAN_WRITE {
            AccessLevel::Write
        } else if rc >= ACCESS_CAN_READ {
            AccessLevel::Read
        } else {
            AccessLevel::None
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            AccessLevel::None => 0,
            AccessLevel::Read => ACCESS_CAN_READ,
            AccessLevel::Write => ACCESS_CAN_WRITE,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::None => write!(f, "none"),
            AccessLevel::Read => write!(f, "read"),
            AccessLevel::Write => write!(f, "write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_ordered() {
        assert!(AccessLevel::None < AccessLevel::Read);
        assert!(AccessLevel::Read < AccessLevel::Write);
    }

    #[test]
    fn access_from_raw() {
        assert_eq!(AccessLevel::from_raw(-1), AccessLevel::None);
        assert_eq!(AccessLevel::from_raw(0), AccessLevel::None);
        assert_eq!(AccessLevel::from_raw(1), AccessLevel::Read);
        assert_eq!(AccessLevel::from_raw(2), AccessLevel::Write);
        assert_eq!(AccessLevel::from_raw(7), AccessLevel::Write);
    }

    #[test]
    fn access_raw_roundtrip() {
        for level in [AccessLevel::None, AccessLevel::Read, AccessLevel::Write] {
            assert_eq!(AccessLevel::from_raw(level.to_raw()), level);
        }
    }

    #[test]
    fn record_serializes_flat() {
        let rec = ModuleRecord::new("xen", "1.1.0", false);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["name"], "xen");
        assert_eq!(json["version"], "1.1.0");
        assert_eq!(json["enabled"], false);
    }
}
