use semod_store::status::{STATUS_ALREADY_IN_STATE, STATUS_MODULE_ABSENT};
use std::fmt;

/// The four mutating store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Enable,
    Disable,
    Install,
    Remove,
}

impl OpKind {
    /// The negative status meaning "the store is already in the target state".
    fn already_in_state_code(self) -> Option<i32> {
        match self {
            OpKind::Enable | OpKind::Disable => Some(STATUS_ALREADY_IN_STATE),
            OpKind::Remove => Some(STATUS_MODULE_ABSENT),
            OpKind::Install => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Enable => write!(f, "enable"),
            OpKind::Disable => write!(f, "disable"),
            OpKind::Install => write!(f, "install"),
            OpKind::Remove => write!(f, "remove"),
        }
    }
}

/// Typed result of a mutating store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// A change was staged and needs a commit.
    Mutated,
    /// The store reported the target state already holds. Nothing was
    /// staged, so the operation skips the commit and reports `changed = false`
    /// even though the catalog had predicted a change. A remove answered
    /// with "module absent" is treated the same way.
    AlreadyInState,
    Failed(i32),
}

impl OpStatus {
    pub fn classify(kind: OpKind, rc: i32) -> Self {
        if rc >= 0 {
            OpStatus::Mutated
        } else if kind.already_in_state_code() == Some(rc) {
            OpStatus::AlreadyInState
        } else {
            OpStatus::Failed(rc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_negative_is_mutated() {
        for kind in [OpKind::Enable, OpKind::Disable, OpKind::Install, OpKind::Remove] {
            assert_eq!(OpStatus::classify(kind, 0), OpStatus::Mutated);
            assert_eq!(OpStatus::classify(kind, 3), OpStatus::Mutated);
        }
    }

    #[test]
    fn toggle_already_code() {
        assert_eq!(OpStatus::classify(OpKind::Enable, -3), OpStatus::AlreadyInState);
        assert_eq!(OpStatus::classify(OpKind::Disable, -3), OpStatus::AlreadyInState);
        assert_eq!(OpStatus::classify(OpKind::Enable, -2), OpStatus::Failed(-2));
    }

    #[test]
    fn remove_already_code() {
        assert_eq!(OpStatus::classify(OpKind::Remove, -2), OpStatus::AlreadyInState);
        assert_eq!(OpStatus::classify(OpKind::Remove, -3), OpStatus::Failed(-3));
    }

    #[test]
    fn install_has_no_already_code() {
        assert_eq!(OpStatus::classify(OpKind::Install, -2), OpStatus::Failed(-2));
        assert_eq!(OpStatus::classify(OpKind::Install, -3), OpStatus::Failed(-3));
    }
}
