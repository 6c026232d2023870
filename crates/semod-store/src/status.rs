//! Raw status codes reported by the policy store subsystem.
//!
//! Values follow libsemanage: non-negative means success, negative values are
//! errors, and two specific negative values mean the requested state already
//! holds.

/// Generic success.
pub const STATUS_OK: i32 = 0;

/// Generic failure.
pub const STATUS_ERR: i32 = -1;

/// `remove` on a module that is not installed.
pub const STATUS_MODULE_ABSENT: i32 = -2;

/// `enable` on an enabled module, or `disable` on a disabled one.
pub const STATUS_ALREADY_IN_STATE: i32 = -3;

/// `access_check` result: the store can be read.
pub const ACCESS_CAN_READ: i32 = 1;

/// `access_check` result: the store can be written.
pub const ACCESS_CAN_WRITE: i32 = 2;

/// `is_managed` result for a managed store.
pub const MANAGED: i32 = 1;

/// `is_managed` result for a store that is not managed.
pub const NOT_MANAGED: i32 = 0;
