use crate::handle::StoreHandle;
use crate::CoreError;
use tracing::info;

/// Apply everything staged on `handle`. A failed commit is final; the store
/// is left however the subsystem leaves it.
pub fn commit(handle: &StoreHandle<'_>) -> Result<(), CoreError> {
    let rc = handle.backend().commit(handle.id());
    if rc < 0 {
        return Err(CoreError::Commit(rc));
    }
    info!("committed policy store transaction on handle {}", handle.id());
    Ok(())
}
