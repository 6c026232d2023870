//! Drives `SemoduleBackend` against stand-in `semodule` shell scripts.
//!
//! Kept to a single test so no other test in this binary forks while a
//! script file is still open for writing.

use semod_store::status::{MANAGED, NOT_MANAGED, STATUS_ERR, STATUS_OK};
use semod_store::{ModuleRecord, PolicyStoreBackend, SemoduleBackend};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn semodule_backend_against_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("invocations.log");

    let ok = write_script(
        dir.path(),
        "semodule-ok",
        &format!(
            r#"echo "$@" >> "{}"
case "$*" in
  *--list-modules=full*) printf '100 xen pp disabled\n100 apache pp\n' ;;
esac
exit 0
"#,
            log.display()
        ),
    );

    let backend = SemoduleBackend::with_binary(&ok);
    assert!(backend.available());

    let h = backend.create_handle().unwrap();
    assert_eq!(backend.select_store(h, "targeted"), STATUS_OK);
    assert_eq!(backend.is_managed(h), MANAGED);
    assert_eq!(backend.connect(h), STATUS_OK);

    let modules = backend.list_modules(h).unwrap();
    assert_eq!(
        modules,
        vec![
            ModuleRecord::new("apache", "100", true),
            ModuleRecord::new("xen", "100", false),
        ]
    );

    assert_eq!(backend.enable(h, "xen"), STATUS_OK);
    assert_eq!(backend.remove(h, "apache"), STATUS_OK);
    assert_eq!(backend.commit(h), STATUS_OK);
    backend.destroy_handle(h);

    let invocations = fs::read_to_string(&log).unwrap();
    let last = invocations.lines().last().unwrap();
    assert_eq!(last, "-s targeted -e xen -r apache");
    assert!(invocations
        .lines()
        .all(|l| l.starts_with("-s targeted")));

    let failing = write_script(dir.path(), "semodule-fail", "echo boom >&2\nexit 1\n");
    let backend = SemoduleBackend::with_binary(&failing);

    let h = backend.create_handle().unwrap();
    assert_eq!(backend.is_managed(h), NOT_MANAGED);
    assert_eq!(backend.connect(h), STATUS_OK);
    assert_eq!(backend.list_modules(h), Err(STATUS_ERR));
    assert_eq!(backend.disable(h, "xen"), STATUS_OK);
    assert_eq!(backend.commit(h), STATUS_ERR);
    backend.destroy_handle(h);
}
