use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use semod_core::{Orchestrator, SemodConfig, StoreHandle};
use semod_store::AccessLevel;
use std::path::Path;

const SELINUXFS: &str = "/sys/fs/selinux";

pub fn run(orch: &Orchestrator, config: &SemodConfig, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    checks.push(Check::info(
        "backend",
        &format!("Using the {} backend", orch.backend().name()),
    ));

    if orch.backend().available() {
        checks.push(Check::pass("backend_available", "Store backend is available"));
    } else {
        all_pass = false;
        checks.push(Check::fail(
            "backend_available",
            &format!(
                "Backend {} is not available (is {} installed?)",
                orch.backend().name(),
                config.semodule_path.display()
            ),
        ));
    }

    if Path::new(SELINUXFS).exists() {
        checks.push(Check::pass("selinuxfs", "SELinux filesystem is mounted"));
    } else {
        checks.push(Check::warn(
            "selinuxfs",
            &format!("{SELINUXFS} not found (SELinux may be disabled)"),
        ));
    }

    if all_pass {
        check_store(orch, &config.store, &mut checks, &mut all_pass);
    }

    print_results(&checks, all_pass, json_output)
}

fn check_store(orch: &Orchestrator, store: &str, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let label = if store.is_empty() { "default" } else { store };

    match StoreHandle::open_with_access(orch.backend(), store, AccessLevel::Read) {
        Ok(handle) if handle.is_writable() => checks.push(Check::pass(
            "store_access",
            &format!("Store {label} is managed and writable"),
        )),
        Ok(handle) => checks.push(Check::warn(
            "store_access",
            &format!(
                "Store {label} is managed but access is {} (changes need root)",
                handle.access()
            ),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("store_access", &format!("Store {label}: {e}")));
            return;
        }
    }

    match orch.list(store) {
        Ok(modules) => {
            let enabled = modules.iter().filter(|m| m.enabled).count();
            checks.push(Check::info(
                "modules",
                &format!("{} modules installed ({enabled} enabled)", modules.len()),
            ));
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("modules", &format!("Cannot list modules: {e}")));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("semod doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
