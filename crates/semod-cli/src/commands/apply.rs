use super::{json_pretty, spin_fail, spin_ok, spinner, CommandError, EXIT_SUCCESS};
use semod_core::{ApplyOutcome, ModuleRequest, Orchestrator, RunMode};

pub fn run(
    orch: &Orchestrator,
    request: &ModuleRequest,
    mode: RunMode,
    json: bool,
) -> Result<u8, CommandError> {
    let pb = if json {
        None
    } else {
        Some(spinner(&format!("managing module {}...", request.name)))
    };

    match orch.apply(request, mode) {
        Ok(outcome) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "done");
            }
            if json {
                println!("{}", json_pretty(&outcome)?);
            } else {
                println!("{}", summary(&outcome));
            }
            Ok(EXIT_SUCCESS)
        }
        Err(err) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "failed");
            }
            if json {
                let failure = serde_json::json!({
                    "name": request.name,
                    "state": request.state,
                    "changed": false,
                    "failed": true,
                    "msg": err.to_string(),
                });
                println!("{}", json_pretty(&failure)?);
            }
            Err(err.into())
        }
    }
}

fn summary(outcome: &ApplyOutcome) -> String {
    let suffix = if outcome.check_mode { " (check mode)" } else { "" };
    if outcome.changed {
        format!("changed: module {} {}{suffix}", outcome.name, outcome.state)
    } else {
        format!("ok: module {} already {}{suffix}", outcome.name, outcome.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semod_core::TargetState;

    fn outcome(changed: bool, check_mode: bool) -> ApplyOutcome {
        ApplyOutcome {
            name: "xen".to_owned(),
            state: TargetState::Enabled,
            changed,
            check_mode,
        }
    }

    #[test]
    fn summary_reports_change() {
        assert_eq!(summary(&outcome(true, false)), "changed: module xen enabled");
    }

    #[test]
    fn summary_reports_noop() {
        assert_eq!(summary(&outcome(false, false)), "ok: module xen already enabled");
    }

    #[test]
    fn summary_marks_check_mode() {
        assert!(summary(&outcome(true, true)).ends_with("(check mode)"));
    }
}
