use super::{colorize_state, json_pretty, CommandError, EXIT_SUCCESS};
use semod_core::Orchestrator;

/// Report version and enabled state, keyed by module name. Names that are
/// not installed are left out of the map.
pub fn run(orch: &Orchestrator, store: &str, names: &[String], json: bool) -> Result<u8, CommandError> {
    let facts = orch.facts(store, names)?;
    if json {
        let wrapped = serde_json::json!({ "selinux_modules": facts });
        println!("{}", json_pretty(&wrapped)?);
        return Ok(EXIT_SUCCESS);
    }

    for (name, fact) in &facts {
        println!(
            "{name}: version {} ({})",
            fact.version,
            colorize_state(fact.enabled)
        );
    }
    for missing in names.iter().filter(|n| !facts.contains_key(n.as_str())) {
        println!("{missing}: not installed");
    }
    Ok(EXIT_SUCCESS)
}
