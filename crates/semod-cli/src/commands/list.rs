use super::{colorize_state, json_pretty, CommandError, EXIT_SUCCESS};
use semod_core::Orchestrator;

pub fn run(orch: &Orchestrator, store: &str, json: bool) -> Result<u8, CommandError> {
    let modules = orch.list(store)?;
    if json {
        println!("{}", json_pretty(&modules)?);
    } else if modules.is_empty() {
        println!("no modules installed");
    } else {
        println!("{:<32} {:<12} STATE", "NAME", "VERSION");
        for module in &modules {
            println!(
                "{:<32} {:<12} {}",
                module.name,
                module.version,
                colorize_state(module.enabled)
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
