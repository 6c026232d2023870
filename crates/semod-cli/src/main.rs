mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::CommandError;
use semod_core::{
    install_signal_handler, CoreError, ModuleRequest, Orchestrator, RunMode, SemodConfig,
    TargetState,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "semod",
    version,
    about = "Install, remove, enable and disable SELinux policy modules"
)]
struct Cli {
    /// Path to the semod configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store backend to use (semodule or mock).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Name of the policy store to operate on (default store when omitted).
    #[arg(long, global = true)]
    store: Option<String>,

    /// State file for the mock backend.
    #[arg(long, global = true)]
    mock_state: Option<PathBuf>,

    /// Report what would change without modifying the policy store.
    #[arg(long, default_value_t = false, global = true)]
    check: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bring a module to the desired state.
    Apply {
        /// Module name.
        #[arg(long, required_unless_present = "request")]
        name: Option<String>,
        /// Desired state: enabled, disabled, present or absent.
        #[arg(long, required_unless_present = "request")]
        state: Option<TargetState>,
        /// Module package to install (required for state present).
        #[arg(long)]
        path: Option<PathBuf>,
        /// JSON file holding the whole request ({"name", "state", "path", "store"}).
        #[arg(long, conflicts_with_all = ["name", "state", "path"])]
        request: Option<PathBuf>,
    },
    /// Enable an installed module.
    Enable {
        /// Module name.
        name: String,
    },
    /// Disable an installed module.
    Disable {
        /// Module name.
        name: String,
    },
    /// Install a module from a policy package unless it is already installed.
    Install {
        /// Module name.
        name: String,
        /// Path to the module package (.pp or .pp.bz2).
        path: PathBuf,
    },
    /// Remove an installed module.
    Remove {
        /// Module name.
        name: String,
    },
    /// List installed modules.
    List,
    /// Show version and enabled state of modules.
    Facts {
        /// Modules to report on (all installed modules when omitted).
        names: Vec<String>,
    },
    /// Run diagnostic checks on the host and policy store.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SEMOD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let result = run(cli);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.code)
        }
    }
}

fn run(cli: Cli) -> Result<u8, CommandError> {
    let config = load_config(&cli);
    let mode = if cli.check {
        RunMode::Check
    } else {
        RunMode::Apply
    };
    let json = cli.json;

    let mut request = match cli.command {
        Commands::Completions { shell } => return Ok(commands::completions::run::<Cli>(shell)?),
        Commands::ManPages { dir } => return Ok(commands::man_pages::run::<Cli>(&dir)?),
        Commands::List => {
            let (config, orch) = open(config)?;
            return commands::list::run(&orch, &config.store, json);
        }
        Commands::Facts { names } => {
            let (config, orch) = open(config)?;
            return commands::facts::run(&orch, &config.store, &names, json);
        }
        Commands::Doctor => {
            let (config, orch) = open(config)?;
            return Ok(commands::doctor::run(&orch, &config, json)?);
        }
        Commands::Apply {
            request: Some(file),
            ..
        } => ModuleRequest::from_json_file(&file)?,
        Commands::Apply {
            name, state, path, ..
        } => {
            let (Some(name), Some(state)) = (name, state) else {
                return Err(CoreError::InvalidRequest(
                    "--name and --state are required".to_owned(),
                )
                .into());
            };
            let mut req = ModuleRequest::new(name, state);
            req.path = path;
            req
        }
        Commands::Enable { name } => ModuleRequest::new(name, TargetState::Enabled),
        Commands::Disable { name } => ModuleRequest::new(name, TargetState::Disabled),
        Commands::Install { name, path } => {
            ModuleRequest::new(name, TargetState::Present).with_path(path)
        }
        Commands::Remove { name } => ModuleRequest::new(name, TargetState::Absent),
    };

    let (config, orch) = open(config)?;
    if request.store.is_empty() {
        request.store.clone_from(&config.store);
    }
    commands::apply::run(&orch, &request, mode, json)
}

fn open(
    config: Result<SemodConfig, CoreError>,
) -> Result<(SemodConfig, Orchestrator), CoreError> {
    let config = config?;
    let orch = Orchestrator::from_config(&config)?;
    Ok((config, orch))
}

fn load_config(cli: &Cli) -> Result<SemodConfig, CoreError> {
    let mut config = match &cli.config {
        Some(path) => SemodConfig::load(path),
        None => SemodConfig::load_default(),
    }?;

    if let Some(backend) = &cli.backend {
        config.backend.clone_from(backend);
    }
    if let Some(store) = &cli.store {
        config.store.clone_from(store);
    }
    if let Some(state) = &cli.mock_state {
        config.mock_state = Some(state.clone());
    }
    Ok(config)
}
