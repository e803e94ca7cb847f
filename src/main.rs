//! Stratus CLI entrypoint.
//!
//! This is the main entrypoint for the stratus command-line tool.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use stratus::cli::{Cli, Commands, OutputFormatter, StateCommands};
use stratus::config::{find_config_file, ConfigParser, ConfigValidator, ResourceDecl};
use stratus::error::Result;
use stratus::graph::DependencyGraph;
use stratus::planner::{DiffEngine, Executor, Plan};
use stratus::provider::ProviderRegistry;
use stratus::state::{DeploymentUnitState, LocalStateStore, StateStore};
use stratus::{DeclHasher, DeployConfig};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply { yes } => cmd_apply(cli.config.as_ref(), yes, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
        Commands::Graph => cmd_graph(cli.config.as_ref(), &formatter),
        Commands::Outputs { name } => {
            cmd_outputs(cli.config.as_ref(), name.as_deref(), &formatter).await
        }
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Stratus project in: {}", path.display());

    let config_path = path.join("stratus.deploy.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let config_template = include_str!("../templates/stratus.deploy.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    let gitignore_content = ".env\n.stratus/\n";
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") || !existing.contains(".stratus") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Stratus")?;
            if !existing.contains(".env") {
                writeln!(file, ".env")?;
            }
            if !existing.contains(".stratus") {
                writeln!(file, ".stratus/")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, gitignore_content)?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your provider token");
    eprintln!("  2. Edit stratus.deploy.yaml with your resource declarations");
    eprintln!("  3. Run 'stratus validate' to check your configuration");
    eprintln!("  4. Run 'stratus plan' to see what will be provisioned");
    eprintln!("  5. Run 'stratus apply' to provision your resources");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let (config, config_file) = load_config(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let validator = ConfigValidator::new();
    let result = validator.validate(&config)?;

    if result.is_valid() {
        eprintln!("Configuration is valid!");
        if show_warnings && !result.warnings.is_empty() {
            eprintln!("\nWarnings:");
            for warning in &result.warnings {
                eprintln!("  - {warning}");
            }
        }
    }

    // Ordering problems surface here too, before anything reaches a provider
    let decls = config.declarations();
    let graph = DependencyGraph::build(&decls)?;

    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Resources: {}", config.resources.len());
    eprintln!("  Parameters: {}", config.parameters.len());
    eprintln!("  Order: {}", graph.topo_order().join(" -> "));

    Ok(())
}

/// Show provisioning plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;

    let state = state_store
        .load()
        .await?
        .unwrap_or_else(|| DeploymentUnitState::new(&config.project.name, &config.project.environment));

    let (_decls, plan) = plan_for(&config, &state)?;

    let output = formatter.format_plan(&plan, detailed);
    eprintln!("{output}");

    Ok(())
}

/// Apply the provisioning plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;

    let mut state = state_store
        .load()
        .await?
        .unwrap_or_else(|| DeploymentUnitState::new(&config.project.name, &config.project.environment));

    let (decls, plan) = plan_for(&config, &state)?;

    if plan.is_empty() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    let output = formatter.format_plan(&plan, false);
    eprintln!("{output}");

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let token = ConfigParser::get_provider_token()?;
    let registry = ProviderRegistry::http(&config.provider, &token)?;

    let lock = state_store.acquire_lock("").await?;
    let executor = Executor::new(&registry, &decls, &config.parameters)
        .with_timing(
            Duration::from_secs(config.provider.poll_interval_secs),
            Duration::from_secs(config.provider.stabilize_timeout_secs),
        )
        .with_lock(&lock.lock_id);
    install_cancel_handler(&executor);

    let result = executor.execute(&plan, &mut state, &state_store).await;
    state_store.release_lock(&lock.lock_id).await?;
    let report = result?;

    eprintln!("{}", formatter.format_report(&report));
    Ok(())
}

/// Tear down every provisioned resource.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;

    let Some(mut state) = state_store.load().await? else {
        eprintln!("No state found, nothing to destroy.");
        return Ok(());
    };

    if state.records.is_empty() {
        eprintln!("No resources to destroy.");
        return Ok(());
    }

    // An empty declaration set plans a delete for every recorded resource.
    let empty: BTreeMap<String, ResourceDecl> = BTreeMap::new();
    let graph = DependencyGraph::build(&empty)?;
    let plan = DiffEngine::new().plan(&empty, &graph, &state, "")?;

    let output = formatter.format_plan(&plan, false);
    eprintln!("{output}");

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let token = ConfigParser::get_provider_token()?;
    let registry = ProviderRegistry::http(&config.provider, &token)?;

    let lock = state_store.acquire_lock("").await?;
    let executor = Executor::new(&registry, &empty, &config.parameters)
        .with_timing(
            Duration::from_secs(config.provider.poll_interval_secs),
            Duration::from_secs(config.provider.stabilize_timeout_secs),
        )
        .with_lock(&lock.lock_id);
    install_cancel_handler(&executor);

    let result = executor.execute(&plan, &mut state, &state_store).await;
    state_store.release_lock(&lock.lock_id).await?;
    let report = result?;

    eprintln!("{}", formatter.format_report(&report));

    if report.is_success() && state.records.is_empty() {
        state_store.delete().await?;
        eprintln!("All resources destroyed.");
    }

    Ok(())
}

/// Show the dependency graph.
fn cmd_graph(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, _config_file) = load_config(config_path)?;

    let decls = config.declarations();
    let graph = DependencyGraph::build(&decls)?;

    eprintln!("{}", formatter.format_graph(&graph));
    Ok(())
}

/// Show output attributes of provisioned resources.
async fn cmd_outputs(
    config_path: Option<&PathBuf>,
    name: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path)?;

    let Some(state) = state_store.load().await? else {
        eprintln!("No state found.");
        return Ok(());
    };

    eprintln!("{}", formatter.format_outputs(&state, name));
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path)?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                eprintln!("{}", formatter.format_state(&state));
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder_str = holder.as_deref().unwrap_or("");
            let lock = state_store.acquire_lock(holder_str).await?;
            eprintln!("State locked: {}", lock.lock_id);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = state_store.get_lock_info().await? {
                    state_store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads and parses the configuration, with `.env` and environment
/// overrides applied.
fn load_config(config_path: Option<&PathBuf>) -> Result<(DeployConfig, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    Ok((config, config_file))
}

/// Loads configuration and creates the state store next to it.
fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(DeployConfig, Box<dyn StateStore>)> {
    let (config, config_file) = load_config(config_path)?;

    let validator = ConfigValidator::new();
    validator.validate(&config)?;

    let state_dir = config.state.path.as_ref().map_or_else(
        || {
            config_file
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."))
                .join(".stratus")
        },
        PathBuf::from,
    );
    let state_store: Box<dyn StateStore> = Box::new(LocalStateStore::with_base_dir(state_dir));

    Ok((config, state_store))
}

/// Builds the declaration map, dependency graph, and plan for a run.
fn plan_for(
    config: &DeployConfig,
    state: &DeploymentUnitState,
) -> Result<(BTreeMap<String, ResourceDecl>, Plan)> {
    let decls = config.declarations();
    let graph = DependencyGraph::build(&decls)?;
    let config_hash = DeclHasher::new().hash_config(config);
    let plan = DiffEngine::new().plan(&decls, &graph, state, &config_hash)?;
    Ok((decls, plan))
}

/// Prompts on stderr and compares the trimmed reply against `expected`
/// (case-insensitively).
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Sets the executor's cancel flag on Ctrl-C, letting the in-flight action
/// finish and commit before the run stops.
fn install_cancel_handler(executor: &Executor<'_>) {
    let cancel = executor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancellation requested, finishing the current action...");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });
}
