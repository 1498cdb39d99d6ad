use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use kiln::config::CliOverrides;
use kiln::deps::InstallPolicy;
use kiln::errors::KilnError;
use kiln::init::find_project_root;
use kiln::restart::{RESTART_ENV, SUPERVISED_ENV, marker_is_set, supervise};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

fn parse_install_mode(value: &str) -> Result<InstallPolicy, KilnError> {
    value.parse()
}

#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about = "Project command runner with shared, auto-installed dependencies")]
pub struct Cli {
    /// Verbose logging and full error chains
    #[arg(long, global = true)]
    pub debug: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    /// Directory to start the .kiln/ search from (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Shared home directory. Overrides KILN_HOME and kiln.toml.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// What to do with missing dependencies: auto, manual, ask
    #[arg(long, global = true, value_parser = parse_install_mode)]
    pub install_mode: Option<InstallPolicy>,

    /// Never run the package manager
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new kiln project
    Init,
    /// Inspect and install declared dependencies
    Deps {
        #[command(subcommand)]
        command: DepsCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Read and write project state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// List registered commands
    Commands,
    /// Run a registered command
    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Subcommand, Clone)]
pub enum DepsCommands {
    /// Show declared dependencies and the shared-home manifest
    List,
    /// Apply the configured install policy
    Sync,
    /// Install missing dependencies regardless of policy
    Install,
    /// Declare a dependency in kiln.toml and install it
    Add {
        /// e.g. left-pad@^1.3.0, file:../shared, git+https://host/repo.git#main
        spec: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default kiln.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum StateCommands {
    /// Print the value stored under KEY
    Get { key: String },
    /// Store VALUE (JSON, or a plain string) under KEY
    Set { key: String, value: String },
    /// Remove KEY
    Unset { key: String },
    /// List all entries
    List,
    /// Remove all entries
    Clear,
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn env_marker(name: &str) -> bool {
    marker_is_set(std::env::var(name).ok().as_deref())
}

/// Re-run this executable as a supervised worker.
async fn run_wrapper() -> Result<i32> {
    let program = std::env::current_exe().context("Failed to locate the kiln executable")?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    supervise(&program, &args, env_marker(RESTART_ENV)).await
}

async fn run_worker(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let start_dir = match cli.project_dir.clone() {
        Some(dir) => cwd.join(dir),
        None => cwd.clone(),
    };
    let session = cmd::Session {
        project_dir: find_project_root(&start_dir),
        overrides: CliOverrides {
            install_mode: cli.install_mode,
            offline: cli.offline.then_some(true),
            home: cli.home.clone(),
        }
        .relative_to(&cwd),
        restarted: env_marker(RESTART_ENV),
        yes: cli.yes,
    };
    tracing::debug!(project_dir = %session.project_dir.display(), restarted = session.restarted, "worker starting");

    match cli.command {
        Commands::Init => cmd::cmd_init(&start_dir).map(|()| 0),
        Commands::Deps { command } => cmd::cmd_deps(&session, command).await,
        Commands::Config { command } => cmd::cmd_config(&session, command).map(|()| 0),
        Commands::State { command } => cmd::cmd_state(&session, command).map(|()| 0),
        Commands::Commands => cmd::cmd_commands(&session).await,
        Commands::External(args) => cmd::cmd_external(&session, args).await,
    }
}

fn report(err: &anyhow::Error, debug: bool) -> i32 {
    if debug {
        eprintln!("{} {:?}", style("error:").red().bold(), err);
    } else {
        eprintln!("{} {}", style("error:").red().bold(), err);
    }
    err.chain()
        .find_map(|cause| cause.downcast_ref::<KilnError>())
        .map(KilnError::exit_code)
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;
    kiln::logging::init(debug);

    let result = if env_marker(SUPERVISED_ENV) {
        run_worker(cli).await
    } else {
        run_wrapper().await
    };

    match result {
        Ok(code) => exit_code(code),
        Err(err) => exit_code(report(&err, debug)),
    }
}
