//! Lev CLI - operator commands for background processes and capabilities
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lev_core::capabilities::CapabilityRegistry;
use lev_core::config::LevConfig;
use lev_core::error::IntoErrorResponse;
use lev_supervisor::{
    BackgroundSupervisor, DEFAULT_SIGNAL, LaunchSpec, LogTail, Preset, ProcessFilter,
    ProcessState, ProcessStats, ProcessSupervisor, StatusOptions, register_process_capabilities,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lev")]
#[command(about = "Lev control plane CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Additional configuration file layered over lev.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long, global = true, env = "LEV_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Background process commands
    Process {
        #[command(subcommand)]
        command: ProcessCommands,
    },
    /// Capability registry commands
    Capability {
        #[command(subcommand)]
        command: CapabilityCommands,
    },
    /// Version information
    Version,
}

#[derive(Subcommand)]
enum ProcessCommands {
    /// Start a detached background process
    Start {
        /// Shell command line
        command: String,
        /// Working directory (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Process type (dev-server, build, test, ...)
        #[arg(long = "type", default_value = lev_supervisor::DEFAULT_PROCESS_TYPE)]
        process_type: String,
        /// Human-readable description
        #[arg(long)]
        description: Option<String>,
        /// Task this process belongs to
        #[arg(long)]
        task: Option<String>,
    },
    /// Start the project's dev server (pnpm run dev)
    DevServer {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Start the project's build (pnpm run build)
    Build {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Start the project's tests (pnpm test unless overridden)
    Test {
        #[command(flatten)]
        project: ProjectArgs,
        /// Test command line
        #[arg(long = "command")]
        test_command: Option<String>,
    },
    /// Get process status
    Status {
        /// Process ID
        id: String,
        /// Include the last N log lines (configured default when N is omitted)
        #[arg(long)]
        tail: Option<Option<usize>>,
    },
    /// Send a signal to a process
    Kill {
        /// Process ID
        id: String,
        /// Signal name or number
        #[arg(long, default_value = DEFAULT_SIGNAL)]
        signal: String,
    },
    /// List processes
    List {
        /// Only running or only stopped processes
        #[arg(long)]
        status: Option<ProcessState>,
        /// Only processes of this type
        #[arg(long = "type")]
        process_type: Option<String>,
        /// Only processes of this task
        #[arg(long)]
        task: Option<String>,
    },
    /// Delete the record of a stopped process
    Forget {
        /// Process ID
        id: String,
        /// Also delete the captured log
        #[arg(long)]
        remove_log: bool,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long)]
    project: Option<PathBuf>,
    /// Task this process belongs to
    #[arg(long)]
    task: Option<String>,
}

#[derive(Subcommand)]
enum CapabilityCommands {
    /// List registered capabilities
    List,
    /// Dispatch a capability
    Call {
        /// Capability name
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run health checks
    Health,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a result or its structured error; errors yield a failing exit code
fn emit<T: Serialize, E: IntoErrorResponse>(result: std::result::Result<T, E>) -> Result<ExitCode> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let response = err.to_response();
            tracing::debug!(kind = %response.kind, "Command failed");
            print_json(&json!({ "error": response }))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(cli: &Cli) -> Result<LevConfig> {
    let mut config =
        LevConfig::load_with(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(state_dir) = &cli.state_dir {
        config.supervisor.state_dir = state_dir.clone();
    }
    Ok(config)
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to read current directory")
}

async fn start_preset(
    supervisor: &ProcessSupervisor,
    preset: Preset,
    project: ProjectArgs,
    command: Option<&str>,
) -> Result<ExitCode> {
    let project_path = match project.project {
        Some(path) => path,
        None => current_dir()?,
    };
    let mut spec = preset.launch(project_path, command);
    if let Some(task) = project.task {
        spec = spec.with_task(task);
    }
    emit(supervisor.start_process(spec).await)
}

fn init_tracing(config: &LevConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_process(supervisor: &ProcessSupervisor, command: ProcessCommands) -> Result<ExitCode> {
    match command {
        ProcessCommands::Start {
            command,
            cwd,
            process_type,
            description,
            task,
        } => {
            let cwd = match cwd {
                Some(cwd) => cwd,
                None => current_dir()?,
            };
            let mut spec = LaunchSpec::new(command, cwd).with_type(process_type);
            if let Some(description) = description {
                spec = spec.with_description(description);
            }
            if let Some(task) = task {
                spec = spec.with_task(task);
            }
            emit(supervisor.start_process(spec).await)
        }
        ProcessCommands::DevServer { project } => {
            start_preset(supervisor, Preset::DevServer, project, None).await
        }
        ProcessCommands::Build { project } => {
            start_preset(supervisor, Preset::Build, project, None).await
        }
        ProcessCommands::Test {
            project,
            test_command,
        } => start_preset(supervisor, Preset::Test, project, test_command.as_deref()).await,
        ProcessCommands::Status { id, tail } => {
            let tail = match tail {
                None => LogTail::Off,
                Some(None) => LogTail::Default,
                Some(Some(lines)) => LogTail::Lines(lines),
            };
            emit(supervisor.get_process_status(&id, StatusOptions { tail }).await)
        }
        ProcessCommands::Kill { id, signal } => {
            emit(supervisor.kill_process_with(&id, &signal).await)
        }
        ProcessCommands::List {
            status,
            process_type,
            task,
        } => {
            let filter = ProcessFilter {
                status,
                process_type,
                task_id: task,
            };
            emit(
                supervisor
                    .list_processes(&filter)
                    .await
                    .map(|processes| {
                        let stats = ProcessStats::from_listings(&processes);
                        json!({ "count": processes.len(), "stats": stats, "processes": processes })
                    }),
            )
        }
        ProcessCommands::Forget { id, remove_log } => {
            emit(supervisor.forget_process(&id, remove_log).await)
        }
    }
}

async fn run_capability(
    supervisor: ProcessSupervisor,
    command: CapabilityCommands,
) -> Result<ExitCode> {
    let registry = CapabilityRegistry::new();
    register_process_capabilities(&registry, Arc::new(supervisor))
        .await
        .context("Failed to register process capabilities")?;

    match command {
        CapabilityCommands::List => {
            print_json(&registry.list().await)?;
            Ok(ExitCode::SUCCESS)
        }
        CapabilityCommands::Call { name, args } => {
            let args: Value = serde_json::from_str(&args).context("--args is not valid JSON")?;
            emit(registry.dispatch(&name, args).await)
        }
        CapabilityCommands::Health => {
            let health = registry.health_check().await;
            print_json(&health)?;
            Ok(if health.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config);

    match cli.command {
        Commands::Version => {
            print_json(&json!({
                "lev": env!("CARGO_PKG_VERSION"),
                "lev-core": lev_core::VERSION,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Process { command } => {
            let supervisor = ProcessSupervisor::from_config(&config)
                .context("Failed to open process state directory")?;
            run_process(&supervisor, command).await
        }
        Commands::Capability { command } => {
            let supervisor = ProcessSupervisor::from_config(&config)
                .context("Failed to open process state directory")?;
            run_capability(supervisor, command).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_status_tail_forms() {
        let cli = Cli::parse_from(["lev", "process", "status", "proc-1-a"]);
        assert!(matches!(
            cli.command,
            Commands::Process { command: ProcessCommands::Status { tail: None, .. } }
        ));

        let cli = Cli::parse_from(["lev", "process", "status", "proc-1-a", "--tail"]);
        assert!(matches!(
            cli.command,
            Commands::Process { command: ProcessCommands::Status { tail: Some(None), .. } }
        ));

        let cli = Cli::parse_from(["lev", "process", "status", "proc-1-a", "--tail", "5"]);
        assert!(matches!(
            cli.command,
            Commands::Process { command: ProcessCommands::Status { tail: Some(Some(5)), .. } }
        ));
    }

    #[test]
    fn test_preset_commands_parse() {
        let cli = Cli::parse_from(["lev", "process", "dev-server", "--project", "/srv/app", "--task", "t1"]);
        match cli.command {
            Commands::Process {
                command: ProcessCommands::DevServer { project },
            } => {
                assert_eq!(project.project, Some(PathBuf::from("/srv/app")));
                assert_eq!(project.task.as_deref(), Some("t1"));
            }
            _ => panic!("expected dev-server"),
        }

        let cli = Cli::parse_from(["lev", "process", "test", "--command", "cargo test"]);
        assert!(matches!(
            cli.command,
            Commands::Process {
                command: ProcessCommands::Test { test_command: Some(ref c), .. }
            } if c == "cargo test"
        ));
    }

    #[test]
    fn test_list_parses_status_filter() {
        let cli = Cli::parse_from(["lev", "--state-dir", "/tmp/lev", "process", "list", "--status", "running"]);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/lev")));
        assert!(matches!(
            cli.command,
            Commands::Process {
                command: ProcessCommands::List { status: Some(ProcessState::Running), .. }
            }
        ));
    }
}
