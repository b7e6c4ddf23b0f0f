//! Process capabilities exposed through the capability registry

use crate::error::SupervisorError;
use crate::record::{
    LaunchSpec, LogTail, Preset, ProcessFilter, ProcessState, ProcessStats, StatusOptions,
};
use crate::supervisor::{BackgroundSupervisor, DEFAULT_SIGNAL};
use async_trait::async_trait;
use lev_core::capabilities::{CapabilityDefinition, CapabilityHandler, CapabilityRegistry, RegistryResult};
use lev_core::error::{ErrorKind, ErrorResponse, IntoErrorResponse};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;

/// Operations bridged into the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Start,
    Preset(Preset),
    Status,
    Kill,
    List,
    Forget,
}

impl Operation {
    const ALL: [Operation; 8] = [
        Operation::Start,
        Operation::Preset(Preset::DevServer),
        Operation::Preset(Preset::Build),
        Operation::Preset(Preset::Test),
        Operation::Status,
        Operation::Kill,
        Operation::List,
        Operation::Forget,
    ];

    fn name(self) -> &'static str {
        match self {
            Operation::Start => "start_process",
            Operation::Preset(Preset::DevServer) => "start_dev_server",
            Operation::Preset(Preset::Build) => "start_build",
            Operation::Preset(Preset::Test) => "start_test",
            Operation::Status => "get_process_status",
            Operation::Kill => "kill_process",
            Operation::List => "list_processes",
            Operation::Forget => "forget_process",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Operation::Start => "Start a background process (dev server, build, test run) detached from the caller",
            Operation::Preset(Preset::DevServer) => "Start the project's dev server (pnpm run dev) in the background",
            Operation::Preset(Preset::Build) => "Start the project's build (pnpm run build) in the background",
            Operation::Preset(Preset::Test) => "Start the project's tests (pnpm test, or a given command) in the background",
            Operation::Status => "Get status of a background process with optional log tail",
            Operation::Kill => "Send a signal to a background process",
            Operation::List => "List background processes with optional status, type or task filters",
            Operation::Forget => "Delete the record of a stopped background process",
        }
    }

    fn schema(self) -> Value {
        match self {
            Operation::Start => json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Shell command line" },
                    "cwd": { "type": "string", "description": "Working directory" },
                    "type": { "type": "string", "default": "generic" },
                    "description": { "type": "string" },
                    "taskId": { "type": "string" }
                },
                "required": ["command", "cwd"]
            }),
            Operation::Preset(Preset::Test) => json!({
                "type": "object",
                "properties": {
                    "projectPath": { "type": "string", "description": "Project directory (defaults to the current directory)" },
                    "taskId": { "type": "string" },
                    "command": { "type": "string", "description": "Test command line" }
                }
            }),
            Operation::Preset(_) => json!({
                "type": "object",
                "properties": {
                    "projectPath": { "type": "string", "description": "Project directory (defaults to the current directory)" },
                    "taskId": { "type": "string" }
                }
            }),
            Operation::Status => json!({
                "type": "object",
                "properties": {
                    "processId": { "type": "string" },
                    "tail": { "description": "true for the default line count, or a number of lines" }
                },
                "required": ["processId"]
            }),
            Operation::Kill => json!({
                "type": "object",
                "properties": {
                    "processId": { "type": "string" },
                    "signal": { "type": "string", "default": DEFAULT_SIGNAL }
                },
                "required": ["processId"]
            }),
            Operation::List => json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string", "description": "running or stopped" },
                    "type": { "type": "string" },
                    "taskId": { "type": "string" }
                }
            }),
            Operation::Forget => json!({
                "type": "object",
                "properties": {
                    "processId": { "type": "string" },
                    "removeLog": { "type": "boolean", "default": false }
                },
                "required": ["processId"]
            }),
        }
    }
}

/// Registry handler backed by a supervisor
struct SupervisorTool {
    operation: Operation,
    supervisor: Arc<dyn BackgroundSupervisor>,
}

fn invalid_argument(property: &str, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(
        ErrorResponse::new(ErrorKind::Validation, message).with_detail(json!({ "property": property })),
    )
}

fn failure(err: SupervisorError) -> anyhow::Error {
    anyhow::Error::new(err.to_response())
}

fn string_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

fn required_string<'a>(args: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    string_arg(args, name).ok_or_else(|| invalid_argument(name, format!("missing '{}'", name)))
}

impl SupervisorTool {
    async fn run(&self, args: Value) -> anyhow::Result<Value> {
        match self.operation {
            Operation::Start => {
                let mut spec = LaunchSpec::new(
                    required_string(&args, "command")?,
                    PathBuf::from(required_string(&args, "cwd")?),
                );
                if let Some(process_type) = string_arg(&args, "type") {
                    spec = spec.with_type(process_type);
                }
                if let Some(description) = string_arg(&args, "description") {
                    spec = spec.with_description(description);
                }
                if let Some(task_id) = string_arg(&args, "taskId") {
                    spec = spec.with_task(task_id);
                }
                let started = self.supervisor.start_process(spec).await.map_err(failure)?;
                Ok(serde_json::to_value(started)?)
            }
            Operation::Preset(preset) => {
                let project_path = match string_arg(&args, "projectPath") {
                    Some(path) => PathBuf::from(path),
                    None => std::env::current_dir().map_err(|e| {
                        failure(SupervisorError::spawn(
                            preset.default_command(),
                            ".",
                            format!("cannot read current directory: {}", e),
                        ))
                    })?,
                };
                let command = match preset {
                    Preset::Test => string_arg(&args, "command"),
                    _ => None,
                };
                let mut spec = preset.launch(project_path, command);
                if let Some(task_id) = string_arg(&args, "taskId") {
                    spec = spec.with_task(task_id);
                }
                let started = self.supervisor.start_process(spec).await.map_err(failure)?;
                Ok(serde_json::to_value(started)?)
            }
            Operation::Status => {
                let id = required_string(&args, "processId")?;
                let tail = LogTail::from_value(args.get("tail")).map_err(|e| invalid_argument("tail", e))?;
                let status = self
                    .supervisor
                    .get_process_status(id, StatusOptions { tail })
                    .await
                    .map_err(failure)?;
                Ok(serde_json::to_value(status)?)
            }
            Operation::Kill => {
                let id = required_string(&args, "processId")?;
                let signal = string_arg(&args, "signal").unwrap_or(DEFAULT_SIGNAL);
                let outcome = self
                    .supervisor
                    .kill_process_with(id, signal)
                    .await
                    .map_err(failure)?;
                Ok(serde_json::to_value(outcome)?)
            }
            Operation::List => {
                let status = string_arg(&args, "status")
                    .map(str::parse::<ProcessState>)
                    .transpose()
                    .map_err(|e| invalid_argument("status", e))?;
                let filter = ProcessFilter {
                    status,
                    process_type: string_arg(&args, "type").map(str::to_string),
                    task_id: string_arg(&args, "taskId").map(str::to_string),
                };
                let listings = self.supervisor.list_processes(&filter).await.map_err(failure)?;
                let stats = ProcessStats::from_listings(&listings);
                Ok(json!({ "count": listings.len(), "stats": stats, "processes": listings }))
            }
            Operation::Forget => {
                let id = required_string(&args, "processId")?;
                let remove_log = args.get("removeLog").and_then(Value::as_bool).unwrap_or(false);
                let outcome = self
                    .supervisor
                    .forget_process(id, remove_log)
                    .await
                    .map_err(failure)?;
                Ok(serde_json::to_value(outcome)?)
            }
        }
    }
}

#[async_trait]
impl CapabilityHandler for SupervisorTool {
    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        self.run(args).await
    }

    async fn self_check(&self) -> anyhow::Result<()> {
        self.supervisor
            .list_processes(&ProcessFilter::default())
            .await
            .map(|_| ())
            .map_err(failure)
    }
}

/// Register the process capabilities into a registry
///
/// Registers `start_process`, the `start_dev_server`, `start_build` and
/// `start_test` presets, `get_process_status`, `kill_process`,
/// `list_processes` and `forget_process`.
pub async fn register_process_capabilities(
    registry: &CapabilityRegistry,
    supervisor: Arc<dyn BackgroundSupervisor>,
) -> RegistryResult<()> {
    for operation in Operation::ALL {
        let handler = Arc::new(SupervisorTool {
            operation,
            supervisor: Arc::clone(&supervisor),
        });
        registry
            .register(CapabilityDefinition::new(
                operation.name(),
                operation.description(),
                operation.schema(),
                handler,
            ))
            .await?;
    }
    Ok(())
}
