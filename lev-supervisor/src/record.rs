//! Process records and the status surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

/// Process type used when the caller does not give one
pub const DEFAULT_PROCESS_TYPE: &str = "generic";

/// Opaque process identifier, `proc-<unix-millis>-<random>`
///
/// Restricted to `[A-Za-z0-9_-]` so it is always safe as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessId(String);

impl ProcessId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "proc-{}-{}",
            Utc::now().timestamp_millis(),
            &random[..9]
        ))
    }

    /// Parse a caller-supplied identifier
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    /// The identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProcessId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("invalid process id '{}'", raw))
    }
}

impl From<ProcessId> for String {
    fn from(id: ProcessId) -> Self {
        id.0
    }
}

/// Launch parameters for a background process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    /// Shell command line
    pub command: String,

    /// Working directory
    pub cwd: PathBuf,

    /// Free-form category (`dev-server`, `build`, ...)
    #[serde(rename = "type", default = "default_process_type")]
    pub process_type: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Task this process belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

fn default_process_type() -> String {
    DEFAULT_PROCESS_TYPE.to_string()
}

impl LaunchSpec {
    /// Launch spec for a command in a directory
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            process_type: default_process_type(),
            description: None,
            task_id: None,
        }
    }

    /// Set the process type
    pub fn with_type(mut self, process_type: impl Into<String>) -> Self {
        self.process_type = process_type.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Associate the process with a task
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Common launches for a project directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    DevServer,
    Build,
    Test,
}

impl Preset {
    /// Process type recorded for the preset
    pub fn process_type(self) -> &'static str {
        match self {
            Preset::DevServer => "dev-server",
            Preset::Build => "build",
            Preset::Test => "test",
        }
    }

    /// Command run when the caller does not override it
    pub fn default_command(self) -> &'static str {
        match self {
            Preset::DevServer => "pnpm run dev",
            Preset::Build => "pnpm run build",
            Preset::Test => "pnpm test",
        }
    }

    /// Launch spec for a project, optionally overriding the command
    pub fn launch(self, project_path: impl Into<PathBuf>, command: Option<&str>) -> LaunchSpec {
        LaunchSpec::new(command.unwrap_or(self.default_command()), project_path)
            .with_type(self.process_type())
    }
}

/// Durable record of a launched process
///
/// Launch parameters never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub process_id: ProcessId,
    pub pid: u32,
    pub command: String,
    pub cwd: PathBuf,
    #[serde(rename = "type")]
    pub process_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub log_file: PathBuf,
    pub started_at: DateTime<Utc>,
    /// OS start time of `pid` captured at launch, when the platform exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_signature: Option<u64>,
}

impl ProcessRecord {
    /// Milliseconds since launch, saturating at zero
    pub fn duration_ms(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.started_at).num_milliseconds()).unwrap_or(0)
    }
}

/// Derived liveness of a recorded process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Stopped,
}

impl ProcessState {
    pub(crate) fn from_alive(alive: bool) -> Self {
        if alive {
            ProcessState::Running
        } else {
            ProcessState::Stopped
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for ProcessState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(ProcessState::Running),
            "stopped" => Ok(ProcessState::Stopped),
            other => Err(format!(
                "unknown process status '{}', expected running or stopped",
                other
            )),
        }
    }
}

/// Returned by a successful launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedProcess {
    pub process_id: ProcessId,
    pub pid: u32,
    pub log_file: PathBuf,
    pub message: String,
}

/// How much of the captured log a status request includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTail {
    /// Metadata only
    #[default]
    Off,
    /// The configured default number of lines
    Default,
    /// The last N lines
    Lines(usize),
}

impl LogTail {
    /// Interpret a loosely-typed `tail` argument (`true`, `false`, a count or null)
    pub fn from_value(value: Option<&Value>) -> Result<Self, String> {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(LogTail::Off),
            Some(Value::Bool(true)) => Ok(LogTail::Default),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(0) => Ok(LogTail::Off),
                Some(lines) => Ok(LogTail::Lines(usize::try_from(lines).unwrap_or(usize::MAX))),
                None => Err(format!("tail must be a non-negative integer, found {}", n)),
            },
            Some(other) => Err(format!("tail must be a boolean or a line count, found {}", other)),
        }
    }

    /// Resolve to a line count, if any
    pub fn line_count(self, default_lines: usize) -> Option<usize> {
        match self {
            LogTail::Off | LogTail::Lines(0) => None,
            LogTail::Default => Some(default_lines),
            LogTail::Lines(lines) => Some(lines),
        }
    }
}

/// Options for a status request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusOptions {
    pub tail: LogTail,
}

impl StatusOptions {
    /// Request the default number of log lines
    pub fn with_default_tail() -> Self {
        Self {
            tail: LogTail::Default,
        }
    }

    /// Request the last `lines` log lines
    pub fn with_tail(lines: usize) -> Self {
        Self {
            tail: LogTail::Lines(lines),
        }
    }
}

/// Captured-log information included in a status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub file: PathBuf,
    pub size_bytes: u64,
    pub size_human: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub showing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Point-in-time status of a recorded process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub process_id: ProcessId,
    pub pid: u32,
    pub status: ProcessState,
    /// Milliseconds since launch
    pub duration: u64,
    pub command: String,
    #[serde(rename = "type")]
    pub process_type: String,
    pub started_at: DateTime<Utc>,
    /// `None` when the log file no longer exists
    pub logs: Option<LogSummary>,
}

/// A record together with its derived liveness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessListing {
    #[serde(flatten)]
    pub record: ProcessRecord,
    pub status: ProcessState,
    pub duration: u64,
}

/// Per-status counts over a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

impl ProcessStats {
    pub fn from_listings(listings: &[ProcessListing]) -> Self {
        let running = listings
            .iter()
            .filter(|l| l.status == ProcessState::Running)
            .count();
        Self {
            total: listings.len(),
            running,
            stopped: listings.len() - running,
        }
    }
}

/// Result of a kill request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillOutcome {
    pub process_id: ProcessId,
    pub pid: u32,
    /// Signal sent, or `None` when the process had already stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    pub message: String,
}

/// Filter for listing processes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProcessState>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub process_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl ProcessFilter {
    /// Whether a record matches the launch-time criteria
    pub(crate) fn matches_record(&self, record: &ProcessRecord) -> bool {
        self.process_type
            .as_ref()
            .is_none_or(|t| *t == record.process_type)
            && self
                .task_id
                .as_ref()
                .is_none_or(|t| record.task_id.as_deref() == Some(t.as_str()))
    }

    /// Whether a derived status matches
    pub(crate) fn matches_status(&self, status: ProcessState) -> bool {
        self.status.is_none_or(|s| s == status)
    }
}

/// Human-readable byte count (`1.5 KB`)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
