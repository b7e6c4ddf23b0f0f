//! Process-based supervisor implementation

use crate::error::{Result, SupervisorError};
use crate::logs;
use crate::platform::{self, Delivery};
use crate::record::{
    KillOutcome, LaunchSpec, ProcessFilter, ProcessId, ProcessListing, ProcessRecord,
    ProcessState, ProcessStatus, StartedProcess, StatusOptions,
};
use crate::store::StateStore;
use crate::supervisor::{BackgroundSupervisor, ForgetOutcome};
use async_trait::async_trait;
use chrono::Utc;
use lev_core::config::{DEFAULT_TAIL_LINES, LevConfig};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// Environment variable carrying the process id into the child
pub const PROCESS_ID_ENV: &str = "LEV_PROCESS_ID";

/// Environment variable carrying the task id into the child
pub const TASK_ID_ENV: &str = "LEV_TASK_ID";

/// Configuration for process supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory holding records and logs
    pub state_dir: PathBuf,

    /// Shell used as `<shell> -c <command>`
    pub shell: String,

    /// Lines returned for a default tail
    pub default_tail_lines: usize,
}

impl SupervisorConfig {
    /// Configuration rooted at a state directory
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            shell: "sh".to_string(),
            default_tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

impl From<&LevConfig> for SupervisorConfig {
    fn from(config: &LevConfig) -> Self {
        Self {
            state_dir: config.supervisor.state_dir.clone(),
            shell: config.supervisor.shell.clone(),
            default_tail_lines: config.supervisor.default_tail_lines,
        }
    }
}

/// Process-based supervisor (detached subprocesses with file-backed state)
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    store: StateStore,
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    /// Create a new process supervisor, creating the state directory if needed
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let store = StateStore::open(&config.state_dir)?;
        Ok(Self { store, config })
    }

    /// Create a supervisor from the application configuration
    pub fn from_config(config: &LevConfig) -> Result<Self> {
        Self::new(SupervisorConfig::from(config))
    }

    /// The underlying state store
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn parse_id(raw: &str) -> Result<ProcessId> {
        ProcessId::parse(raw).ok_or_else(|| SupervisorError::UnknownProcess(raw.to_string()))
    }

    fn load(&self, raw: &str) -> Result<ProcessRecord> {
        let id = Self::parse_id(raw)?;
        self.store
            .load(&id)?
            .ok_or_else(|| SupervisorError::UnknownProcess(raw.to_string()))
    }

    fn is_alive(record: &ProcessRecord) -> bool {
        platform::is_alive(record.pid, record.start_signature)
    }

    /// Reject launches that would certainly fail inside the shell
    fn preflight(&self, spec: &LaunchSpec) -> Result<()> {
        let fail = |reason: String| SupervisorError::spawn(&spec.command, &spec.cwd, reason);

        if spec.command.trim().is_empty() {
            return Err(fail("command is empty".to_string()));
        }

        match std::fs::metadata(&spec.cwd) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(fail("working directory is not a directory".to_string())),
            Err(e) => return Err(fail(format!("working directory is not accessible: {}", e))),
        }

        if let Some(program) = leading_program(&spec.command)
            && let Err(reason) = resolve_program(program, &spec.cwd)
        {
            if program.contains('/') || !self.shell_knows(program, &spec.cwd) {
                return Err(fail(format!("{}: {}", program, reason)));
            }
            debug!(program, shell = %self.config.shell, "Leading word resolved by the shell");
        }

        Ok(())
    }

    /// Ask the configured shell whether it can run `word` (builtins,
    /// functions and aliases are not on PATH)
    fn shell_knows(&self, word: &str, cwd: &Path) -> bool {
        Command::new(&self.config.shell)
            .arg("-c")
            .arg(r#"command -v "$1""#)
            .arg("lev-preflight")
            .arg(word)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn spawn_child(&self, spec: &LaunchSpec, id: &ProcessId, log_file: &Path) -> Result<Child> {
        let fail = |reason: String| SupervisorError::spawn(&spec.command, &spec.cwd, reason);

        let stdout = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(log_file)
            .map_err(|e| SupervisorError::storage(log_file, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| SupervisorError::storage(log_file, e))?;

        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(&spec.command)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .env(PROCESS_ID_ENV, id.as_str());

        if let Some(task_id) = &spec.task_id {
            cmd.env(TASK_ID_ENV, task_id);
        }

        // Own process group, so a kill reaches the whole pipeline and the
        // caller's terminal signals do not
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd.spawn().map_err(|e| fail(e.to_string()))
    }

    fn remove_log(log_file: &Path) {
        if let Err(e) = std::fs::remove_file(log_file)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %log_file.display(), error = %e, "Failed to remove log file");
        }
    }
}

/// Reap the child in the background so it never lingers as a zombie while
/// this process is alive
fn reap(id: &ProcessId, mut child: Child) {
    let name = format!("reap-{}", id);
    let id = id.clone();
    let spawned = std::thread::Builder::new().name(name).spawn(move || match child.wait() {
        Ok(status) => debug!(process_id = %id, ?status, "Supervised process exited"),
        Err(e) => debug!(process_id = %id, error = %e, "Failed to wait for supervised process"),
    });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start reaper thread");
    }
}

#[async_trait]
impl BackgroundSupervisor for ProcessSupervisor {
    async fn start_process(&self, spec: LaunchSpec) -> Result<StartedProcess> {
        self.preflight(&spec)?;

        let id = ProcessId::generate();
        let log_file = self.store.log_path(&id);

        let child = match self.spawn_child(&spec, &id, &log_file) {
            Ok(child) => child,
            Err(e) => {
                Self::remove_log(&log_file);
                return Err(e);
            }
        };

        let pid = child.id();
        let record = ProcessRecord {
            process_id: id.clone(),
            pid,
            command: spec.command.clone(),
            cwd: spec.cwd.clone(),
            process_type: spec.process_type.clone(),
            description: spec.description.clone(),
            task_id: spec.task_id.clone(),
            log_file: log_file.clone(),
            started_at: Utc::now(),
            start_signature: platform::start_signature(pid),
        };

        reap(&id, child);

        if let Err(e) = self.store.create(&record) {
            warn!(process_id = %id, pid, error = %e, "Failed to persist record, killing process");
            if let Err(kill_err) = platform::send_signal(pid, "SIGKILL") {
                warn!(process_id = %id, pid, error = %kill_err, "Failed to kill unrecorded process");
            }
            Self::remove_log(&log_file);
            return Err(e);
        }

        info!(process_id = %id, pid, command = %spec.command, "Started background process");

        Ok(StartedProcess {
            message: format!("Started: {}", spec.command),
            process_id: id,
            pid,
            log_file,
        })
    }

    async fn get_process_status(
        &self,
        process_id: &str,
        options: StatusOptions,
    ) -> Result<ProcessStatus> {
        let record = self.load(process_id)?;
        let status = ProcessState::from_alive(Self::is_alive(&record));
        let tail = options.tail.line_count(self.config.default_tail_lines);
        let logs = logs::summarize(&record.log_file, tail)?;

        debug!(process_id = %record.process_id, %status, "Checked process status");

        Ok(ProcessStatus {
            duration: record.duration_ms(Utc::now()),
            process_id: record.process_id,
            pid: record.pid,
            status,
            command: record.command,
            process_type: record.process_type,
            started_at: record.started_at,
            logs,
        })
    }

    async fn kill_process_with(&self, process_id: &str, signal: &str) -> Result<KillOutcome> {
        let signal = platform::normalize_signal(signal)?;
        let record = self.load(process_id)?;

        let already_stopped = |record: ProcessRecord| KillOutcome {
            message: format!("Process {} already stopped", record.process_id),
            process_id: record.process_id,
            pid: record.pid,
            signal: None,
        };

        if !Self::is_alive(&record) {
            debug!(process_id = %record.process_id, "Kill requested for stopped process");
            return Ok(already_stopped(record));
        }

        match platform::send_signal(record.pid, &signal)? {
            Delivery::Gone => Ok(already_stopped(record)),
            delivery => {
                info!(
                    process_id = %record.process_id,
                    pid = record.pid,
                    %signal,
                    ?delivery,
                    "Signalled background process"
                );
                Ok(KillOutcome {
                    message: format!(
                        "Sent {} to process {} (pid {})",
                        signal, record.process_id, record.pid
                    ),
                    process_id: record.process_id,
                    pid: record.pid,
                    signal: Some(signal),
                })
            }
        }
    }

    async fn list_processes(&self, filter: &ProcessFilter) -> Result<Vec<ProcessListing>> {
        let now = Utc::now();
        let listings = self
            .store
            .list()?
            .into_iter()
            .filter(|record| filter.matches_record(record))
            .map(|record| ProcessListing {
                status: ProcessState::from_alive(Self::is_alive(&record)),
                duration: record.duration_ms(now),
                record,
            })
            .filter(|listing| filter.matches_status(listing.status))
            .collect();
        Ok(listings)
    }

    async fn get_record(&self, process_id: &str) -> Result<ProcessRecord> {
        self.load(process_id)
    }

    async fn forget_process(&self, process_id: &str, remove_log: bool) -> Result<ForgetOutcome> {
        let record = self.load(process_id)?;
        if Self::is_alive(&record) {
            return Err(SupervisorError::StillRunning(process_id.to_string()));
        }

        self.store.remove(&record.process_id)?;

        let removed_log = if remove_log {
            match std::fs::remove_file(&record.log_file) {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(SupervisorError::storage(&record.log_file, e)),
            }
        } else {
            false
        };

        info!(process_id = %record.process_id, removed_log, "Forgot process");

        Ok(ForgetOutcome {
            message: format!("Process {} forgotten", record.process_id),
            process_id: record.process_id,
            removed_log,
        })
    }
}

/// Reserved words that open a compound command rather than name a program
const RESERVED_WORDS: &[&str] = &[
    "!", "{", "[[", "case", "for", "function", "if", "select", "time", "until", "while",
];

/// The program a shell command line will run first, when it can be known
/// without running the shell
///
/// Returns `None` for reserved words, variable assignments and words
/// containing quoting or expansions. Builtins are returned; the shell is
/// asked about them when they are not found on PATH.
pub(crate) fn leading_program(command: &str) -> Option<&str> {
    let trimmed = command.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '<' | '>' | '(' | ')'))
        .unwrap_or(trimmed.len());
    let word = &trimmed[..end];

    if word.is_empty() || word.starts_with('-') || RESERVED_WORDS.contains(&word) {
        return None;
    }

    if word
        .chars()
        .any(|c| matches!(c, '$' | '`' | '\'' | '"' | '\\' | '*' | '?' | '[' | '~' | '{'))
    {
        return None;
    }

    // NAME=value prefix
    if let Some(eq) = word.find('=')
        && !word[..eq].contains('/')
    {
        return None;
    }

    Some(word)
}

/// Check that `program` names something executable from `cwd`
fn resolve_program(program: &str, cwd: &Path) -> std::result::Result<PathBuf, String> {
    if program.contains('/') {
        let path = cwd.join(program);
        return match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err("not a file".to_string()),
            Err(e) => Err(e.to_string()),
        };
    }

    which::which_in(program, std::env::var_os("PATH"), cwd)
        .map_err(|_| "command not found on PATH".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_program_simple() {
        assert_eq!(leading_program("sleep 5"), Some("sleep"));
        assert_eq!(leading_program("  pnpm run dev"), Some("pnpm"));
        assert_eq!(leading_program("ls|wc -l"), Some("ls"));
        assert_eq!(leading_program("./server.sh --port 3000"), Some("./server.sh"));
    }

    #[test]
    fn test_leading_program_skips_shell_constructs() {
        assert_eq!(leading_program("if true; then sleep 1; fi"), None);
        assert_eq!(leading_program("PORT=3000 node server.js"), None);
        assert_eq!(leading_program("$HOME/bin/run"), None);
        assert_eq!(leading_program("\"my tool\" arg"), None);
        assert_eq!(leading_program("(sleep 1)"), None);
    }

    #[test]
    fn test_leading_program_returns_builtins() {
        assert_eq!(leading_program("cd app && npm start"), Some("cd"));
        assert_eq!(leading_program("times; sleep 1"), Some("times"));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_knows_builtins_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(SupervisorConfig::new(dir.path())).unwrap();
        assert!(supervisor.shell_knows("times", dir.path()));
        assert!(supervisor.shell_knows("cd", dir.path()));
        assert!(!supervisor.shell_knows("definitely-not-a-real-binary-xyz", dir.path()));
    }

    #[test]
    fn test_resolve_program() {
        let cwd = std::env::temp_dir();
        assert!(resolve_program("definitely-not-a-real-binary-xyz", &cwd).is_err());
        assert!(resolve_program("./no-such-script.sh", &cwd).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_program_on_path() {
        assert!(resolve_program("sh", Path::new("/")).is_ok());
    }
}
