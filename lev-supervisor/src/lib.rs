//! Lev Supervisor - detached background processes that outlive their launcher
//!
//! Starts long-lived processes (dev servers, builds, test runs) in their own
//! process group, captures their output to a log file, and persists one
//! record per process so a later invocation can inspect or stop them.
//!
//! ## When to Use
//!
//! Use `lev-supervisor` when you need:
//! - **Detached servers** - processes that keep running after the CLI exits
//! - **Reattachment** - status and kill from a fresh process, via the state directory
//! - **Registry integration** - the same operations as dispatchable capabilities
//!
//! ```rust,no_run
//! use lev_supervisor::{BackgroundSupervisor, LaunchSpec, ProcessSupervisor, StatusOptions, SupervisorConfig};
//!
//! # async fn run() -> lev_supervisor::Result<()> {
//! let supervisor = ProcessSupervisor::new(SupervisorConfig::new("/tmp/lev-state"))?;
//! let started = supervisor
//!     .start_process(LaunchSpec::new("pnpm run dev", "/srv/app").with_type("dev-server"))
//!     .await?;
//!
//! let status = supervisor
//!     .get_process_status(started.process_id.as_str(), StatusOptions::with_default_tail())
//!     .await?;
//! println!("{} is {}", status.process_id, status.status);
//! # Ok(())
//! # }
//! ```

mod error;
mod logs;
mod platform;
mod process;
mod record;
mod store;
mod supervisor;
mod tools;

pub use error::{Result, SupervisorError};
pub use process::{PROCESS_ID_ENV, ProcessSupervisor, SupervisorConfig, TASK_ID_ENV};
pub use record::{
    DEFAULT_PROCESS_TYPE, KillOutcome, LaunchSpec, LogSummary, LogTail, ProcessFilter, ProcessId,
    Preset, ProcessListing, ProcessRecord, ProcessState, ProcessStats, ProcessStatus,
    StartedProcess, StatusOptions, format_bytes,
};
pub use store::StateStore;
pub use supervisor::{BackgroundSupervisor, DEFAULT_SIGNAL, ForgetOutcome};
pub use tools::register_process_capabilities;
