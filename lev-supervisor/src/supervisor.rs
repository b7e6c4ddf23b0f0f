//! Supervisor trait

use crate::Result;
use crate::record::{
    KillOutcome, LaunchSpec, ProcessFilter, ProcessId, ProcessListing, ProcessRecord, ProcessStatus,
    StartedProcess, StatusOptions,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Signal sent by [`BackgroundSupervisor::kill_process`]
pub const DEFAULT_SIGNAL: &str = "SIGTERM";

/// Supervisor for detached background processes
///
/// Every operation works from persisted state, so a fresh instance over the
/// same state directory sees processes started by an earlier one.
#[async_trait]
pub trait BackgroundSupervisor: Send + Sync {
    /// Launch a process detached from the caller
    async fn start_process(&self, spec: LaunchSpec) -> Result<StartedProcess>;

    /// Point-in-time status; never fails just because the process exited
    async fn get_process_status(
        &self,
        process_id: &str,
        options: StatusOptions,
    ) -> Result<ProcessStatus>;

    /// Send `SIGTERM`; a stopped process is a no-op success
    async fn kill_process(&self, process_id: &str) -> Result<KillOutcome> {
        self.kill_process_with(process_id, DEFAULT_SIGNAL).await
    }

    /// Send a named signal; a stopped process is a no-op success
    async fn kill_process_with(&self, process_id: &str, signal: &str) -> Result<KillOutcome>;

    /// All records with derived liveness, oldest first
    async fn list_processes(&self, filter: &ProcessFilter) -> Result<Vec<ProcessListing>>;

    /// The persisted record, without probing the OS
    async fn get_record(&self, process_id: &str) -> Result<ProcessRecord>;

    /// Delete the record of a stopped process, optionally with its log
    async fn forget_process(&self, process_id: &str, remove_log: bool) -> Result<ForgetOutcome>;
}

/// Result of forgetting a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetOutcome {
    pub process_id: ProcessId,
    pub removed_log: bool,
    pub message: String,
}
