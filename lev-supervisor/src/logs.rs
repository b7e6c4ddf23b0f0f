//! Captured log inspection

use crate::error::{Result, SupervisorError};
use crate::record::{LogSummary, format_bytes};
use std::path::Path;

/// Describe a log file, optionally including its last `tail` lines
///
/// Returns `Ok(None)` when the file does not exist.
pub(crate) fn summarize(log_file: &Path, tail: Option<usize>) -> Result<Option<LogSummary>> {
    let metadata = match std::fs::metadata(log_file) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SupervisorError::storage(log_file, e)),
    };

    let mut summary = LogSummary {
        file: log_file.to_path_buf(),
        size_bytes: metadata.len(),
        size_human: format_bytes(metadata.len()),
        total_lines: None,
        showing: None,
        snippet: None,
    };

    if let Some(count) = tail.filter(|&n| n > 0) {
        let bytes = std::fs::read(log_file).map_err(|e| SupervisorError::storage(log_file, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();
        let shown = count.min(lines.len());

        summary.snippet = Some(lines[lines.len() - shown..].join("\n"));
        summary.total_lines = Some(lines.len());
        summary.showing = Some(format!("last {} lines", shown));
    }

    Ok(Some(summary))
}
