//! File-backed process state
//!
//! Layout under the state directory:
//!
//! ```text
//! <state>/processes/<processId>.json   one record per process
//! <state>/logs/<processId>.log         combined stdout/stderr
//! ```
//!
//! Records are written to a temporary file in the same directory, synced,
//! then renamed into place, so readers never observe a partial record.

use crate::error::{Result, SupervisorError};
use crate::record::{ProcessId, ProcessRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const RECORDS_DIR: &str = "processes";
const LOGS_DIR: &str = "logs";

/// Durable store of process records
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Open (and create if needed) a state directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { root: root.into() };
        for dir in [store.records_dir(), store.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| SupervisorError::storage(&dir, e))?;
        }
        debug!(root = %store.root.display(), "Opened process state store");
        Ok(store)
    }

    /// State directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding process records
    pub fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    /// Directory holding captured logs
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Log file path for a process
    pub fn log_path(&self, id: &ProcessId) -> PathBuf {
        self.logs_dir().join(format!("{}.log", id))
    }

    fn record_path(&self, id: &ProcessId) -> PathBuf {
        self.records_dir().join(format!("{}.json", id))
    }

    /// Persist a new record; fails if one already exists under the same id
    ///
    /// Records are never rewritten once created.
    pub fn create(&self, record: &ProcessRecord) -> Result<()> {
        let dir = self.records_dir();
        let path = self.record_path(&record.process_id);

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| SupervisorError::storage(&dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, record).map_err(|source| {
            SupervisorError::Serialization {
                path: path.clone(),
                source,
            }
        })?;
        tmp.write_all(b"\n")
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| SupervisorError::storage(tmp.path(), e))?;

        tmp.persist_noclobber(&path)
            .map_err(|e| SupervisorError::storage(&path, e.error))?;

        sync_dir(&dir);
        debug!(process_id = %record.process_id, path = %path.display(), "Persisted process record");
        Ok(())
    }

    /// Load one record
    ///
    /// Returns `Ok(None)` when no record exists and a serialization error when
    /// the file is corrupt.
    pub fn load(&self, id: &ProcessId) -> Result<Option<ProcessRecord>> {
        let path = self.record_path(id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SupervisorError::storage(&path, e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| SupervisorError::Serialization { path, source })
    }

    /// Load every readable record, oldest first
    ///
    /// Corrupt or unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<ProcessRecord>> {
        let dir = self.records_dir();
        let entries = std::fs::read_dir(&dir).map_err(|e| SupervisorError::storage(&dir, e))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|contents| {
                    serde_json::from_str::<ProcessRecord>(&contents).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(path = %path.display(), %error, "Skipping corrupt process record");
                }
            }
        }

        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.process_id.cmp(&b.process_id))
        });
        Ok(records)
    }

    /// Delete a record; returns whether one existed
    pub fn remove(&self, id: &ProcessId) -> Result<bool> {
        let path = self.record_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(&self.records_dir());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SupervisorError::storage(&path, e)),
        }
    }
}

/// Make a rename durable; failures only cost durability, not correctness
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "Directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str, offset_secs: i64) -> ProcessRecord {
        ProcessRecord {
            process_id: ProcessId::parse(id).unwrap(),
            pid: 1234,
            command: "sleep 5".to_string(),
            cwd: PathBuf::from("/tmp"),
            process_type: "generic".to_string(),
            description: Some("test".to_string()),
            task_id: None,
            log_file: PathBuf::from(format!("/tmp/{}.log", id)),
            started_at: Utc::now() + chrono::Duration::seconds(offset_secs),
            start_signature: None,
        }
    }

    #[test]
    fn test_create_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let rec = record("proc-1-a", 0);

        store.create(&rec).unwrap();
        assert_eq!(store.load(&rec.process_id).unwrap(), Some(rec.clone()));

        // A second store over the same directory sees the record
        let reopened = StateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load(&rec.process_id).unwrap(), Some(rec));
    }

    #[test]
    fn test_create_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let rec = record("proc-1-a", 0);

        store.create(&rec).unwrap();
        let mut other = rec.clone();
        other.pid = 9999;
        assert!(matches!(store.create(&other), Err(SupervisorError::Storage { .. })));
        assert_eq!(store.load(&rec.process_id).unwrap().unwrap().pid, 1234);
    }

    #[test]
    fn test_missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let id = ProcessId::parse("never-started").unwrap();
        assert_eq!(store.load(&id).unwrap(), None);
        assert!(!store.remove(&id).unwrap());
    }

    #[test]
    fn test_list_orders_by_start_and_skips_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();

        store.create(&record("proc-2-b", 10)).unwrap();
        store.create(&record("proc-1-a", 0)).unwrap();
        std::fs::write(store.records_dir().join("proc-3-c.json"), "{ truncated").unwrap();
        std::fs::write(store.records_dir().join("README"), "not a record").unwrap();

        let ids: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.process_id.to_string())
            .collect();
        assert_eq!(ids, vec!["proc-1-a", "proc-2-b"]);

        let corrupt = ProcessId::parse("proc-3-c").unwrap();
        assert!(matches!(
            store.load(&corrupt),
            Err(SupervisorError::Serialization { .. })
        ));
    }

    #[test]
    fn test_remove_deletes_record() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let rec = record("proc-1-a", 0);

        store.create(&rec).unwrap();
        assert!(store.remove(&rec.process_id).unwrap());
        assert_eq!(store.load(&rec.process_id).unwrap(), None);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store.create(&record("proc-1-a", 0)).unwrap();

        let names: Vec<_> = std::fs::read_dir(store.records_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["proc-1-a.json"]);
    }
}
