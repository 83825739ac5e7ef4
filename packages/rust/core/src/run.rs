//! Run workspaces: run ids, the per-run directory, partial record files,
//! and the append-only run log.
//!
//! Layout:
//! ```text
//! <output_root>/<run_id>/
//! ├── scrape-log.txt
//! ├── <entity_key>-partial-<uuid>.json   (deleted after merge)
//! └── <entity_key>-<run_id>.json         (canonical record)
//! ```

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use orgscout_shared::{Record, Result, ScoutError};

/// Name of the run log file inside a run workspace.
pub const RUN_LOG_FILE: &str = "scrape-log.txt";

/// Infix that marks a partial record file.
const PARTIAL_MARKER: &str = "partial";

/// Fresh run ids tried before giving up on an occupied output root.
const MAX_RUN_DIR_ATTEMPTS: usize = 50;

/// Build a filesystem-safe run id from the current UTC time.
///
/// `2026-10-19T08:15:02.417Z` becomes `2026-10-19T08-15-02-417Z`.
pub fn new_run_id() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// File name of the canonical record for `entity_key` in run `run_id`.
pub fn canonical_file_name(entity_key: &str, run_id: &str) -> String {
    format!("{entity_key}-{run_id}.json")
}

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

/// Append-only event log shared by every entity task of a run.
///
/// Each event is written as one `write_all` under the lock, so lines from
/// concurrent tasks never interleave.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ScoutError::io(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    pub fn record_event(&self, message: &str) -> Result<()> {
        let line = format!(
            "[{}] {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message.replace('\n', " ")
        );
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())
            .map_err(|e| ScoutError::io(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One run workspace.
#[derive(Debug)]
pub struct Run {
    id: String,
    dir: PathBuf,
    log: RunLog,
}

/// Create a new run workspace under `output_root`.
///
/// The run directory is created exclusively: a run never adopts a directory
/// that another run already owns.
pub fn start_run(output_root: &Path) -> Result<Run> {
    std::fs::create_dir_all(output_root).map_err(|e| ScoutError::io(output_root, e))?;
    let (id, dir) = claim_run_dir(output_root)?;

    let run = Run::attach(id, dir)?;
    info!(run_id = %run.id, dir = %run.dir.display(), "run workspace created");
    Ok(run)
}

/// Create `<output_root>/<run_id>` for a fresh run id. When a run started in
/// the same millisecond already holds the id, wait for the clock to move and
/// try again.
fn claim_run_dir(output_root: &Path) -> Result<(String, PathBuf)> {
    let mut attempt = 1;
    loop {
        let id = new_run_id();
        let dir = output_root.join(&id);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_RUN_DIR_ATTEMPTS => {
                debug!(run_id = %id, attempt, "run directory taken, retrying");
                attempt += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(ScoutError::io(&dir, e)),
        }
    }
}

impl Run {
    /// Open an existing run workspace; the run id is the directory name.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ScoutError::config(format!(
                "run workspace {} does not exist",
                dir.display()
            )));
        }
        let id = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ScoutError::config(format!("cannot derive a run id from {}", dir.display()))
            })?
            .to_string();
        Self::attach(id, dir.to_path_buf())
    }

    fn attach(id: String, dir: PathBuf) -> Result<Self> {
        let log = RunLog::open(dir.join(RUN_LOG_FILE))?;
        Ok(Self { id, dir, log })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Append an event to the run log, downgrading write failures to a warning.
    pub fn record_event(&self, message: &str) {
        if let Err(e) = self.log.record_event(message) {
            warn!(run_id = %self.id, error = %e, "failed to append to run log");
        }
    }

    /// Path of the canonical record for `entity_key`.
    pub fn canonical_path(&self, entity_key: &str) -> PathBuf {
        self.dir.join(canonical_file_name(entity_key, &self.id))
    }

    /// Persist one partial record for `entity_key`. Partials are written once
    /// and never rewritten.
    pub fn write_partial(&self, entity_key: &str, record: &Record) -> Result<PathBuf> {
        let path = self.dir.join(format!(
            "{entity_key}-{PARTIAL_MARKER}-{}.json",
            Uuid::now_v7()
        ));
        let json = record.to_pretty_json().map_err(|e| ScoutError::json(&path, e))?;
        std::fs::write(&path, json).map_err(|e| ScoutError::io(&path, e))?;
        debug!(entity = entity_key, path = %path.display(), "partial record written");
        Ok(path)
    }

    /// Record files for `entity_key` other than its canonical record, in
    /// lexicographic file-name order.
    pub fn partial_paths(&self, entity_key: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{entity_key}-");
        let canonical = canonical_file_name(entity_key, &self.id);

        let entries = std::fs::read_dir(&self.dir).map_err(|e| ScoutError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ScoutError::io(&self.dir, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".json") && name != canonical {
                names.push(name);
            }
        }
        names.sort();

        Ok(names.into_iter().map(|n| self.dir.join(n)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("orgscout-run-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn run_id_is_filesystem_safe() {
        let id = new_run_id();
        assert!(!id.contains(':'));
        assert!(!id.contains('.'));
        assert!(id.ends_with('Z'));
        assert_eq!(id.len(), "2026-10-19T08-15-02-417Z".len());
    }

    #[test]
    fn start_run_creates_workspace_and_log() {
        let tmp = temp_dir();
        let run = start_run(&tmp).unwrap();

        assert!(run.dir().is_dir());
        assert_eq!(run.dir().file_name().unwrap().to_str(), Some(run.id()));
        assert!(run.log().path().exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn runs_started_back_to_back_get_distinct_workspaces() {
        let tmp = temp_dir();

        let runs: Vec<Run> = (0..20).map(|_| start_run(&tmp).unwrap()).collect();

        let ids: std::collections::HashSet<&str> = runs.iter().map(Run::id).collect();
        assert_eq!(ids.len(), runs.len());
        assert_eq!(std::fs::read_dir(&tmp).unwrap().count(), runs.len());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn start_run_creates_missing_output_root() {
        let tmp = temp_dir();
        let root = tmp.join("nested").join("out");

        let run = start_run(&root).unwrap();
        assert!(run.dir().starts_with(&root));
        assert!(run.dir().is_dir());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn partials_are_scoped_to_their_entity() {
        let tmp = temp_dir();
        let run = start_run(&tmp).unwrap();
        let record = Record::default();

        let first = run.write_partial("acme", &record).unwrap();
        let second = run.write_partial("acme", &record).unwrap();
        run.write_partial("acme_tech", &record).unwrap();
        std::fs::write(run.canonical_path("acme"), "{}").unwrap();

        let found = run.partial_paths("acme").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&first) && found.contains(&second));
        let mut sorted = found.clone();
        sorted.sort();
        assert_eq!(found, sorted);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn concurrent_events_are_whole_lines() {
        let tmp = temp_dir();
        let run = Arc::new(start_run(&tmp).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let run = Arc::clone(&run);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        run.record_event(&format!("task {t} event {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = std::fs::read_to_string(run.log().path()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.starts_with('[') && l.contains("] task ")));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn log_is_appended_across_reopen() {
        let tmp = temp_dir();
        let run = start_run(&tmp).unwrap();
        run.record_event("first");

        let reopened = Run::open(run.dir()).unwrap();
        assert_eq!(reopened.id(), run.id());
        reopened.record_event("second\nline");

        let log = std::fs::read_to_string(run.log().path()).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("second line"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn open_missing_workspace_fails() {
        let err = Run::open(Path::new("/nonexistent/orgscout-run")).unwrap_err();
        assert!(matches!(err, ScoutError::Config { .. }));
    }
}
