//! Run recorder: one directory per run under a storage root.
//!
//! Layout of a run directory `<root>/<YYYYmmdd_HHMMSS>_<label>[.<n>]/`:
//!
//! - `scenario.json` - scenario and workload, written at `begin`
//! - `<label>_<workload>.log` - captured output, written at `seal`
//! - `metadata.txt` - `key=value` lines, written last; its presence marks
//!   the run sealed
//! - `ABORTED` and `<label>_<workload>.log.partial` - aborted runs only
//!
//! Creating the directory claims the id, so two recorders (or two processes)
//! sharing a root never hand out the same id. Every file is written to a
//! temporary name and renamed into place.
//!
//! Ids only have second resolution, so `scenario.json` also carries a
//! `created_seq` stamp (nanoseconds, strictly increasing per recorder).
//! Listing sorts on it to return runs in creation order.

use cassnet_types::{RunId, Scenario, WorkloadSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CampaignError, Result};

/// Name of the metadata file; its presence marks a sealed run.
pub const METADATA_FILE: &str = "metadata.txt";
/// Name of the scenario snapshot written at `begin`.
pub const SCENARIO_FILE: &str = "scenario.json";
/// Marker written into aborted runs.
pub const ABORTED_FILE: &str = "ABORTED";
/// Suffix of the partial output kept for aborted runs.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Ordered `key=value` run metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetadata {
    entries: Vec<(String, String)>,
}

impl RunMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Base metadata every run carries.
    pub fn for_run(record: &RunRecord, workload: &WorkloadSpec) -> Self {
        let scenario = record.scenario();
        let targets: Vec<&str> = scenario.fault().targets().iter().map(|t| t.name()).collect();
        let mut meta = Self::new();
        meta.set("id", record.id());
        meta.set("label", scenario.label());
        meta.set("mode", scenario.fault().kind());
        meta.set("value", scenario.fault().magnitude());
        meta.set("duration", scenario.duration_secs());
        meta.set("timestamp", record.started_at().to_rfc3339());
        meta.set("workload", workload.workload_name());
        meta.set("consistency", workload.consistency);
        meta.set("threads", workload.threads);
        meta.set("targets", targets.join(","));
        meta
    }

    /// Set `key`, replacing an earlier value in place.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string().replace('\n', " ");
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `metadata.txt` content.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }

    /// Parse `metadata.txt` content. Lines without `=` are skipped.
    pub fn parse(content: &str) -> Self {
        let mut meta = Self::new();
        for line in content.lines() {
            if let Some((k, v)) = line.split_once('=') {
                meta.set(k.trim(), v.trim());
            }
        }
        meta
    }
}

#[derive(Serialize)]
struct ScenarioSnapshot<'a> {
    id: String,
    started_at: DateTime<Utc>,
    created_seq: i64,
    scenario: &'a Scenario,
    workload: &'a WorkloadSpec,
}

#[derive(Deserialize)]
struct CreationStamp {
    created_seq: i64,
}

/// A claimed, not yet sealed run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    id: RunId,
    dir: PathBuf,
    scenario: Scenario,
    started_at: DateTime<Utc>,
    log_name: String,
}

impl RunRecord {
    /// Run id.
    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Run directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scenario being recorded.
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// When the run was claimed.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Path the captured log is sealed to.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(&self.log_name)
    }
}

/// State of a run directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Log and metadata written.
    Sealed,
    /// Marked aborted, with the recorded reason.
    Aborted(String),
    /// Claimed but neither sealed nor aborted (in flight, or the process died).
    Open,
}

/// A run directory found by [`RunRecorder::list`].
#[derive(Debug, Clone)]
pub struct RunEntry {
    /// Id parsed from the directory name.
    pub id: RunId,
    /// Run directory.
    pub dir: PathBuf,
    /// On-disk state.
    pub status: RunStatus,
    /// Creation stamp from `scenario.json`, or the start time for runs without one.
    created_seq: i64,
}

impl RunEntry {
    fn from_dir(dir: PathBuf) -> Option<Self> {
        let id: RunId = dir.file_name()?.to_str()?.parse().ok()?;
        let status = if dir.join(METADATA_FILE).is_file() {
            RunStatus::Sealed
        } else if let Ok(reason) = fs::read_to_string(dir.join(ABORTED_FILE)) {
            RunStatus::Aborted(reason.trim().to_string())
        } else {
            RunStatus::Open
        };
        let created_seq = fs::read(dir.join(SCENARIO_FILE))
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CreationStamp>(&bytes).ok())
            .map(|stamp| stamp.created_seq)
            .unwrap_or_else(|| id.started_at().map_or(0, nanos));
        Some(Self {
            id,
            dir,
            status,
            created_seq,
        })
    }

    /// The captured log, located from the label in the directory name.
    ///
    /// Aborted runs resolve to their `.partial` output.
    pub fn log_path(&self) -> Option<PathBuf> {
        let prefix = format!("{}_", self.id.label());
        let suffix = match self.status {
            RunStatus::Aborted(_) => format!(".log{}", PARTIAL_SUFFIX),
            _ => ".log".to_string(),
        };
        let mut logs: Vec<PathBuf> = fs::read_dir(&self.dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(&suffix))
            })
            .collect();
        logs.sort();
        logs.into_iter().next()
    }

    /// Parsed `metadata.txt`, if sealed.
    pub fn metadata(&self) -> io::Result<RunMetadata> {
        let content = fs::read_to_string(self.dir.join(METADATA_FILE))?;
        Ok(RunMetadata::parse(&content))
    }
}

/// Allocates run directories and persists run artifacts.
#[derive(Debug)]
pub struct RunRecorder {
    root: PathBuf,
    claims: Mutex<Claims>,
}

#[derive(Debug, Default)]
struct Claims {
    /// Last sequence number claimed per (timestamp, label).
    last_seq: HashMap<(String, String), u32>,
    /// Last creation stamp handed out.
    last_created: i64,
}

impl RunRecorder {
    /// Record runs under `root`. The directory is created on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            claims: Mutex::new(Claims::default()),
        }
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claim a run directory for `scenario`, timestamped now.
    pub fn begin(&self, scenario: &Scenario, workload: &WorkloadSpec) -> Result<RunRecord> {
        self.begin_at(scenario, workload, Utc::now())
    }

    /// Claim a run directory for `scenario` with an explicit start time.
    pub fn begin_at(
        &self,
        scenario: &Scenario,
        workload: &WorkloadSpec,
        at: DateTime<Utc>,
    ) -> Result<RunRecord> {
        fs::create_dir_all(&self.root).map_err(|e| write_error(&self.root, e))?;
        let (id, dir, created_seq) = self.claim(scenario, at)?;

        let record = RunRecord {
            log_name: format!("{}_{}.log", scenario.label(), workload.workload_name()),
            id,
            dir,
            scenario: scenario.clone(),
            started_at: at,
        };

        let snapshot = ScenarioSnapshot {
            id: record.id.to_string(),
            started_at: at,
            created_seq,
            scenario,
            workload,
        };
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| {
            write_error(&record.dir.join(SCENARIO_FILE), io::Error::other(e))
        })?;
        write_atomic(&record.dir, SCENARIO_FILE, &json)?;

        tracing::debug!("Claimed run {}", record.id);
        Ok(record)
    }

    fn claim(&self, scenario: &Scenario, at: DateTime<Utc>) -> Result<(RunId, PathBuf, i64)> {
        let first = RunId::new(at, scenario.label(), 1);
        let key = (first.timestamp().to_string(), scenario.label().to_string());

        let mut claims = self.claims.lock().unwrap();
        let mut seq = claims.last_seq.get(&key).map_or(1, |s| s + 1);
        loop {
            let id = first.with_seq(seq);
            let dir = self.root.join(id.to_string());
            match fs::create_dir(&dir) {
                Ok(()) => {
                    claims.last_seq.insert(key, seq);
                    let created = nanos(Utc::now()).max(claims.last_created + 1);
                    claims.last_created = created;
                    return Ok((id, dir, created));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => seq += 1,
                Err(e) => return Err(write_error(&dir, e)),
            }
        }
    }

    /// Write the captured log, then the metadata, and make both read-only.
    ///
    /// Fails if the run is already sealed or was marked aborted.
    pub fn seal(&self, record: &RunRecord, output: &[u8], metadata: &RunMetadata) -> Result<PathBuf> {
        for marker in [METADATA_FILE, ABORTED_FILE] {
            let path = record.dir.join(marker);
            if path.exists() {
                return Err(write_error(
                    &path,
                    io::Error::new(io::ErrorKind::AlreadyExists, "run already finalized"),
                ));
            }
        }

        let log = write_atomic(&record.dir, &record.log_name, output)?;
        let meta = write_atomic(&record.dir, METADATA_FILE, metadata.render().as_bytes())?;
        for path in [&log, &meta, &record.dir.join(SCENARIO_FILE)] {
            make_read_only(path)?;
        }

        tracing::info!("Sealed run {} ({} bytes)", record.id, output.len());
        Ok(log)
    }

    /// Mark a run aborted, keeping whatever output was captured.
    pub fn mark_aborted(&self, record: &RunRecord, reason: &str, partial_output: &[u8]) -> Result<()> {
        let path = record.dir.join(METADATA_FILE);
        if path.exists() {
            return Err(write_error(
                &path,
                io::Error::new(io::ErrorKind::AlreadyExists, "run already sealed"),
            ));
        }

        let partial = format!("{}{}", record.log_name, PARTIAL_SUFFIX);
        write_atomic(&record.dir, &partial, partial_output)?;
        write_atomic(&record.dir, ABORTED_FILE, format!("{}\n", reason).as_bytes())?;
        tracing::warn!("Run {} marked aborted: {}", record.id, reason);
        Ok(())
    }

    /// Every run under the root, oldest first. Missing root means no runs.
    pub fn list(&self) -> io::Result<Vec<RunEntry>> {
        list_runs(&self.root)
    }
}

/// Scan `root` for run directories in creation order.
pub fn list_runs(root: &Path) -> io::Result<Vec<RunEntry>> {
    let dir = match fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in dir {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(run) = RunEntry::from_dir(entry.path()) {
                entries.push(run);
            }
        }
    }
    entries.sort_by(|a, b| (a.created_seq, &a.id).cmp(&(b.created_seq, &b.id)));
    Ok(entries)
}

fn nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn write_error(path: &Path, source: io::Error) -> CampaignError {
    CampaignError::RecorderWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let target = dir.join(name);
    let tmp = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

    let written = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &target)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(&target, e));
    }
    Ok(target)
}

fn make_read_only(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| write_error(path, e))?
        .permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms).map_err(|e| write_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassnet_types::{FaultKind, FaultSpec, NodeRole, TargetNode};
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn scenario(label: &str) -> Scenario {
        let node = TargetNode::new("cassandra2", NodeRole::Peer).unwrap();
        let fault = FaultSpec::new(FaultKind::Loss, [node], "10%").unwrap();
        Scenario::new(label, fault, 90).unwrap()
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, secs).unwrap()
    }

    #[test]
    fn thousand_ids_in_one_second_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        let sc = scenario("loss10p");
        let workload = WorkloadSpec::default();

        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let record = recorder.begin_at(&sc, &workload, at(53)).unwrap();
            assert!(seen.insert(record.id().to_string()));
        }
        assert_eq!(recorder.list().unwrap().len(), 1000);
        assert!(seen.contains("20250314_092653_loss10p"));
        assert!(seen.contains("20250314_092653_loss10p.1000"));
    }

    #[test]
    fn separate_recorders_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = RunRecorder::new(dir.path());
        let b = RunRecorder::new(dir.path());
        let sc = scenario("loss10p");
        let workload = WorkloadSpec::default();

        let first = a.begin_at(&sc, &workload, at(53)).unwrap();
        let second = b.begin_at(&sc, &workload, at(53)).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(second.id().seq(), 2);
    }

    #[test]
    fn begin_writes_scenario_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path().join("runs"));
        let record = recorder
            .begin_at(&scenario("loss10p"), &WorkloadSpec::default(), at(53))
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(record.dir().join(SCENARIO_FILE)).unwrap()).unwrap();
        assert_eq!(json["id"], "20250314_092653_loss10p");
        assert_eq!(json["scenario"]["label"], "loss10p");
        assert_eq!(json["workload"]["threads"], 50);
        assert!(json["created_seq"].as_i64().unwrap() > 0);
        assert_eq!(
            record.log_path(),
            record.dir().join("loss10p_write.log")
        );
    }

    #[test]
    fn seal_writes_log_and_metadata_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        let workload = WorkloadSpec::default();
        let record = recorder.begin_at(&scenario("loss10p"), &workload, at(53)).unwrap();

        let mut meta = RunMetadata::for_run(&record, &workload);
        meta.set("state", "DONE");
        let log = recorder.seal(&record, b"line1\nline2\n", &meta).unwrap();

        assert_eq!(fs::read(&log).unwrap(), b"line1\nline2\n");
        assert!(fs::metadata(&log).unwrap().permissions().readonly());

        let entries = recorder.list().unwrap();
        assert_eq!(entries[0].status, RunStatus::Sealed);
        let read_back = entries[0].metadata().unwrap();
        assert_eq!(read_back.get("label"), Some("loss10p"));
        assert_eq!(read_back.get("mode"), Some("loss"));
        assert_eq!(read_back.get("value"), Some("10%"));
        assert_eq!(read_back.get("duration"), Some("90"));
        assert_eq!(read_back.get("targets"), Some("cassandra2"));
        assert_eq!(read_back.get("state"), Some("DONE"));
        assert_eq!(entries[0].log_path(), Some(log));
    }

    #[test]
    fn sealing_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        let workload = WorkloadSpec::default();
        let record = recorder.begin_at(&scenario("loss10p"), &workload, at(53)).unwrap();
        let meta = RunMetadata::for_run(&record, &workload);

        recorder.seal(&record, b"first", &meta).unwrap();
        let err = recorder.seal(&record, b"second", &meta).unwrap_err();
        assert!(matches!(err, CampaignError::RecorderWrite { .. }));
        assert_eq!(fs::read(record.log_path()).unwrap(), b"first");
    }

    #[test]
    fn aborted_run_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        let workload = WorkloadSpec::default();
        let record = recorder.begin_at(&scenario("loss50p"), &workload, at(53)).unwrap();

        recorder
            .mark_aborted(&record, "workload timed out after 120s", b"partial\n")
            .unwrap();

        let entries = recorder.list().unwrap();
        assert_eq!(
            entries[0].status,
            RunStatus::Aborted("workload timed out after 120s".into())
        );
        let partial = entries[0].log_path().unwrap();
        assert!(partial.to_string_lossy().ends_with("loss50p_write.log.partial"));
        assert_eq!(fs::read(partial).unwrap(), b"partial\n");
        assert!(recorder.seal(&record, b"", &RunMetadata::new()).is_err());
    }

    fn listed_ids(recorder: &RunRecorder) -> Vec<String> {
        recorder
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.id.to_string())
            .collect()
    }

    #[test]
    fn list_follows_creation_order_and_skips_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        let workload = WorkloadSpec::default();
        recorder.begin_at(&scenario("zeta"), &workload, at(10)).unwrap();
        recorder.begin_at(&scenario("beta"), &workload, at(11)).unwrap();
        recorder.begin_at(&scenario("alpha"), &workload, at(11)).unwrap();
        fs::create_dir(dir.path().join("plots")).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(
            listed_ids(&recorder),
            vec![
                "20250314_092610_zeta",
                "20250314_092611_beta",
                "20250314_092611_alpha"
            ]
        );
    }

    #[test]
    fn same_second_runs_list_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        let workload = WorkloadSpec::default();

        let mut created = Vec::new();
        for label in ["zbaseline", "aloss10"] {
            let record = recorder.begin_at(&scenario(label), &workload, at(30)).unwrap();
            created.push(record.id().to_string());
        }
        for _ in 0..10 {
            let record = recorder.begin_at(&scenario("x"), &workload, at(30)).unwrap();
            created.push(record.id().to_string());
        }

        let listed = listed_ids(&recorder);
        assert_eq!(listed[0], "20250314_092630_zbaseline");
        assert_eq!(listed[11], "20250314_092630_x.10");
        assert_eq!(listed, created);
        // A second recorder on the same root sees the same order.
        assert_eq!(listed_ids(&RunRecorder::new(dir.path())), created);
    }

    #[test]
    fn runs_without_creation_stamp_fall_back_to_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(dir.path());
        recorder
            .begin(&scenario("fresh"), &WorkloadSpec::default())
            .unwrap();
        fs::create_dir(dir.path().join("20200101_000000_legacy")).unwrap();

        let listed = listed_ids(&recorder);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], "20200101_000000_legacy");
    }

    #[test]
    fn missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_runs(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn metadata_round_trips_text() {
        let mut meta = RunMetadata::new();
        meta.set("label", "baseline");
        meta.set("reason", "multi\nline");
        meta.set("label", "baseline2");
        assert_eq!(meta.render(), "label=baseline2\nreason=multi line\n");
        assert_eq!(RunMetadata::parse(&meta.render()), meta);
    }
}
