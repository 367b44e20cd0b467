//! Checkpoint and artifact store for enrichment jobs.
//!
//! The [`JobStore`] is an explicitly constructed value with an explicit
//! [`JobStore::start`]/[`JobStore::stop`] lifecycle; nothing here is a
//! process-wide singleton. It owns three things:
//!
//! - an in-memory working-set cache of in-flight job buffers, evicted
//!   after a TTL of inactivity by a background sweeper,
//! - durable artifact files named `<job_id>_<timestamp_micros>_<kind>`,
//!   pruned by age and by a per-job count cap,
//! - one JSON metadata record per job under `jobs/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use bomenrich_shared::{
    ArtifactKind, BomError, CURRENT_SCHEMA_VERSION, ColumnMap, ExchangeRecord, JobId, JobMeta,
    Result, StoreSection,
};

const ARTIFACTS_DIR: &str = "artifacts";
const JOBS_DIR: &str = "jobs";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tuning knobs for the store, resolved from `[store]` config.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory; artifacts and job metadata live beneath it.
    pub root: PathBuf,
    /// Idle time before a working-set entry is evicted.
    pub working_ttl: Duration,
    /// Interval between sweeper runs.
    pub sweep_interval: Duration,
    /// Age past which artifact files are pruned.
    pub max_artifact_age: Duration,
    /// Artifact files kept per job, newest first.
    pub max_artifacts_per_job: usize,
}

impl StoreConfig {
    /// Defaults: 5 min TTL, 5 min sweeps, 24 h artifact age, 20 per job.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            working_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(300),
            max_artifact_age: Duration::from_secs(24 * 60 * 60),
            max_artifacts_per_job: 20,
        }
    }

    /// Resolve from the `[store]` config section.
    pub fn from_section(root: impl Into<PathBuf>, section: &StoreSection) -> Self {
        Self {
            root: root.into(),
            working_ttl: Duration::from_secs(section.working_ttl_secs),
            sweep_interval: Duration::from_secs(section.sweep_interval_secs),
            max_artifact_age: Duration::from_secs(section.artifact_max_age_hours * 60 * 60),
            max_artifacts_per_job: section.max_artifacts_per_job,
        }
    }
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

struct WorkingEntry {
    bytes: Vec<u8>,
    last_access: Instant,
}

type WorkingSet = Mutex<HashMap<JobId, WorkingEntry>>;

/// Store handle shared by job workers. All working-set access serializes
/// on one store-level mutex; artifact and metadata I/O is plain
/// filesystem work with no lock held.
pub struct JobStore {
    config: StoreConfig,
    working: Arc<WorkingSet>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl JobStore {
    /// Open (creating directories as needed) a store rooted at
    /// `config.root`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let artifacts = config.root.join(ARTIFACTS_DIR);
        std::fs::create_dir_all(&artifacts).map_err(|e| BomError::io(&artifacts, e))?;
        let jobs = config.root.join(JOBS_DIR);
        std::fs::create_dir_all(&jobs).map_err(|e| BomError::io(&jobs, e))?;

        Ok(Self {
            config,
            working: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Mutex::new(None),
        })
    }

    /// Start the background sweeper. Idempotent: a second call replaces
    /// the previous task.
    pub async fn start(&self) {
        let working = Arc::clone(&self.working);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.sweep_interval);
            // The immediate first tick doubles as startup housekeeping.
            loop {
                ticker.tick().await;
                let evicted = sweep_working(&working, config.working_ttl).await;
                if evicted > 0 {
                    debug!(evicted, "working-set entries evicted");
                }
                if let Err(error) = prune_artifact_files(&config) {
                    warn!(%error, "artifact pruning failed");
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = self.config.sweep_interval.as_secs(), "store sweeper started");
    }

    /// Stop the background sweeper, if running.
    pub async fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
            info!("store sweeper stopped");
        }
    }

    fn artifacts_dir(&self) -> PathBuf {
        self.config.root.join(ARTIFACTS_DIR)
    }

    fn jobs_dir(&self) -> PathBuf {
        self.config.root.join(JOBS_DIR)
    }

    // -----------------------------------------------------------------------
    // Working set
    // -----------------------------------------------------------------------

    /// Cache the in-flight buffer for a job.
    pub async fn put_working(&self, job_id: JobId, bytes: Vec<u8>) {
        let mut working = self.working.lock().await;
        working.insert(
            job_id,
            WorkingEntry {
                bytes,
                last_access: Instant::now(),
            },
        );
    }

    /// Fetch a job's in-flight buffer, refreshing its last-access time.
    /// Absent or already-evicted entries are `None`, never an error.
    pub async fn get_working(&self, job_id: JobId) -> Option<Vec<u8>> {
        let mut working = self.working.lock().await;
        let entry = working.get_mut(&job_id)?;
        entry.last_access = Instant::now();
        Some(entry.bytes.clone())
    }

    /// Drop a job's in-flight buffer.
    pub async fn remove_working(&self, job_id: JobId) {
        self.working.lock().await.remove(&job_id);
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Persist an artifact atomically (temp file, then rename).
    ///
    /// The embedded microsecond timestamp makes names unique and carries
    /// the ordering that `latest_artifact` and pruning rely on.
    #[instrument(skip(self, bytes), fields(job = %job_id, kind = kind.as_str(), bytes = bytes.len()))]
    pub fn save_artifact(&self, job_id: JobId, kind: ArtifactKind, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.artifacts_dir();
        let job_prefix = job_id.to_string();

        // Timestamps are strictly increasing per job; a save landing in
        // the same microsecond as the previous one bumps past it.
        let newest_existing = scan_artifact_dir(&dir)?
            .into_iter()
            .filter(|artifact| artifact.job == job_prefix)
            .map(|artifact| artifact.timestamp_micros)
            .max();
        let mut timestamp = Utc::now().timestamp_micros();
        if let Some(newest) = newest_existing {
            timestamp = timestamp.max(newest + 1);
        }

        let path = dir.join(format!("{job_id}_{timestamp}_{}", kind.as_str()));
        let tmp = dir.join(format!(".{job_id}_{timestamp}.tmp"));
        std::fs::write(&tmp, bytes).map_err(|e| BomError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| BomError::io(&path, e))?;

        debug!(path = %path.display(), "artifact saved");
        Ok(path)
    }

    /// Load the newest artifact for a job, any kind. `Ok(None)` when the
    /// job has no artifacts.
    pub fn latest_artifact(&self, job_id: JobId) -> Result<Option<StoredArtifact>> {
        let job_prefix = job_id.to_string();
        let newest = self
            .scan_artifacts()?
            .into_iter()
            .filter(|artifact| artifact.job == job_prefix)
            .max_by_key(|artifact| artifact.timestamp_micros);

        let Some(found) = newest else {
            return Ok(None);
        };
        let bytes = std::fs::read(&found.path).map_err(|e| BomError::io(&found.path, e))?;
        Ok(Some(StoredArtifact {
            path: found.path,
            kind: found.kind,
            timestamp_micros: found.timestamp_micros,
            bytes,
        }))
    }

    /// Run artifact housekeeping once: age-based deletion plus the
    /// per-job count cap. Returns the number of files deleted.
    pub fn prune_artifacts(&self) -> Result<usize> {
        prune_artifact_files(&self.config)
    }

    fn scan_artifacts(&self) -> Result<Vec<ArtifactFile>> {
        scan_artifact_dir(&self.artifacts_dir())
    }

    // -----------------------------------------------------------------------
    // Job metadata
    // -----------------------------------------------------------------------

    /// Create the metadata record for a new job.
    #[instrument(skip(self, input), fields(job = %id, name = original_name))]
    pub fn create_job(&self, id: JobId, original_name: &str, input: &[u8]) -> Result<JobMeta> {
        let now = Utc::now();
        let meta = JobMeta {
            schema_version: CURRENT_SCHEMA_VERSION,
            id,
            original_name: original_name.to_string(),
            input_sha256: sha256_hex(input),
            created_at: now,
            last_access: now,
            column_map: None,
            exchanges: Vec::new(),
        };
        self.write_meta(&meta)?;
        Ok(meta)
    }

    /// Load a job's metadata; `Ok(None)` for an unknown id.
    pub fn job_meta(&self, id: JobId) -> Result<Option<JobMeta>> {
        let path = self.meta_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| BomError::io(&path, e))?;
        let meta = serde_json::from_str(&text)
            .map_err(|e| BomError::Storage(format!("corrupt job metadata {}: {e}", path.display())))?;
        Ok(Some(meta))
    }

    /// Refresh a job's last-access time.
    pub fn touch_job(&self, id: JobId) -> Result<()> {
        self.update_meta(id, |meta| {
            meta.last_access = Utc::now();
        })
    }

    /// Record the column layout computed at job start.
    pub fn set_column_map(&self, id: JobId, map: ColumnMap) -> Result<()> {
        self.update_meta(id, |meta| {
            meta.column_map = Some(map);
        })
    }

    /// Append one collaborator exchange to the job's history.
    pub fn append_exchange(&self, id: JobId, role: &str, content: &str) -> Result<()> {
        self.update_meta(id, |meta| {
            meta.exchanges.push(ExchangeRecord {
                role: role.to_string(),
                content: content.to_string(),
                at: Utc::now(),
            });
            meta.last_access = Utc::now();
        })
    }

    /// All job metadata records, newest first.
    pub fn list_jobs(&self) -> Result<Vec<JobMeta>> {
        let dir = self.jobs_dir();
        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| BomError::io(&dir, e))? {
            let entry = entry.map_err(|e| BomError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| BomError::io(&path, e))?;
            match serde_json::from_str::<JobMeta>(&text) {
                Ok(meta) => jobs.push(meta),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable job metadata");
                }
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn meta_path(&self, id: JobId) -> PathBuf {
        self.jobs_dir().join(format!("{id}.json"))
    }

    fn write_meta(&self, meta: &JobMeta) -> Result<()> {
        let path = self.meta_path(meta.id);
        let text = serde_json::to_string_pretty(meta)
            .map_err(|e| BomError::Storage(format!("failed to serialize job metadata: {e}")))?;
        std::fs::write(&path, text).map_err(|e| BomError::io(&path, e))
    }

    fn update_meta(&self, id: JobId, apply: impl FnOnce(&mut JobMeta)) -> Result<()> {
        let mut meta = self
            .job_meta(id)?
            .ok_or_else(|| BomError::Storage(format!("unknown job {id}")))?;
        apply(&mut meta);
        self.write_meta(&meta)
    }
}

/// A loaded artifact with its parsed name parts.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub timestamp_micros: i64,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Sweeping and pruning
// ---------------------------------------------------------------------------

/// Evict working-set entries idle longer than `ttl`.
async fn sweep_working(working: &WorkingSet, ttl: Duration) -> usize {
    let mut map = working.lock().await;
    let before = map.len();
    map.retain(|_, entry| entry.last_access.elapsed() <= ttl);
    before - map.len()
}

#[derive(Debug)]
struct ArtifactFile {
    path: PathBuf,
    job: String,
    timestamp_micros: i64,
    kind: ArtifactKind,
}

/// Parse `<job_id>_<timestamp_micros>_<kind>`. Files that don't match
/// (in-flight temp files, foreign files) are invisible to scans.
fn parse_artifact_name(path: &Path) -> Option<ArtifactFile> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let mut parts = name.rsplitn(3, '_');
    let kind = parts.next()?.parse::<ArtifactKind>().ok()?;
    let timestamp_micros = parts.next()?.parse::<i64>().ok()?;
    let job = parts.next()?.to_string();
    Some(ArtifactFile {
        path: path.to_path_buf(),
        job,
        timestamp_micros,
        kind,
    })
}

fn scan_artifact_dir(dir: &Path) -> Result<Vec<ArtifactFile>> {
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| BomError::io(dir, e))? {
        let entry = entry.map_err(|e| BomError::io(dir, e))?;
        if let Some(artifact) = parse_artifact_name(&entry.path()) {
            artifacts.push(artifact);
        }
    }
    Ok(artifacts)
}

/// Delete artifacts older than the age limit, then enforce the per-job
/// cap keeping the newest by embedded timestamp.
fn prune_artifact_files(config: &StoreConfig) -> Result<usize> {
    let dir = config.root.join(ARTIFACTS_DIR);
    let now_micros = Utc::now().timestamp_micros();
    let max_age_micros = config.max_artifact_age.as_micros() as i64;

    let mut by_job: HashMap<String, Vec<ArtifactFile>> = HashMap::new();
    for artifact in scan_artifact_dir(&dir)? {
        by_job.entry(artifact.job.clone()).or_default().push(artifact);
    }

    let mut deleted = 0;
    for (_, mut artifacts) in by_job {
        artifacts.sort_by_key(|a| std::cmp::Reverse(a.timestamp_micros));
        for (index, artifact) in artifacts.iter().enumerate() {
            let too_old = now_micros - artifact.timestamp_micros > max_age_micros;
            let over_cap = index >= config.max_artifacts_per_job;
            if !(too_old || over_cap) {
                continue;
            }
            match std::fs::remove_file(&artifact.path) {
                Ok(()) => deleted += 1,
                Err(error) => {
                    warn!(path = %artifact.path.display(), %error, "failed to delete artifact");
                }
            }
        }
    }

    deleted += prune_stale_temps(&dir, now_micros, max_age_micros)?;

    if deleted > 0 {
        info!(deleted, "artifacts pruned");
    }
    Ok(deleted)
}

/// Parse the timestamp embedded in a `.{job_id}_{ts}.tmp` name left by
/// an interrupted `save_artifact`.
fn parse_temp_timestamp(name: &str) -> Option<i64> {
    let stem = name.strip_prefix('.')?.strip_suffix(".tmp")?;
    let (_, timestamp) = stem.rsplit_once('_')?;
    timestamp.parse().ok()
}

/// Delete orphaned temp files once they pass the artifact age limit. A
/// temp file younger than the limit may still belong to a save in
/// flight.
fn prune_stale_temps(dir: &Path, now_micros: i64, max_age_micros: i64) -> Result<usize> {
    let mut deleted = 0;
    for entry in std::fs::read_dir(dir).map_err(|e| BomError::io(dir, e))? {
        let entry = entry.map_err(|e| BomError::io(dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(timestamp) = parse_temp_timestamp(name) else {
            continue;
        };
        if now_micros - timestamp <= max_age_micros {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to delete stale temp file");
            }
        }
    }
    Ok(deleted)
}

/// Hex SHA-256 of a byte buffer, for input provenance.
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store(configure: impl FnOnce(&mut StoreConfig)) -> JobStore {
        let root = std::env::temp_dir().join(format!("bomenrich-store-test-{}", Uuid::now_v7()));
        let mut config = StoreConfig::new(root);
        configure(&mut config);
        JobStore::open(config).unwrap()
    }

    // --- Working set ---

    #[tokio::test]
    async fn working_set_roundtrip_and_absent() {
        let store = temp_store(|_| {});
        let job = JobId::new();

        assert_eq!(store.get_working(job).await, None);

        store.put_working(job, b"row data".to_vec()).await;
        assert_eq!(store.get_working(job).await.as_deref(), Some(&b"row data"[..]));

        store.remove_working(job).await;
        assert_eq!(store.get_working(job).await, None);
    }

    #[tokio::test]
    async fn sweep_evicts_only_idle_entries() {
        let store = temp_store(|_| {});
        let stale = JobId::new();
        let fresh = JobId::new();
        store.put_working(stale, vec![1]).await;
        store.put_working(fresh, vec![2]).await;

        // Zero TTL evicts everything that has any age at all.
        let evicted = sweep_working(&store.working, Duration::ZERO).await;
        assert_eq!(evicted, 2);

        store.put_working(fresh, vec![2]).await;
        let evicted = sweep_working(&store.working, Duration::from_secs(300)).await;
        assert_eq!(evicted, 0);
        assert!(store.get_working(fresh).await.is_some());
    }

    // --- Artifacts ---

    #[test]
    fn artifact_names_carry_job_timestamp_kind() {
        let store = temp_store(|_| {});
        let job = JobId::new();
        let path = store
            .save_artifact(job, ArtifactKind::Checkpoint, b"csv bytes")
            .unwrap();

        let parsed = parse_artifact_name(&path).expect("parseable name");
        assert_eq!(parsed.job, job.to_string());
        assert_eq!(parsed.kind, ArtifactKind::Checkpoint);
        assert!(parsed.timestamp_micros > 0);
    }

    #[test]
    fn latest_artifact_is_newest_by_timestamp() {
        let store = temp_store(|_| {});
        let job = JobId::new();

        store
            .save_artifact(job, ArtifactKind::Checkpoint, b"first")
            .unwrap();
        store
            .save_artifact(job, ArtifactKind::Checkpoint, b"second")
            .unwrap();
        store
            .save_artifact(job, ArtifactKind::Enriched, b"final")
            .unwrap();

        let latest = store.latest_artifact(job).unwrap().expect("artifact");
        assert_eq!(latest.kind, ArtifactKind::Enriched);
        assert_eq!(latest.bytes, b"final");

        let unknown = store.latest_artifact(JobId::new()).unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn prune_enforces_per_job_cap() {
        let store = temp_store(|config| {
            config.max_artifacts_per_job = 3;
        });
        let job = JobId::new();

        let mut saved = Vec::new();
        for n in 0..8 {
            let body = format!("checkpoint {n}");
            saved.push(
                store
                    .save_artifact(job, ArtifactKind::Checkpoint, body.as_bytes())
                    .unwrap(),
            );
        }

        let deleted = store.prune_artifacts().unwrap();
        assert_eq!(deleted, 5);

        // The three newest survive; the five oldest are gone.
        for path in &saved[5..] {
            assert!(path.exists(), "{} should survive", path.display());
        }
        for path in &saved[..5] {
            assert!(!path.exists(), "{} should be pruned", path.display());
        }
    }

    #[test]
    fn prune_deletes_expired_artifacts() {
        let store = temp_store(|config| {
            config.max_artifact_age = Duration::ZERO;
        });
        let job = JobId::new();
        let path = store
            .save_artifact(job, ArtifactKind::Checkpoint, b"old")
            .unwrap();

        std::thread::sleep(Duration::from_millis(2));
        let deleted = store.prune_artifacts().unwrap();
        assert_eq!(deleted, 1);
        assert!(!path.exists());
    }

    #[test]
    fn prune_ignores_foreign_files() {
        let store = temp_store(|config| {
            config.max_artifact_age = Duration::ZERO;
        });
        let foreign = store.artifacts_dir().join("README.txt");
        std::fs::write(&foreign, "not an artifact").unwrap();

        let deleted = store.prune_artifacts().unwrap();
        assert_eq!(deleted, 0);
        assert!(foreign.exists());
    }

    #[test]
    fn prune_reclaims_stale_temp_files() {
        let store = temp_store(|_| {});
        let job = JobId::new();
        let now = Utc::now().timestamp_micros();
        let two_days_micros = 2 * 24 * 60 * 60 * 1_000_000i64;

        let stale = store
            .artifacts_dir()
            .join(format!(".{job}_{}.tmp", now - two_days_micros));
        let fresh = store.artifacts_dir().join(format!(".{job}_{now}.tmp"));
        std::fs::write(&stale, b"half-written").unwrap();
        std::fs::write(&fresh, b"in flight").unwrap();

        let deleted = store.prune_artifacts().unwrap();
        assert_eq!(deleted, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    // --- Job metadata ---

    #[test]
    fn job_metadata_lifecycle() {
        let store = temp_store(|_| {});
        let job = JobId::new();

        assert!(store.job_meta(job).unwrap().is_none());

        let created = store.create_job(job, "bom-q3.xlsx", b"input bytes").unwrap();
        assert_eq!(created.original_name, "bom-q3.xlsx");
        assert_eq!(created.input_sha256.len(), 64);

        store
            .set_column_map(
                job,
                ColumnMap {
                    header_row: 0,
                    description_col: 1,
                    part_number_col: 2,
                },
            )
            .unwrap();
        store.append_exchange(job, "search", "raw findings").unwrap();
        store.touch_job(job).unwrap();

        let loaded = store.job_meta(job).unwrap().expect("meta");
        assert_eq!(loaded.column_map.expect("map").part_number_col, 2);
        assert_eq!(loaded.exchanges.len(), 1);
        assert_eq!(loaded.exchanges[0].role, "search");
        assert!(loaded.last_access >= created.last_access);
    }

    #[test]
    fn touching_unknown_job_is_an_error() {
        let store = temp_store(|_| {});
        let err = store.touch_job(JobId::new()).unwrap_err();
        assert!(err.to_string().contains("unknown job"));
    }

    #[test]
    fn jobs_list_newest_first() {
        let store = temp_store(|_| {});
        let first = JobId::new();
        let second = JobId::new();
        store.create_job(first, "first.csv", b"a").unwrap();
        std::thread::sleep(Duration::from_millis(2));
        store.create_job(second, "second.csv", b"b").unwrap();

        let jobs = store.list_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second);
        assert_eq!(jobs[1].id, first);
    }
}
