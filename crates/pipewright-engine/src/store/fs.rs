//! Filesystem store.
//!
//! Layout under the state directory:
//!
//! ```text
//! tasks/<effectId>/input.json    task input document
//! tasks/<effectId>/result.json   validated output (completed effects only)
//! tasks/<effectId>/effect.json   status, reservation time, error
//! tasks/<effectId>.lock          held while one process reads and writes the effect
//! runs/<runId>/run.json          run record
//! ```
//!
//! The `tasks/<effectId>/{input,result}.json` paths are the addressing
//! contract other tools use to find run state, so they must not change.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pipewright_core::{EffectId, EffectRecord, EffectStatus, RunId, RunRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use super::{
    apply_complete, apply_fail, decide_reservation, EffectStore, Reservation, RunStore, StoreError,
};

const INPUT_FILE: &str = "input.json";
const RESULT_FILE: &str = "result.json";
const EFFECT_FILE: &str = "effect.json";
const RUN_FILE: &str = "run.json";
const LOCK_SUFFIX: &str = ".lock";

const LOCK_RETRY: StdDuration = StdDuration::from_millis(10);
const LOCK_WAIT: StdDuration = StdDuration::from_secs(5);
/// A lock file older than this was left by a crashed process.
const LOCK_STALE: StdDuration = StdDuration::from_secs(30);

/// Status metadata kept next to the input and result documents.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectMeta {
    effect_id: EffectId,
    status: EffectStatus,
    reserved_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Lock file removed on drop.
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release effect lock");
        }
    }
}

/// Exclusive access to one effect, within this process and across processes.
struct KeyGuard {
    _file: LockFile,
    _local: OwnedMutexGuard<()>,
}

/// Effect and run store rooted at a state directory.
///
/// Writers for the same effect are serialised by an in-process mutex and by
/// a `tasks/<effectId>.lock` file created with `create_new`, so several
/// processes sharing one state directory still see a single writer per key.
pub struct FsStore {
    root: PathBuf,
    /// Per-effect locks; unrelated keys never wait on each other.
    locks: Mutex<HashMap<EffectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    fn effect_dir(&self, id: &EffectId) -> PathBuf {
        self.tasks_dir().join(id.as_str())
    }

    fn run_file(&self, id: &RunId) -> PathBuf {
        self.root.join("runs").join(id.as_str()).join(RUN_FILE)
    }

    fn key_lock(&self, id: &EffectId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    fn lock_path(&self, id: &EffectId) -> PathBuf {
        self.tasks_dir().join(format!("{}{}", id.as_str(), LOCK_SUFFIX))
    }

    /// Take the per-key lock, then the lock file.
    ///
    /// Waits up to `LOCK_WAIT` for another process to finish; a lock file
    /// older than `LOCK_STALE` is broken.
    async fn lock_key(&self, id: &EffectId) -> Result<KeyGuard, StoreError> {
        let local = self.key_lock(id).lock_owned().await;
        fs::create_dir_all(self.tasks_dir()).await?;

        let path = self.lock_path(id);
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(_) => {
                    return Ok(KeyGuard {
                        _file: LockFile { path },
                        _local: local,
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if file_age(&path).await >= LOCK_STALE {
                        warn!(effect_id = %id, "Breaking stale effect lock");
                        match fs::remove_file(&path).await {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(StoreError::Unavailable(format!(
                            "effect {id} is locked by another process"
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn read_record(&self, id: &EffectId) -> Result<Option<EffectRecord>, StoreError> {
        let dir = self.effect_dir(id);
        let Some(meta) = read_json::<EffectMeta>(&dir.join(EFFECT_FILE)).await? else {
            return Ok(None);
        };
        let input = read_json::<Value>(&dir.join(INPUT_FILE))
            .await?
            .unwrap_or(Value::Null);
        let output = if meta.status == EffectStatus::Completed {
            read_json::<Value>(&dir.join(RESULT_FILE)).await?
        } else {
            None
        };

        Ok(Some(EffectRecord {
            effect_id: meta.effect_id,
            input,
            output,
            status: meta.status,
            reserved_at: meta.reserved_at,
            updated_at: meta.updated_at,
            error: meta.error,
        }))
    }

    /// Write the documents first and the status last, so a crash mid-write
    /// never leaves a `completed` status without its result.
    async fn write_record(&self, record: &EffectRecord) -> Result<(), StoreError> {
        let dir = self.effect_dir(&record.effect_id);
        fs::create_dir_all(&dir).await?;

        write_json(&dir.join(INPUT_FILE), &record.input).await?;
        if let Some(output) = &record.output {
            write_json(&dir.join(RESULT_FILE), output).await?;
        }

        let meta = EffectMeta {
            effect_id: record.effect_id.clone(),
            status: record.status,
            reserved_at: record.reserved_at,
            updated_at: record.updated_at,
            error: record.error.clone(),
        };
        write_json(&dir.join(EFFECT_FILE), &meta).await
    }

    /// Claim the effect directory for a first reservation.
    ///
    /// `create_dir` is atomic, so two processes racing on the same fresh key
    /// cannot both win. A directory left without status metadata (a crash
    /// between claim and write) is reclaimable once older than
    /// `reclaim_after`.
    async fn claim_dir(&self, id: &EffectId, reclaim_after: Duration) -> Result<(), StoreError> {
        fs::create_dir_all(self.tasks_dir()).await?;
        let dir = self.effect_dir(id);
        match fs::create_dir(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let age = fs::metadata(&dir)
                    .await?
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .and_then(|d| Duration::from_std(d).ok())
                    .unwrap_or_else(Duration::zero);
                if age < reclaim_after {
                    return Err(StoreError::InFlight {
                        effect_id: id.to_string(),
                        age_secs: age.num_seconds(),
                    });
                }
                warn!(effect_id = %id, "Reclaiming effect directory without status metadata");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl EffectStore for FsStore {
    async fn get(&self, id: &EffectId) -> Result<Option<EffectRecord>, StoreError> {
        self.read_record(id).await
    }

    async fn put(&self, record: EffectRecord) -> Result<(), StoreError> {
        let _guard = self.lock_key(&record.effect_id).await?;
        self.write_record(&record).await
    }

    async fn reserve(
        &self,
        id: &EffectId,
        input: Value,
        now: DateTime<Utc>,
        reclaim_after: Duration,
    ) -> Result<Reservation, StoreError> {
        let _guard = self.lock_key(id).await?;

        let existing = self.read_record(id).await?;
        if existing.is_none() {
            self.claim_dir(id, reclaim_after).await?;
        }

        let (reservation, write) = decide_reservation(id, existing, input, now, reclaim_after)?;
        if let Some(record) = write {
            self.write_record(&record).await?;
            debug!(effect_id = %id, "Effect reserved");
        }
        Ok(reservation)
    }

    async fn complete(
        &self,
        id: &EffectId,
        output: Value,
        now: DateTime<Utc>,
    ) -> Result<EffectRecord, StoreError> {
        let _guard = self.lock_key(id).await?;

        let record = apply_complete(id, self.read_record(id).await?, output, now)?;
        self.write_record(&record).await?;
        Ok(record)
    }

    async fn fail(&self, id: &EffectId, message: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.lock_key(id).await?;

        let record = apply_fail(id, self.read_record(id).await?, message, now)?;
        self.write_record(&record).await
    }

    async fn list(&self) -> Result<Vec<EffectRecord>, StoreError> {
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(self.tasks_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(record) = self.read_record(&EffectId::from_stored(name)).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.effect_id.cmp(&b.effect_id));
        Ok(records)
    }
}

#[async_trait]
impl RunStore for FsStore {
    async fn load_run(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        read_json(&self.run_file(id)).await
    }

    async fn save_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        let path = self.run_file(&record.run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_json(&path, record).await
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut runs = Vec::new();
        let mut entries = match fs::read_dir(self.root.join("runs")).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            match read_json::<RunRecord>(&entry.path().join(RUN_FILE)).await {
                Ok(Some(record)) => runs.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable run record"),
            }
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

async fn file_age(path: &Path) -> StdDuration {
    fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|m| m.elapsed().ok())
        .unwrap_or_default()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file and rename so readers never see a torn document.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
