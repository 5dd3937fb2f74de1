//! Effect and run persistence.
//!
//! The [`EffectStore`] maps an effect id to the recorded input and output of
//! one task invocation. It is what makes a run re-runnable: completed
//! effects are served from the store instead of being dispatched again.
//!
//! The [`RunStore`] keeps one [`RunRecord`] per run so a run can sit in
//! `AwaitingApproval` across processes.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pipewright_core::{EffectId, EffectRecord, EffectStatus, RunId, RunRecord};
use serde_json::Value;
use thiserror::Error;

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another dispatcher holds a fresh reservation on this effect.
    #[error("effect {effect_id} is already in flight (reserved {age_secs}s ago)")]
    InFlight { effect_id: String, age_secs: i64 },

    /// A status change was attempted from the wrong state.
    #[error("effect {effect_id} conflict: {message}")]
    Conflict { effect_id: String, message: String },

    #[error("effect {0} not found")]
    NotFound(String),
}

/// Outcome of reserving an effect id.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The caller now holds the single `pending` reservation and must
    /// dispatch the task.
    Acquired,
    /// The effect already completed; its output can be reused.
    Cached(EffectRecord),
}

/// Trait for effect storage backends.
#[async_trait]
pub trait EffectStore: Send + Sync {
    /// Fetch the record for `id`, if any.
    async fn get(&self, id: &EffectId) -> Result<Option<EffectRecord>, StoreError>;

    /// Write `record` unconditionally.
    async fn put(&self, record: EffectRecord) -> Result<(), StoreError>;

    /// Reserve `id` for dispatch; see [`decide_reservation`] for the rules.
    async fn reserve(
        &self,
        id: &EffectId,
        input: Value,
        now: DateTime<Utc>,
        reclaim_after: Duration,
    ) -> Result<Reservation, StoreError>;

    /// Mark a pending effect completed with `output`, exactly once.
    async fn complete(
        &self,
        id: &EffectId,
        output: Value,
        now: DateTime<Utc>,
    ) -> Result<EffectRecord, StoreError>;

    /// Mark a pending effect failed.
    async fn fail(&self, id: &EffectId, message: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// All records, ordered by effect id.
    async fn list(&self) -> Result<Vec<EffectRecord>, StoreError>;
}

/// Trait for run record storage backends.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn load_run(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError>;

    async fn save_run(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// All run records, newest first.
    async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError>;
}

/// Decide what reserving `id` means given its current record.
///
/// - absent: a new `pending` record is written.
/// - `pending` and younger than `reclaim_after`: someone else is
///   dispatching it, [`StoreError::InFlight`].
/// - `pending` and stale: reclaimed.
/// - `completed`: served from the store.
/// - `failed`: re-reserved, so a re-invocation retries it.
///
/// Returns the reservation and the record to write, if any. Callers must
/// hold the per-key write lock around read, decide and write.
pub(crate) fn decide_reservation(
    id: &EffectId,
    existing: Option<EffectRecord>,
    input: Value,
    now: DateTime<Utc>,
    reclaim_after: Duration,
) -> Result<(Reservation, Option<EffectRecord>), StoreError> {
    match existing {
        None => Ok((
            Reservation::Acquired,
            Some(EffectRecord::pending(id.clone(), input, now)),
        )),
        Some(record) => match record.status {
            EffectStatus::Completed => Ok((Reservation::Cached(record), None)),
            EffectStatus::Pending if !record.is_stale(now, reclaim_after) => {
                Err(StoreError::InFlight {
                    effect_id: id.to_string(),
                    age_secs: record.reservation_age(now).num_seconds(),
                })
            }
            EffectStatus::Pending | EffectStatus::Failed => {
                let mut record = record;
                record.reserve_again(input, now);
                Ok((Reservation::Acquired, Some(record)))
            }
        },
    }
}

/// Apply `pending -> completed` to `record`.
pub(crate) fn apply_complete(
    id: &EffectId,
    record: Option<EffectRecord>,
    output: Value,
    now: DateTime<Utc>,
) -> Result<EffectRecord, StoreError> {
    let mut record = record.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    record.complete(output, now).map_err(|e| StoreError::Conflict {
        effect_id: id.to_string(),
        message: e.to_string(),
    })?;
    Ok(record)
}

/// Apply `pending -> failed` to `record`.
pub(crate) fn apply_fail(
    id: &EffectId,
    record: Option<EffectRecord>,
    message: &str,
    now: DateTime<Utc>,
) -> Result<EffectRecord, StoreError> {
    let mut record = record.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    record.fail(message, now).map_err(|e| StoreError::Conflict {
        effect_id: id.to_string(),
        message: e.to_string(),
    })?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id() -> EffectId {
        EffectId::from_stored("e1")
    }

    #[test]
    fn test_absent_is_acquired() {
        let (res, write) = decide_reservation(&id(), None, json!({}), Utc::now(), Duration::minutes(10)).unwrap();
        assert_eq!(res, Reservation::Acquired);
        assert_eq!(write.unwrap().status, EffectStatus::Pending);
    }

    #[test]
    fn test_fresh_pending_is_in_flight() {
        let now = Utc::now();
        let existing = EffectRecord::pending(id(), json!({}), now);
        let err = decide_reservation(&id(), Some(existing), json!({}), now, Duration::minutes(10)).unwrap_err();
        assert!(matches!(err, StoreError::InFlight { .. }));
    }

    #[test]
    fn test_stale_pending_is_reclaimed() {
        let now = Utc::now();
        let existing = EffectRecord::pending(id(), json!({}), now - Duration::minutes(11));
        let (res, write) =
            decide_reservation(&id(), Some(existing), json!({"v": 2}), now, Duration::minutes(10)).unwrap();
        assert_eq!(res, Reservation::Acquired);
        let write = write.unwrap();
        assert_eq!(write.reserved_at, now);
        assert_eq!(write.input, json!({"v": 2}));
    }

    #[test]
    fn test_completed_is_cached_without_write() {
        let now = Utc::now();
        let mut existing = EffectRecord::pending(id(), json!({}), now);
        existing.complete(json!({"ok": true}), now).unwrap();
        let (res, write) =
            decide_reservation(&id(), Some(existing), json!({}), now, Duration::minutes(10)).unwrap();
        assert!(matches!(res, Reservation::Cached(r) if r.output == Some(json!({"ok": true}))));
        assert!(write.is_none());
    }

    #[test]
    fn test_failed_is_retried() {
        let now = Utc::now();
        let mut existing = EffectRecord::pending(id(), json!({}), now);
        existing.fail("boom", now).unwrap();
        let (res, _) = decide_reservation(&id(), Some(existing), json!({}), now, Duration::minutes(10)).unwrap();
        assert_eq!(res, Reservation::Acquired);
    }

    #[test]
    fn test_complete_requires_pending() {
        let now = Utc::now();
        assert!(matches!(
            apply_complete(&id(), None, json!({}), now),
            Err(StoreError::NotFound(_))
        ));
        let done = apply_complete(&id(), Some(EffectRecord::pending(id(), json!({}), now)), json!({}), now).unwrap();
        assert!(matches!(
            apply_complete(&id(), Some(done), json!({}), now),
            Err(StoreError::Conflict { .. })
        ));
    }
}
