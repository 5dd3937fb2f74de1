//! Recorded task invocations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::ids::EffectId;
use crate::status::EffectStatus;

/// The recorded input and output of one task invocation.
///
/// Exactly one record exists per (run, task). Records are never deleted
/// during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRecord {
    pub effect_id: EffectId,
    pub input: Value,
    pub output: Option<Value>,
    pub status: EffectStatus,

    /// When the current reservation was taken.
    pub reserved_at: DateTime<Utc>,

    /// Last status change.
    pub updated_at: DateTime<Utc>,

    /// Failure message when `status` is `Failed`.
    pub error: Option<String>,
}

impl EffectRecord {
    /// A fresh `pending` reservation.
    pub fn pending(effect_id: EffectId, input: Value, now: DateTime<Utc>) -> Self {
        Self {
            effect_id,
            input,
            output: None,
            status: EffectStatus::Pending,
            reserved_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// How long the reservation has been held.
    pub fn reservation_age(&self, now: DateTime<Utc>) -> Duration {
        now - self.reserved_at
    }

    /// A pending record older than `reclaim_after` may be taken over.
    pub fn is_stale(&self, now: DateTime<Utc>, reclaim_after: Duration) -> bool {
        self.status == EffectStatus::Pending && self.reservation_age(now) >= reclaim_after
    }

    /// Take a new reservation on this record (retry after failure or reclaim).
    pub fn reserve_again(&mut self, input: Value, now: DateTime<Utc>) {
        self.input = input;
        self.output = None;
        self.status = EffectStatus::Pending;
        self.reserved_at = now;
        self.updated_at = now;
        self.error = None;
    }

    /// `pending -> completed`.
    pub fn complete(&mut self, output: Value, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_pending(EffectStatus::Completed)?;
        self.status = EffectStatus::Completed;
        self.output = Some(output);
        self.updated_at = now;
        Ok(())
    }

    /// `pending -> failed`.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_pending(EffectStatus::Failed)?;
        self.status = EffectStatus::Failed;
        self.error = Some(message.into());
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self, to: EffectStatus) -> Result<(), CoreError> {
        if self.status != EffectStatus::Pending {
            return Err(CoreError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(now: DateTime<Utc>) -> EffectRecord {
        EffectRecord::pending(EffectId::from_stored("abc"), json!({"task": "x"}), now)
    }

    #[test]
    fn test_complete_exactly_once() {
        let now = Utc::now();
        let mut r = record(now);
        r.complete(json!({"ok": true}), now).unwrap();
        assert_eq!(r.status, EffectStatus::Completed);
        assert!(r.complete(json!({"ok": false}), now).is_err());
        assert_eq!(r.output, Some(json!({"ok": true})));
    }

    #[test]
    fn test_fail_then_reserve_again() {
        let now = Utc::now();
        let mut r = record(now);
        r.fail("boom", now).unwrap();
        assert_eq!(r.error.as_deref(), Some("boom"));

        r.reserve_again(json!({"task": "y"}), now);
        assert_eq!(r.status, EffectStatus::Pending);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_staleness() {
        let then = Utc::now() - Duration::minutes(30);
        let r = record(then);
        assert!(r.is_stale(Utc::now(), Duration::minutes(10)));
        assert!(!r.is_stale(Utc::now(), Duration::hours(1)));
    }
}
