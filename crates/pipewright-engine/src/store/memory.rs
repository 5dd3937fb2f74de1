//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pipewright_core::{EffectId, EffectRecord, RunId, RunRecord};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    apply_complete, apply_fail, decide_reservation, EffectStore, Reservation, RunStore, StoreError,
};

/// Effect and run store held in process memory.
///
/// Every mutation happens under one write lock, which gives the
/// single-writer-per-key guarantee trivially. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    effects: RwLock<HashMap<EffectId, EffectRecord>>,
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded effects.
    pub async fn effect_count(&self) -> usize {
        self.effects.read().await.len()
    }
}

#[async_trait]
impl EffectStore for MemoryStore {
    async fn get(&self, id: &EffectId) -> Result<Option<EffectRecord>, StoreError> {
        Ok(self.effects.read().await.get(id).cloned())
    }

    async fn put(&self, record: EffectRecord) -> Result<(), StoreError> {
        self.effects
            .write()
            .await
            .insert(record.effect_id.clone(), record);
        Ok(())
    }

    async fn reserve(
        &self,
        id: &EffectId,
        input: Value,
        now: DateTime<Utc>,
        reclaim_after: Duration,
    ) -> Result<Reservation, StoreError> {
        let mut effects = self.effects.write().await;
        let (reservation, write) =
            decide_reservation(id, effects.get(id).cloned(), input, now, reclaim_after)?;
        if let Some(record) = write {
            effects.insert(id.clone(), record);
        }
        Ok(reservation)
    }

    async fn complete(
        &self,
        id: &EffectId,
        output: Value,
        now: DateTime<Utc>,
    ) -> Result<EffectRecord, StoreError> {
        let mut effects = self.effects.write().await;
        let record = apply_complete(id, effects.get(id).cloned(), output, now)?;
        effects.insert(id.clone(), record.clone());
        Ok(record)
    }

    async fn fail(&self, id: &EffectId, message: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut effects = self.effects.write().await;
        let record = apply_fail(id, effects.get(id).cloned(), message, now)?;
        effects.insert(id.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EffectRecord>, StoreError> {
        let mut records: Vec<EffectRecord> = self.effects.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.effect_id.cmp(&b.effect_id));
        Ok(records)
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn load_run(&self, id: &RunId) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn save_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.runs
            .write()
            .await
            .insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut runs: Vec<RunRecord> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::EffectStatus;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_complete_then_cached() {
        let store = MemoryStore::new();
        let id = EffectId::from_stored("e1");
        let now = Utc::now();

        let first = store.reserve(&id, json!({"in": 1}), now, Duration::minutes(10)).await.unwrap();
        assert_eq!(first, Reservation::Acquired);

        store.complete(&id, json!({"out": 1}), now).await.unwrap();
        let second = store.reserve(&id, json!({"in": 1}), now, Duration::minutes(10)).await.unwrap();
        match second {
            Reservation::Cached(record) => {
                assert_eq!(record.status, EffectStatus::Completed);
                assert_eq!(record.output, Some(json!({"out": 1})));
            }
            other => panic!("expected cached, got {:?}", other),
        }
        assert_eq!(store.effect_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let id = EffectId::from_stored("contended");
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.reserve(&id, json!({}), now, Duration::minutes(10)).await
            }));
        }

        let mut acquired = 0;
        let mut in_flight = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(Reservation::Acquired) => acquired += 1,
                Err(StoreError::InFlight { .. }) => in_flight += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(acquired, 1);
        assert_eq!(in_flight, 7);
    }

    #[tokio::test]
    async fn test_put_round_trip() {
        let store = MemoryStore::new();
        let id = EffectId::from_stored("e3");
        let now = Utc::now();

        let mut record = EffectRecord::pending(id.clone(), json!({"in": 3}), now);
        record.complete(json!({"out": 3}), now).unwrap();
        store.put(record.clone()).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap(), Some(record.clone()));
        let reservation = store.reserve(&id, json!({}), now, Duration::minutes(10)).await.unwrap();
        assert_eq!(reservation, Reservation::Cached(record));
    }

    #[tokio::test]
    async fn test_fail_marks_record() {
        let store = MemoryStore::new();
        let id = EffectId::from_stored("e2");
        let now = Utc::now();
        store.reserve(&id, json!({}), now, Duration::minutes(10)).await.unwrap();
        store.fail(&id, "executor unreachable", now).await.unwrap();

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, EffectStatus::Failed);
        assert!(store.complete(&id, json!({}), now).await.is_err());
    }
}
