//! # In-memory queue store.
//!
//! One ordered map for all partitions: `(space_id, order_key) → record`. Because
//! [`OrderKey::Lock`] sorts after every request, a partition's range scan yields the
//! requests oldest first and the lock last. A single mutex makes each operation atomic.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{check_promotion, Enqueued, QueueStore};
use crate::clock::ClockRef;
use crate::error::StoreError;
use crate::model::{OrderKey, QueueRecord};

type Key = (String, OrderKey);

/// Process-local [`QueueStore`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use spacevisor::{MemoryQueueStore, QueueRecord, QueueStore, SystemClock};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = MemoryQueueStore::new(Arc::new(SystemClock));
/// let req = QueueRecord::request("fire-door-3", "fleet-a", "amr-17", 100, u64::MAX);
/// assert!(store.insert_if_absent(req.clone()).await.unwrap());
/// assert_eq!(store.next_in_order("fire-door-3").await.unwrap(), Some(req));
/// # });
/// ```
pub struct MemoryQueueStore {
    rows: Mutex<BTreeMap<Key, QueueRecord>>,
    clock: ClockRef,
}

impl MemoryQueueStore {
    pub fn new(clock: ClockRef) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    fn rows(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Key, QueueRecord>>, StoreError> {
        self.rows
            .lock()
            .map_err(|e| StoreError::Backend(format!("queue store lock poisoned: {e}")))
    }

    fn partition<'a>(
        rows: &'a BTreeMap<Key, QueueRecord>,
        space: &str,
        now: u64,
    ) -> impl Iterator<Item = &'a QueueRecord> + 'a {
        let lo = (space.to_string(), OrderKey::Requested(0));
        let hi = (space.to_string(), OrderKey::Lock);
        rows.range(lo..=hi)
            .map(|(_, r)| r)
            .filter(move |r| !r.is_expired(now))
    }
}

fn key_of(record: &QueueRecord) -> Key {
    (record.space_id.clone(), record.order_key)
}

fn live<'a>(rows: &'a BTreeMap<Key, QueueRecord>, key: &Key, now: u64) -> Option<&'a QueueRecord> {
    rows.get(key).filter(|r| !r.is_expired(now))
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert_if_absent(&self, record: QueueRecord) -> Result<bool, StoreError> {
        let now = self.clock.now_secs();
        let mut rows = self.rows()?;
        let key = key_of(&record);
        if live(&rows, &key, now).is_some() {
            return Ok(false);
        }
        rows.insert(key, record);
        Ok(true)
    }

    async fn enqueue(&self, record: QueueRecord) -> Result<Enqueued, StoreError> {
        let now = self.clock.now_secs();
        let mut rows = self.rows()?;
        if Self::partition(&rows, &record.space_id, now).any(|r| r.names(&record.robot)) {
            return Ok(Enqueued::AlreadyQueued);
        }
        let key = key_of(&record);
        if live(&rows, &key, now).is_some() {
            return Ok(Enqueued::SlotTaken);
        }
        rows.insert(key, record);
        Ok(Enqueued::Queued)
    }

    async fn current_lock_holder(&self, space: &str) -> Result<Option<QueueRecord>, StoreError> {
        let now = self.clock.now_secs();
        let rows = self.rows()?;
        Ok(live(&rows, &(space.to_string(), OrderKey::Lock), now).cloned())
    }

    async fn next_in_order(&self, space: &str) -> Result<Option<QueueRecord>, StoreError> {
        let now = self.clock.now_secs();
        let rows = self.rows()?;
        let next = Self::partition(&rows, space, now)
            .find(|r| !r.is_lock())
            .cloned();
        Ok(next)
    }

    async fn promote_to_lock(
        &self,
        lock: &QueueRecord,
        request: &QueueRecord,
    ) -> Result<(), StoreError> {
        check_promotion(lock, request)?;
        let now = self.clock.now_secs();
        let mut rows = self.rows()?;

        let lock_key = key_of(lock);
        if live(&rows, &lock_key, now).is_some() {
            return Err(StoreError::ConditionFailed {
                space: lock.space_id.clone(),
                reason: "lock already held",
            });
        }
        let request_key = key_of(request);
        if !live(&rows, &request_key, now).is_some_and(|r| r.names(&request.robot)) {
            return Err(StoreError::ConditionFailed {
                space: request.space_id.clone(),
                reason: "request no longer queued",
            });
        }

        rows.remove(&request_key);
        rows.insert(lock_key, lock.clone());
        Ok(())
    }

    async fn revert_lock(
        &self,
        lock: &QueueRecord,
        request: &QueueRecord,
    ) -> Result<(), StoreError> {
        check_promotion(lock, request)?;
        let now = self.clock.now_secs();
        let mut rows = self.rows()?;

        let lock_key = key_of(lock);
        if !live(&rows, &lock_key, now).is_some_and(|r| r.names(&lock.robot)) {
            return Err(StoreError::ConditionFailed {
                space: lock.space_id.clone(),
                reason: "lock not held by robot",
            });
        }
        let request_key = key_of(request);
        if live(&rows, &request_key, now).is_some() {
            return Err(StoreError::ConditionFailed {
                space: request.space_id.clone(),
                reason: "request slot taken",
            });
        }

        rows.remove(&lock_key);
        rows.insert(request_key, request.clone());
        Ok(())
    }

    async fn delete(&self, record: &QueueRecord) -> Result<bool, StoreError> {
        let mut rows = self.rows()?;
        let key = key_of(record);
        if rows.get(&key).is_some_and(|r| r.names(&record.robot)) {
            rows.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn reap_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_secs();
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, r| !r.is_expired(now));
        Ok(before - rows.len())
    }

    async fn records(&self, space: &str) -> Result<Vec<QueueRecord>, StoreError> {
        let now = self.clock.now_secs();
        let rows = self.rows()?;
        Ok(Self::partition(&rows, space, now).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::store::conformance;

    fn fixture() -> (MemoryQueueStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (MemoryQueueStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let (store, clock) = fixture();
        conformance::insert_is_idempotent(&store, &clock).await;
    }

    #[tokio::test]
    async fn enqueue_admits_one_record_per_robot() {
        let (store, clock) = fixture();
        conformance::enqueue_admits_one_record_per_robot(&store, &clock).await;
    }

    #[tokio::test]
    async fn next_in_order_is_oldest_request() {
        let (store, clock) = fixture();
        conformance::next_in_order_is_oldest_request(&store, &clock).await;
    }

    #[tokio::test]
    async fn promotion_is_exclusive() {
        let (store, clock) = fixture();
        conformance::promotion_is_exclusive(&store, &clock).await;
    }

    #[tokio::test]
    async fn promotion_requires_the_request() {
        let (store, clock) = fixture();
        conformance::promotion_requires_the_request(&store, &clock).await;
    }

    #[tokio::test]
    async fn revert_restores_queue_position() {
        let (store, clock) = fixture();
        conformance::revert_restores_queue_position(&store, &clock).await;
    }

    #[tokio::test]
    async fn delete_is_conditional_on_robot() {
        let (store, clock) = fixture();
        conformance::delete_is_conditional_on_robot(&store, &clock).await;
    }

    #[tokio::test]
    async fn expired_records_vanish() {
        let (store, clock) = fixture();
        conformance::expired_records_vanish(&store, &clock).await;
    }

    #[tokio::test]
    async fn expired_lock_is_replaced_on_promotion() {
        let (store, clock) = fixture();
        conformance::expired_lock_is_replaced_on_promotion(&store, &clock).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_promotions_yield_one_lock() {
        let (store, clock) = fixture();
        let store = Arc::new(store);
        let ttl = clock.now_secs() + 86_400;

        let mut requests = Vec::new();
        for i in 0..16u64 {
            let r = QueueRecord::request("s1", "fleet-a", format!("amr-{i}"), 100 + i, ttl);
            store.insert_if_absent(r.clone()).await.unwrap();
            requests.push(r);
        }

        let handles: Vec<_> = requests
            .into_iter()
            .map(|r| {
                let store = store.clone();
                tokio::spawn(async move { store.promote_to_lock(&r.to_lock(1, ttl), &r).await })
            })
            .collect();

        let mut won = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                won += 1;
            }
        }
        assert_eq!(won, 1);

        let records = store.records("s1").await.unwrap();
        assert_eq!(records.iter().filter(|r| r.is_lock()).count(), 1);
        assert_eq!(records.len(), 16);
    }
}
