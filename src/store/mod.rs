//! # Priority queue store.
//!
//! A partitioned table keyed by shared space id with a secondary [`OrderKey`]. Each
//! partition holds the pending requests of one space, oldest first, and at most one lock
//! record. The store has no business logic; it only offers the conditional writes the
//! arbiter needs to keep that "at most one lock" guarantee under any interleaving.
//!
//! ```text
//!  partition "fire-door-3"
//!  ┌───────────────┬──────────┬─────────┬───────────────┐
//!  │ order_key     │ robot    │ fleet   │ expires_at    │
//!  ├───────────────┼──────────┼─────────┼───────────────┤
//!  │ 1700000000100 │ amr-17   │ fleet-a │ +1 day        │ ◄── next_in_order
//!  │ 1700000000450 │ agv-02   │ fleet-b │ +1 day        │
//!  │ LOCK          │ amr-09   │ fleet-a │ refreshed     │ ◄── current_lock_holder
//!  └───────────────┴──────────┴─────────┴───────────────┘
//! ```
//!
//! Records whose `expires_at` has passed are invisible to every read and are removed by
//! [`QueueStore::reap_expired`] (and opportunistically by writes touching their key).
//!
//! Backends:
//! - [`MemoryQueueStore`]: process-local, for tests, demos and single-node sites.
//! - [`SqliteQueueStore`] (feature `sqlite`): durable, survives restarts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::QueueRecord;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryQueueStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteQueueStore;

/// Shared handle to a queue store.
pub type StoreRef = Arc<dyn QueueStore>;

/// Outcome of [`QueueStore::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The request was written.
    Queued,
    /// The robot already has a live request or the lock in this space; nothing written.
    AlreadyQueued,
    /// Another robot's record sits at the same order key; nothing written.
    SlotTaken,
}

/// Persistent priority queue with lock semantics.
///
/// Every method is keyed by `record.space_id` (or `space`). Implementations must make
/// [`promote_to_lock`](QueueStore::promote_to_lock) and
/// [`revert_lock`](QueueStore::revert_lock) all-or-nothing.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Inserts `record` unless a live record with the same `(space_id, order_key)` exists.
    ///
    /// Returns `true` when the record was written.
    async fn insert_if_absent(&self, record: QueueRecord) -> Result<bool, StoreError>;

    /// Inserts the request `record` unless its robot already has a live record in the
    /// space or its `(space_id, order_key)` is taken. Check and write are one atomic step.
    async fn enqueue(&self, record: QueueRecord) -> Result<Enqueued, StoreError>;

    /// The live lock record of `space`, if any.
    async fn current_lock_holder(&self, space: &str) -> Result<Option<QueueRecord>, StoreError>;

    /// The oldest live request of `space`, never the lock.
    async fn next_in_order(&self, space: &str) -> Result<Option<QueueRecord>, StoreError>;

    /// Atomically writes `lock` and removes `request`.
    ///
    /// Fails with [`StoreError::ConditionFailed`] and changes nothing when a live lock
    /// already exists or `request` is no longer present for its robot. An expired lock is
    /// purged first.
    async fn promote_to_lock(
        &self,
        lock: &QueueRecord,
        request: &QueueRecord,
    ) -> Result<(), StoreError>;

    /// Atomic inverse of [`promote_to_lock`](QueueStore::promote_to_lock): removes `lock`
    /// (only if it still names `lock.robot`) and puts `request` back.
    async fn revert_lock(&self, lock: &QueueRecord, request: &QueueRecord)
        -> Result<(), StoreError>;

    /// Removes the record at `(space_id, order_key)` if it names `record.robot`.
    ///
    /// Returns `true` when a record was removed.
    async fn delete(&self, record: &QueueRecord) -> Result<bool, StoreError>;

    /// Removes every expired record; returns how many were removed.
    async fn reap_expired(&self) -> Result<usize, StoreError>;

    /// Live records of `space`: requests oldest first, then the lock.
    async fn records(&self, space: &str) -> Result<Vec<QueueRecord>, StoreError>;
}

pub(crate) fn check_promotion(lock: &QueueRecord, request: &QueueRecord) -> Result<(), StoreError> {
    if !lock.is_lock() || request.is_lock() || lock.space_id != request.space_id {
        return Err(StoreError::ConditionFailed {
            space: lock.space_id.clone(),
            reason: "malformed lock/request pair",
        });
    }
    Ok(())
}

/// Behaviour every backend must share; each backend's tests run these.
#[cfg(test)]
pub(crate) mod conformance {
    use std::time::Duration;

    use super::*;
    use crate::clock::{Clock, ManualClock};

    const DAY: u64 = 86_400;

    pub(crate) fn request(clock: &ManualClock, space: &str, robot: &str, at: u64) -> QueueRecord {
        QueueRecord::request(space, "fleet-a", robot, at, clock.now_secs() + DAY)
    }

    pub(crate) async fn insert_is_idempotent(store: &dyn QueueStore, clock: &ManualClock) {
        let r = request(clock, "s1", "amr-1", 100);
        assert!(store.insert_if_absent(r.clone()).await.unwrap());
        assert!(!store.insert_if_absent(r.clone()).await.unwrap());
        assert_eq!(store.records("s1").await.unwrap(), vec![r]);
        assert!(store.records("s2").await.unwrap().is_empty());
    }

    pub(crate) async fn enqueue_admits_one_record_per_robot(store: &dyn QueueStore, clock: &ManualClock) {
        let first = request(clock, "s1", "amr-1", 100);
        assert_eq!(store.enqueue(first.clone()).await.unwrap(), Enqueued::Queued);
        assert_eq!(
            store.enqueue(request(clock, "s1", "amr-1", 400)).await.unwrap(),
            Enqueued::AlreadyQueued
        );
        assert_eq!(
            store.enqueue(request(clock, "s1", "amr-2", 100)).await.unwrap(),
            Enqueued::SlotTaken
        );
        // other spaces are independent
        assert_eq!(
            store.enqueue(request(clock, "s2", "amr-1", 100)).await.unwrap(),
            Enqueued::Queued
        );

        // the lock holder counts as queued too
        let lock = first.to_lock(1, clock.now_secs() + DAY);
        store.promote_to_lock(&lock, &first).await.unwrap();
        assert_eq!(
            store.enqueue(request(clock, "s1", "amr-1", 900)).await.unwrap(),
            Enqueued::AlreadyQueued
        );
        assert_eq!(store.records("s1").await.unwrap(), vec![lock]);
    }

    pub(crate) async fn next_in_order_is_oldest_request(store: &dyn QueueStore, clock: &ManualClock) {
        let newer = request(clock, "s1", "amr-2", 2_000);
        let older = request(clock, "s1", "amr-1", 900);
        store.insert_if_absent(newer.clone()).await.unwrap();
        store.insert_if_absent(older.clone()).await.unwrap();

        assert_eq!(store.next_in_order("s1").await.unwrap(), Some(older.clone()));
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), None);

        let lock = older.to_lock(5_000, clock.now_secs() + DAY);
        store.promote_to_lock(&lock, &older).await.unwrap();
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), Some(lock.clone()));
        assert_eq!(store.next_in_order("s1").await.unwrap(), Some(newer.clone()));
        assert_eq!(store.records("s1").await.unwrap(), vec![newer, lock]);
    }

    pub(crate) async fn promotion_is_exclusive(store: &dyn QueueStore, clock: &ManualClock) {
        let a = request(clock, "s1", "amr-1", 100);
        let b = request(clock, "s1", "amr-2", 200);
        store.insert_if_absent(a.clone()).await.unwrap();
        store.insert_if_absent(b.clone()).await.unwrap();

        let ttl = clock.now_secs() + DAY;
        store.promote_to_lock(&a.to_lock(1, ttl), &a).await.unwrap();

        let err = store.promote_to_lock(&b.to_lock(1, ttl), &b).await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
        // the losing request is untouched
        assert_eq!(store.next_in_order("s1").await.unwrap(), Some(b));
        assert_eq!(store.current_lock_holder("s1").await.unwrap().unwrap().robot, "amr-1");
    }

    pub(crate) async fn promotion_requires_the_request(store: &dyn QueueStore, clock: &ManualClock) {
        let a = request(clock, "s1", "amr-1", 100);
        let ttl = clock.now_secs() + DAY;
        let err = store.promote_to_lock(&a.to_lock(1, ttl), &a).await.unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), None);

        // same slot, different robot
        store.insert_if_absent(a.clone()).await.unwrap();
        let mut imposter = a.clone();
        imposter.robot = "amr-9".into();
        let err = store
            .promote_to_lock(&imposter.to_lock(1, ttl), &imposter)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
        assert_eq!(store.records("s1").await.unwrap(), vec![a]);
    }

    pub(crate) async fn revert_restores_queue_position(store: &dyn QueueStore, clock: &ManualClock) {
        let a = request(clock, "s1", "amr-1", 100);
        let b = request(clock, "s1", "amr-2", 200);
        store.insert_if_absent(a.clone()).await.unwrap();
        store.insert_if_absent(b.clone()).await.unwrap();
        let lock = a.to_lock(1, clock.now_secs() + DAY);
        store.promote_to_lock(&lock, &a).await.unwrap();

        let mut wrong = lock.clone();
        wrong.robot = "amr-2".into();
        assert!(store.revert_lock(&wrong, &a).await.is_err());

        store.revert_lock(&lock, &a).await.unwrap();
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), None);
        assert_eq!(store.next_in_order("s1").await.unwrap(), Some(a));
    }

    pub(crate) async fn delete_is_conditional_on_robot(store: &dyn QueueStore, clock: &ManualClock) {
        let a = request(clock, "s1", "amr-1", 100);
        store.insert_if_absent(a.clone()).await.unwrap();
        let lock = a.to_lock(1, clock.now_secs() + DAY);
        store.promote_to_lock(&lock, &a).await.unwrap();

        let mut other = lock.clone();
        other.robot = "amr-2".into();
        assert!(!store.delete(&other).await.unwrap());
        assert!(store.current_lock_holder("s1").await.unwrap().is_some());

        assert!(store.delete(&lock).await.unwrap());
        assert!(!store.delete(&lock).await.unwrap());
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), None);
    }

    pub(crate) async fn expired_records_vanish(store: &dyn QueueStore, clock: &ManualClock) {
        let short = QueueRecord::request("s1", "fleet-a", "amr-1", 100, clock.now_secs() + 10);
        let long = request(clock, "s1", "amr-2", 200);
        store.insert_if_absent(short.clone()).await.unwrap();
        store.insert_if_absent(long.clone()).await.unwrap();

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.next_in_order("s1").await.unwrap(), Some(long.clone()));

        // an expired record does not block re-insertion of its key
        let again = request(clock, "s1", "amr-1", 100);
        assert!(store.insert_if_absent(again).await.unwrap());
        assert_eq!(store.records("s1").await.unwrap().len(), 2);

        clock.advance(Duration::from_secs(DAY));
        assert_eq!(store.reap_expired().await.unwrap(), 2);
        assert!(store.records("s1").await.unwrap().is_empty());
    }

    pub(crate) async fn expired_lock_is_replaced_on_promotion(store: &dyn QueueStore, clock: &ManualClock) {
        let a = request(clock, "s1", "amr-1", 100);
        store.insert_if_absent(a.clone()).await.unwrap();
        store
            .promote_to_lock(&a.to_lock(1, clock.now_secs() + 5), &a)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), None);

        let b = request(clock, "s1", "amr-2", 200);
        store.insert_if_absent(b.clone()).await.unwrap();
        let lock = b.to_lock(1, clock.now_secs() + DAY);
        store.promote_to_lock(&lock, &b).await.unwrap();
        assert_eq!(store.current_lock_holder("s1").await.unwrap(), Some(lock));
    }
}
