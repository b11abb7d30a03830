//! # SQLite-backed queue store.
//!
//! Persists the queue in a `priority_queue` table whose columns follow the shared wire
//! names, so the table can be inspected or seeded by other tools:
//!
//! ```text
//! shared_space_arn  TEXT     partition key
//! priority          TEXT     decimal request time, or 'LOCK'
//! worker_arn        TEXT     robot
//! worker_fleet_arn  TEXT     fleet
//! request_time      INTEGER  epoch millis of the original request
//! max_crossing_time INTEGER  epoch millis, lock rows only
//! time_to_live      INTEGER  epoch seconds
//! ```
//!
//! Conditional writes run inside one transaction on a connection guarded by a mutex, so
//! they are atomic both within the process and against other processes sharing the file.
//! Every statement runs on tokio's blocking pool, never on a runtime worker.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{check_promotion, Enqueued, QueueStore};
use crate::clock::ClockRef;
use crate::error::StoreError;
use crate::model::{OrderKey, QueueRecord, LOCK_ORDER_KEY};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS priority_queue (
    shared_space_arn  TEXT    NOT NULL,
    priority          TEXT    NOT NULL,
    worker_arn        TEXT    NOT NULL,
    worker_fleet_arn  TEXT    NOT NULL,
    request_time      INTEGER NOT NULL,
    max_crossing_time INTEGER,
    time_to_live      INTEGER NOT NULL,
    PRIMARY KEY (shared_space_arn, priority)
)";

const COLUMNS: &str = "shared_space_arn, priority, worker_arn, worker_fleet_arn, \
                       request_time, max_crossing_time, time_to_live";

/// Durable [`QueueStore`] on SQLite.
pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
    clock: ClockRef,
}

impl SqliteQueueStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>, clock: ClockRef) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(Arc::new(Mutex::new(conn)), clock)
    }

    /// A private in-memory database.
    pub fn in_memory(clock: ClockRef) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(Arc::new(Mutex::new(conn)), clock)
    }

    /// Uses an existing connection, creating the table if missing.
    pub fn from_connection(conn: Arc<Mutex<Connection>>, clock: ClockRef) -> Result<Self, StoreError> {
        {
            let guard = lock(&conn)?;
            guard.execute_batch(SCHEMA)?;
        }
        Ok(Self { conn, clock })
    }

    /// Runs `f` on the blocking pool with the connection locked.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking store call failed: {e}")))?
    }

    fn now(&self) -> Result<i64, StoreError> {
        to_i64(self.clock.now_secs())
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|e| StoreError::Backend(format!("queue store lock poisoned: {e}")))
}

fn to_i64(v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Backend(format!("value {v} exceeds i64 range")))
}

fn to_u64(v: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative {column}: {v}")))
}

struct RawRow {
    space: String,
    priority: String,
    robot: String,
    fleet: String,
    request_time: i64,
    max_crossing_time: Option<i64>,
    time_to_live: i64,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            space: row.get(0)?,
            priority: row.get(1)?,
            robot: row.get(2)?,
            fleet: row.get(3)?,
            request_time: row.get(4)?,
            max_crossing_time: row.get(5)?,
            time_to_live: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<QueueRecord, StoreError> {
        let order_key: OrderKey = self.priority.parse()?;
        let crossing_deadline = match self.max_crossing_time {
            Some(v) => Some(to_u64(v, "max_crossing_time")?),
            None => None,
        };
        Ok(QueueRecord {
            space_id: self.space,
            fleet_id: self.fleet,
            robot: self.robot,
            order_key,
            requested_at: to_u64(self.request_time, "request_time")?,
            expires_at: to_u64(self.time_to_live, "time_to_live")?,
            crossing_deadline,
        })
    }
}

/// `INSERT OR IGNORE`; returns whether a row was written.
fn insert_or_ignore(conn: &Connection, r: &QueueRecord) -> Result<bool, StoreError> {
    let deadline = r.crossing_deadline.map(to_i64).transpose()?;
    let n = conn.execute(
        &format!("INSERT OR IGNORE INTO priority_queue ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            r.space_id,
            r.order_key.to_string(),
            r.robot,
            r.fleet_id,
            to_i64(r.requested_at)?,
            deadline,
            to_i64(r.expires_at)?,
        ],
    )?;
    Ok(n == 1)
}

/// Deletes the row at `(space, priority)` if it has expired.
fn purge_expired_at(conn: &Connection, space: &str, priority: &str, now: i64) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM priority_queue
         WHERE shared_space_arn = ?1 AND priority = ?2 AND time_to_live <= ?3",
        params![space, priority, now],
    )?;
    Ok(())
}

fn query_one(
    conn: &Connection,
    sql: &str,
    space: &str,
    now: i64,
) -> Result<Option<QueueRecord>, StoreError> {
    let raw = conn
        .query_row(sql, params![space, now], RawRow::read)
        .optional()?;
    raw.map(RawRow::into_record).transpose()
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert_if_absent(&self, record: QueueRecord) -> Result<bool, StoreError> {
        let now = self.now()?;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            purge_expired_at(&tx, &record.space_id, &record.order_key.to_string(), now)?;
            let inserted = insert_or_ignore(&tx, &record)?;
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn enqueue(&self, record: QueueRecord) -> Result<Enqueued, StoreError> {
        let now = self.now()?;
        self.blocking(move |conn| {
            // immediate: the robot check and the insert must not interleave with another writer
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let present: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM priority_queue
                 WHERE shared_space_arn = ?1 AND worker_arn = ?2 AND time_to_live > ?3)",
                params![record.space_id, record.robot, now],
                |row| row.get(0),
            )?;
            if present {
                return Ok(Enqueued::AlreadyQueued);
            }
            purge_expired_at(&tx, &record.space_id, &record.order_key.to_string(), now)?;
            if !insert_or_ignore(&tx, &record)? {
                return Ok(Enqueued::SlotTaken);
            }
            tx.commit()?;
            Ok(Enqueued::Queued)
        })
        .await
    }

    async fn current_lock_holder(&self, space: &str) -> Result<Option<QueueRecord>, StoreError> {
        let now = self.now()?;
        let space = space.to_string();
        self.blocking(move |conn| {
            query_one(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM priority_queue
                     WHERE shared_space_arn = ?1 AND priority = '{LOCK_ORDER_KEY}' AND time_to_live > ?2"
                ),
                &space,
                now,
            )
        })
        .await
    }

    async fn next_in_order(&self, space: &str) -> Result<Option<QueueRecord>, StoreError> {
        let now = self.now()?;
        let space = space.to_string();
        self.blocking(move |conn| {
            query_one(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM priority_queue
                     WHERE shared_space_arn = ?1 AND priority != '{LOCK_ORDER_KEY}' AND time_to_live > ?2
                     ORDER BY CAST(priority AS INTEGER) ASC
                     LIMIT 1"
                ),
                &space,
                now,
            )
        })
        .await
    }

    async fn promote_to_lock(
        &self,
        lock: &QueueRecord,
        request: &QueueRecord,
    ) -> Result<(), StoreError> {
        check_promotion(lock, request)?;
        let now = self.now()?;
        let (lock, request) = (lock.clone(), request.clone());
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            purge_expired_at(&tx, &lock.space_id, LOCK_ORDER_KEY, now)?;
            if !insert_or_ignore(&tx, &lock)? {
                return Err(StoreError::ConditionFailed {
                    space: lock.space_id.clone(),
                    reason: "lock already held",
                });
            }
            let removed = tx.execute(
                "DELETE FROM priority_queue
                 WHERE shared_space_arn = ?1 AND priority = ?2 AND worker_arn = ?3 AND time_to_live > ?4",
                params![
                    request.space_id,
                    request.order_key.to_string(),
                    request.robot,
                    now
                ],
            )?;
            if removed == 0 {
                // dropping `tx` rolls the lock insert back
                return Err(StoreError::ConditionFailed {
                    space: request.space_id.clone(),
                    reason: "request no longer queued",
                });
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn revert_lock(
        &self,
        lock: &QueueRecord,
        request: &QueueRecord,
    ) -> Result<(), StoreError> {
        check_promotion(lock, request)?;
        let now = self.now()?;
        let (lock, request) = (lock.clone(), request.clone());
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM priority_queue
                 WHERE shared_space_arn = ?1 AND priority = ?2 AND worker_arn = ?3 AND time_to_live > ?4",
                params![lock.space_id, LOCK_ORDER_KEY, lock.robot, now],
            )?;
            if removed == 0 {
                return Err(StoreError::ConditionFailed {
                    space: lock.space_id.clone(),
                    reason: "lock not held by robot",
                });
            }
            purge_expired_at(&tx, &request.space_id, &request.order_key.to_string(), now)?;
            if !insert_or_ignore(&tx, &request)? {
                return Err(StoreError::ConditionFailed {
                    space: request.space_id.clone(),
                    reason: "request slot taken",
                });
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, record: &QueueRecord) -> Result<bool, StoreError> {
        let record = record.clone();
        self.blocking(move |conn| {
            let n = conn.execute(
                "DELETE FROM priority_queue
                 WHERE shared_space_arn = ?1 AND priority = ?2 AND worker_arn = ?3",
                params![record.space_id, record.order_key.to_string(), record.robot],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn reap_expired(&self) -> Result<usize, StoreError> {
        let now = self.now()?;
        self.blocking(move |conn| {
            let n = conn.execute(
                "DELETE FROM priority_queue WHERE time_to_live <= ?1",
                params![now],
            )?;
            Ok(n)
        })
        .await
    }

    async fn records(&self, space: &str) -> Result<Vec<QueueRecord>, StoreError> {
        let now = self.now()?;
        let space = space.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM priority_queue
                 WHERE shared_space_arn = ?1 AND time_to_live > ?2
                 ORDER BY priority = '{LOCK_ORDER_KEY}', CAST(priority AS INTEGER)"
            ))?;
            let rows = stmt.query_map(params![space, now], RawRow::read)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?.into_record()?);
            }
            Ok(out)
        })
        .await
    }
}
