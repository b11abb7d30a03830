use std::fmt;
use std::str::FromStr;

use crate::clock::EpochMillis;
use crate::error::StoreError;

/// Sort-key value marking the lock record of a partition.
pub const LOCK_ORDER_KEY: &str = "LOCK";

/// Secondary ordering key of a queue record.
///
/// Requests order by their timestamp, oldest first; the lock sorts after every request
/// so "first in order" never has to special-case it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderKey {
    /// A pending request, keyed by its request timestamp (epoch millis).
    Requested(EpochMillis),
    /// The current exclusive occupant.
    Lock,
}

impl OrderKey {
    #[inline]
    pub fn is_lock(self) -> bool {
        matches!(self, OrderKey::Lock)
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKey::Requested(ts) => write!(f, "{ts}"),
            OrderKey::Lock => f.write_str(LOCK_ORDER_KEY),
        }
    }
}

impl FromStr for OrderKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == LOCK_ORDER_KEY {
            return Ok(OrderKey::Lock);
        }
        s.parse::<u64>()
            .map(OrderKey::Requested)
            .map_err(|_| StoreError::Corrupt(format!("bad priority '{s}'")))
    }
}

/// A request or lock entry of the priority queue.
///
/// At most one record per `space_id` has `order_key == Lock`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueRecord {
    /// Partition key.
    pub space_id: String,
    /// Fleet of the requesting robot.
    pub fleet_id: String,
    /// Opaque robot handle, resolvable by the owning fleet adapter.
    pub robot: String,
    pub order_key: OrderKey,
    /// Original request time; kept on the lock so a reverted grant keeps its place.
    pub requested_at: EpochMillis,
    /// Epoch seconds after which the store reaps the record.
    pub expires_at: u64,
    /// Latest expected exit time; set only on lock records.
    pub crossing_deadline: Option<EpochMillis>,
}

impl QueueRecord {
    /// A pending request ordered by `requested_at`.
    pub fn request(
        space_id: impl Into<String>,
        fleet_id: impl Into<String>,
        robot: impl Into<String>,
        requested_at: EpochMillis,
        expires_at: u64,
    ) -> Self {
        Self {
            space_id: space_id.into(),
            fleet_id: fleet_id.into(),
            robot: robot.into(),
            order_key: OrderKey::Requested(requested_at),
            requested_at,
            expires_at,
            crossing_deadline: None,
        }
    }

    /// The lock record that replaces this request on promotion.
    pub fn to_lock(&self, crossing_deadline: EpochMillis, expires_at: u64) -> Self {
        Self {
            order_key: OrderKey::Lock,
            crossing_deadline: Some(crossing_deadline),
            expires_at,
            ..self.clone()
        }
    }

    /// The request this lock was promoted from, back at its original position.
    pub fn to_request(&self, expires_at: u64) -> Self {
        Self {
            order_key: OrderKey::Requested(self.requested_at),
            crossing_deadline: None,
            expires_at,
            ..self.clone()
        }
    }

    #[inline]
    pub fn is_lock(&self) -> bool {
        self.order_key.is_lock()
    }

    #[inline]
    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.expires_at <= now_secs
    }

    /// True when the crossing deadline has passed at `now`.
    pub fn is_overdue(&self, now: EpochMillis) -> bool {
        self.crossing_deadline.is_some_and(|deadline| now > deadline)
    }

    /// True when `robot` is the one named by this record.
    pub fn names(&self, robot: &str) -> bool {
        self.robot == robot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_sort_before_the_lock() {
        let mut keys = vec![
            OrderKey::Lock,
            OrderKey::Requested(200),
            OrderKey::Requested(99),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![OrderKey::Requested(99), OrderKey::Requested(200), OrderKey::Lock]
        );
    }

    #[test]
    fn order_key_text_form() {
        assert_eq!(OrderKey::Lock.to_string(), "LOCK");
        assert_eq!(OrderKey::Requested(1700).to_string(), "1700");
        assert_eq!("LOCK".parse::<OrderKey>(), Ok(OrderKey::Lock));
        assert_eq!("42".parse::<OrderKey>(), Ok(OrderKey::Requested(42)));
        assert!("lock".parse::<OrderKey>().is_err());
    }

    #[test]
    fn lock_and_back_preserves_position() {
        let req = QueueRecord::request("s", "f", "r", 100, 10);
        let lock = req.to_lock(500, 20);
        assert!(lock.is_lock());
        assert_eq!(lock.crossing_deadline, Some(500));
        assert!(lock.is_overdue(501));
        assert!(!lock.is_overdue(500));

        let back = lock.to_request(10);
        assert_eq!(back, req);
    }
}
