use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use time::{OffsetDateTime, UtcOffset};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::routing::{
    error::RoutingError,
    ports::TargetStorePort,
    types::{Target, TargetId},
};

type LockMap = HashMap<TargetId, Arc<Mutex<()>>>;

/// Per-target critical sections over quota state.
///
/// Whoever holds a target's guard is the only writer of that target's record. Entries exist only
/// while some caller holds or waits on them.
#[derive(Clone, Default)]
pub struct TargetLocks {
    guards: Arc<SyncMutex<LockMap>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &str) -> TargetGuard {
        let lock = {
            let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
            guards
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        TargetGuard {
            section: Some(lock.lock_owned().await),
            locks: self.clone(),
        }
    }

    /// Number of targets that currently have a lock entry.
    pub fn tracked(&self) -> usize {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Clones are only taken under the map lock, so a count of 1 means nobody holds or awaits it.
    fn release_idle(&self) {
        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        guards.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Exclusive access to one target's record. Dropping it ends the critical section.
pub struct TargetGuard {
    section: Option<OwnedMutexGuard<()>>,
    locks: TargetLocks,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        self.section.take();
        self.locks.release_idle();
    }
}

#[derive(Clone)]
pub struct QuotaAllocator {
    store: Arc<dyn TargetStorePort>,
    locks: TargetLocks,
}

impl QuotaAllocator {
    pub fn new(store: Arc<dyn TargetStorePort>, locks: TargetLocks) -> Self {
        Self { store, locks }
    }

    /// Picks the highest-value candidate with capacity left today and persists its
    /// consumed quota. `Ok(None)` means every candidate is exhausted.
    pub async fn allocate(
        &self,
        matched: Vec<Target>,
        now: OffsetDateTime,
    ) -> Result<Option<Target>, RoutingError> {
        for candidate in rank_by_value(matched) {
            let _section = self.locks.acquire(&candidate.id).await;

            // Quota fields may have moved since the listing was taken.
            let current = match self.store.get(&candidate.id).await {
                Ok(current) => current,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };

            let Some(updated) = consume_quota(current, now) else {
                tracing::debug!(
                    target: "routing",
                    target_id = %candidate.id,
                    "candidate_quota_exhausted"
                );
                continue;
            };

            self.store.replace(&updated.id, updated.clone()).await?;
            return Ok(Some(updated));
        }

        Ok(None)
    }
}

/// Descending by value. The sort is stable, so equal values keep listing order.
pub fn rank_by_value(mut targets: Vec<Target>) -> Vec<Target> {
    targets.sort_by(|lhs, rhs| rhs.value.cmp(&lhs.value));
    targets
}

pub fn same_utc_day(lhs: OffsetDateTime, rhs: OffsetDateTime) -> bool {
    lhs.to_offset(UtcOffset::UTC).date() == rhs.to_offset(UtcOffset::UTC).date()
}

/// Consumes one unit of today's quota, or returns `None` when none is left.
///
/// The first allocation of a UTC day resets the budget to `max - 1`; later ones
/// decrement while the remainder is positive. A stored remainder above `max` is clamped to
/// `max`, and a target touched today with no remainder recorded counts as exhausted.
pub fn consume_quota(mut target: Target, now: OffsetDateTime) -> Option<Target> {
    let fresh_day = target
        .last_accept_date
        .is_none_or(|last| !same_utc_day(last, now));

    let remaining = if fresh_day {
        target.max_accepts_per_day.checked_sub(1)?
    } else {
        let max = target.max_accepts_per_day;
        match target.remain_accepts_per_day.map(|remaining| remaining.min(max)) {
            Some(remaining) if remaining > 0 => remaining - 1,
            _ => return None,
        }
    };

    target.remain_accepts_per_day = Some(remaining);
    target.last_accept_date = Some(now);
    Some(target)
}
