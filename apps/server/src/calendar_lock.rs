//! Per-date advisory locks for the booking write path.
//!
//! SQLite serializes writers, but the conflict re-check inside
//! `create_appointment` reads before it writes; two concurrent bookings for
//! the same slot could both pass the check before either insert lands.
//! Holding the day's lock across check + insert closes that window. Reads
//! (slot queries) never take the lock.

use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct CalendarLocks {
    days: DashMap<NaiveDate, Arc<Mutex<()>>>,
}

impl CalendarLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `day`, waiting if another booking or cancellation
    /// on that date is in flight.
    pub async fn lock_day(&self, day: NaiveDate) -> OwnedMutexGuard<()> {
        let cell = self
            .days
            .entry(day)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        cell.lock_owned().await
    }

    /// Drop lock entries for dates before `today`. Called from the daily
    /// maintenance sweep; uncontended entries for past dates are dead weight.
    pub fn prune_before(&self, today: NaiveDate) {
        self.days
            .retain(|day, cell| *day >= today || Arc::strong_count(cell) > 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.days.len()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_same_day_is_exclusive() {
        let locks = Arc::new(CalendarLocks::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock_day(day(2)).await;
                let n = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(n, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_days_do_not_block() {
        let locks = CalendarLocks::new();
        let _monday = locks.lock_day(day(2)).await;
        // Must not deadlock while Monday's guard is held.
        let _tuesday = locks.lock_day(day(3)).await;
    }

    #[tokio::test]
    async fn test_prune_drops_past_unheld_days() {
        let locks = CalendarLocks::new();
        drop(locks.lock_day(day(2)).await);
        drop(locks.lock_day(day(9)).await);
        assert_eq!(locks.len(), 2);

        locks.prune_before(day(5));
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_past_day() {
        let locks = CalendarLocks::new();
        let _held = locks.lock_day(day(2)).await;
        locks.prune_before(day(5));
        assert_eq!(locks.len(), 1);
    }
}
