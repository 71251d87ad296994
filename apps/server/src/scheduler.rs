//! Daily background sweep: reminder emails for tomorrow's appointments,
//! plus housekeeping on the calendar lock map.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::calendar_lock::CalendarLocks;
use crate::mailer::Mailer;
use crate::models::ReminderRow;
use crate::time::{fmt_datetime, studio_now};

/// Studio-local hour at which the daily sweep runs.
const SWEEP_HOUR: u32 = 10;

/// Time until the next 10:00 studio time, strictly in the future.
fn until_next_sweep(now: NaiveDateTime) -> std::time::Duration {
    let sweep_time = NaiveTime::from_hms_opt(SWEEP_HOUR, 0, 0).unwrap();
    let today = now.date().and_time(sweep_time);
    let next = if now < today {
        today
    } else {
        today + Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

/// Send a reminder for every confirmed appointment starting tomorrow.
/// Per-recipient failures are logged and skipped; returns how many went out.
pub async fn send_due_reminders(
    db: &SqlitePool,
    mailer: &Mailer,
    now: NaiveDateTime,
) -> anyhow::Result<usize> {
    let tomorrow = now.date() + Duration::days(1);
    let from = fmt_datetime(tomorrow.and_hms_opt(0, 0, 0).unwrap());
    let to = fmt_datetime((tomorrow + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap());

    let due = sqlx::query_as::<_, ReminderRow>(
        "SELECT a.id, a.start_time, u.email, u.full_name,
                s.name AS service_name, s.duration_min
         FROM appointments a
         JOIN users u ON u.id = a.client_id
         JOIN services s ON s.id = a.service_id
         WHERE a.start_time >= ? AND a.start_time < ? AND a.status = 'confirmed'
         ORDER BY a.start_time ASC",
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(db)
    .await?;

    let mut sent = 0;
    for row in &due {
        match mailer
            .deliver_reminder(
                &row.email,
                &row.full_name,
                &row.service_name,
                &row.start_time,
                row.id,
            )
            .await
        {
            Ok(()) => sent += 1,
            Err(e) => {
                tracing::error!("reminder for appointment {} failed: {}", row.id, e);
            }
        }
    }
    Ok(sent)
}

/// Spawn the daily sweep loop onto the runtime.
pub fn spawn_daily_sweep(db: SqlitePool, mailer: Mailer, locks: Arc<CalendarLocks>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(until_next_sweep(studio_now())).await;

            let now = studio_now();
            locks.prune_before(now.date());
            match send_due_reminders(&db, &mailer, now).await {
                Ok(n) => tracing::info!("daily sweep sent {} appointment reminders", n),
                Err(e) => tracing::error!("daily reminder sweep failed: {}", e),
            }
        }
    });
}

// ── Tests ──
