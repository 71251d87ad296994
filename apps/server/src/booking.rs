//! Booking coordination: the read-check-write sequences that create and
//! cancel appointments.
//!
//! The practitioner is a single resource, so the global invariant is that no
//! two non-cancelled appointments overlap. Both operations here run their
//! checks and writes inside one transaction *and* under the per-date advisory
//! lock: the transaction gives atomicity (a decremented session without its
//! appointment row is never observable), the lock serializes concurrent
//! check-then-insert sequences that the transaction alone would not.

use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;

use crate::calendar_lock::CalendarLocks;
use crate::error::ApiError;
use crate::models::{Appointment, ClientSubscription, Service};
use crate::time::{fmt_datetime, parse_datetime};

/// Cancelling earlier than this many hours before the start refunds the
/// session to the attached subscription.
pub const REFUND_CUTOFF_HOURS: i64 = 24;

const SERVICE_COLUMNS: &str =
    "SELECT id, name, description, duration_min, price, category, is_active FROM services";

const APPOINTMENT_COLUMNS: &str = "SELECT id, client_id, service_id, subscription_id, \
     start_time, end_time, status, notes, created_at FROM appointments";

#[derive(Debug, Clone)]
pub struct CreateAppointment {
    pub client_id: i64,
    pub service_id: i64,
    pub start_time: NaiveDateTime,
    pub subscription_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug)]
pub struct Cancellation {
    pub appointment: Appointment,
    pub refunded: bool,
}

/// A cancellation refunds its session iff it happens strictly more than the
/// cutoff ahead of the appointment start.
pub fn refund_eligible(now: NaiveDateTime, start_time: NaiveDateTime) -> bool {
    now < start_time - Duration::hours(REFUND_CUTOFF_HOURS)
}

/// Create a confirmed appointment at `start_time`, consuming one subscription
/// session when a subscription is attached.
///
/// The overlap re-check inside the transaction is authoritative: it does not
/// trust whatever slot list the caller observed, so the race between slot
/// query and booking collapses to a `Conflict` here.
pub async fn create_appointment(
    db: &SqlitePool,
    locks: &CalendarLocks,
    now: NaiveDateTime,
    req: CreateAppointment,
) -> Result<Appointment, ApiError> {
    let service = sqlx::query_as::<_, Service>(&format!(
        "{SERVICE_COLUMNS} WHERE id = ? AND is_active = 1"
    ))
    .bind(req.service_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Service not found"))?;

    let end_time = req.start_time + Duration::minutes(service.duration_min);
    let start_text = fmt_datetime(req.start_time);
    let end_text = fmt_datetime(end_time);

    let _day = locks.lock_day(req.start_time.date()).await;
    let mut tx = db.begin().await?;

    // Authoritative half-open overlap re-check against every live booking.
    let conflicts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments
         WHERE status != 'cancelled' AND start_time < ? AND end_time > ?",
    )
    .bind(&end_text)
    .bind(&start_text)
    .fetch_one(&mut *tx)
    .await?;

    if conflicts > 0 {
        return Err(ApiError::Conflict("Time slot is no longer available"));
    }

    if let Some(subscription_id) = req.subscription_id {
        let subscription = sqlx::query_as::<_, ClientSubscription>(
            "SELECT id, client_id, plan_id, start_date, end_date, sessions_remaining,
                    status, payment_status
             FROM client_subscriptions
             WHERE id = ? AND client_id = ? AND status = 'active' AND sessions_remaining > 0",
        )
        .bind(subscription_id)
        .bind(req.client_id)
        .fetch_optional(&mut *tx)
        .await?;

        if subscription.is_none() {
            return Err(ApiError::InvalidSubscription);
        }

        // Guarded decrement: the balance check must hold at write time, not
        // just at the read above; two bookings on different days share no
        // day lock, and the balance must never go negative.
        let consumed = sqlx::query(
            "UPDATE client_subscriptions SET sessions_remaining = sessions_remaining - 1
             WHERE id = ? AND sessions_remaining > 0",
        )
        .bind(subscription_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if consumed == 0 {
            return Err(ApiError::InvalidSubscription);
        }
    }

    let appointment_id = sqlx::query(
        "INSERT INTO appointments
         (client_id, service_id, subscription_id, start_time, end_time, status, notes, created_at)
         VALUES (?, ?, ?, ?, ?, 'confirmed', ?, ?)",
    )
    .bind(req.client_id)
    .bind(req.service_id)
    .bind(req.subscription_id)
    .bind(&start_text)
    .bind(&end_text)
    .bind(&req.notes)
    .bind(fmt_datetime(now))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;

    let appointment = sqlx::query_as::<_, Appointment>(&format!(
        "{APPOINTMENT_COLUMNS} WHERE id = ?"
    ))
    .bind(appointment_id)
    .fetch_one(db)
    .await?;

    Ok(appointment)
}

/// Cancel a client's upcoming appointment, refunding the subscription session
/// when cancelled early enough.
pub async fn cancel_appointment(
    db: &SqlitePool,
    locks: &CalendarLocks,
    now: NaiveDateTime,
    appointment_id: i64,
    client_id: i64,
) -> Result<Cancellation, ApiError> {
    let appointment = sqlx::query_as::<_, Appointment>(&format!(
        "{APPOINTMENT_COLUMNS} WHERE id = ? AND client_id = ?"
    ))
    .bind(appointment_id)
    .bind(client_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Appointment not found"))?;

    if appointment.status == "cancelled" {
        return Err(ApiError::AlreadyCancelled);
    }

    let start_time = parse_datetime(&appointment.start_time).ok_or_else(|| {
        ApiError::Internal(format!(
            "appointment {} has unparseable start_time {:?}",
            appointment.id, appointment.start_time
        ))
    })?;

    if start_time <= now {
        return Err(ApiError::AlreadyOccurred);
    }

    let refund = refund_eligible(now, start_time) && appointment.subscription_id.is_some();

    let _day = locks.lock_day(start_time.date()).await;
    let mut tx = db.begin().await?;

    // Guarded transition: a concurrent cancellation that won the race leaves
    // zero rows to update here, so the session is refunded at most once.
    let cancelled = sqlx::query(
        "UPDATE appointments SET status = 'cancelled' WHERE id = ? AND status != 'cancelled'",
    )
    .bind(appointment.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if cancelled == 0 {
        return Err(ApiError::AlreadyCancelled);
    }

    if refund {
        sqlx::query(
            "UPDATE client_subscriptions SET sessions_remaining = sessions_remaining + 1
             WHERE id = ?",
        )
        .bind(appointment.subscription_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let appointment = sqlx::query_as::<_, Appointment>(&format!(
        "{APPOINTMENT_COLUMNS} WHERE id = ?"
    ))
    .bind(appointment.id)
    .fetch_one(db)
    .await?;

    Ok(Cancellation {
        appointment,
        refunded: refund,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// In-memory database with schema + seed applied. One connection, so
    /// every query in a test sees the same database.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn insert_client(pool: &SqlitePool, email: &str) -> i64 {
        sqlx::query(
            "INSERT INTO users (email, password_hash, full_name, role)
             VALUES (?, 'x', 'Test Client', 'client')",
        )
        .bind(email)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn insert_subscription(pool: &SqlitePool, client_id: i64, sessions: i64) -> i64 {
        sqlx::query(
            "INSERT INTO client_subscriptions
             (client_id, plan_id, start_date, end_date, sessions_remaining, status, payment_status)
             VALUES (?, 1, '2026-03-01', '2026-03-31', ?, 'active', 'paid')",
        )
        .bind(client_id)
        .bind(sessions)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn sessions_remaining(pool: &SqlitePool, id: i64) -> i64 {
        sqlx::query_scalar("SELECT sessions_remaining FROM client_subscriptions WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn appointment_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    /// Seed service 1 is the 60-minute relaxing massage.
    fn request(client_id: i64, start: &str) -> CreateAppointment {
        CreateAppointment {
            client_id,
            service_id: 1,
            start_time: dt(start),
            subscription_id: None,
            notes: None,
        }
    }

    #[test]
    fn test_refund_eligibility_cutoff() {
        let start = dt("2026-03-02 10:00:00");
        assert!(refund_eligible(dt("2026-03-01 09:59:59"), start));
        // Exactly 24h before is not "more than 24h ahead".
        assert!(!refund_eligible(dt("2026-03-01 10:00:00"), start));
        assert!(!refund_eligible(dt("2026-03-02 09:00:00"), start));
    }

    #[tokio::test]
    async fn test_create_confirmed_with_computed_end() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();

        let appt = create_appointment(
            &pool,
            &locks,
            dt("2026-03-01 12:00:00"),
            request(client, "2026-03-02 10:00:00"),
        )
        .await
        .unwrap();

        assert_eq!(appt.status, "confirmed");
        assert_eq!(appt.start_time, "2026-03-02 10:00:00");
        assert_eq!(appt.end_time, "2026-03-02 11:00:00");
        assert_eq!(appt.subscription_id, None);
    }

    #[tokio::test]
    async fn test_create_unknown_service_not_found() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();

        let mut req = request(client, "2026-03-02 10:00:00");
        req.service_id = 9999;
        let err = create_appointment(&pool, &locks, dt("2026-03-01 12:00:00"), req)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(appointment_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_overlapping_booking_conflicts() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 12:00:00");

        create_appointment(&pool, &locks, now, request(client, "2026-03-02 10:00:00"))
            .await
            .unwrap();

        // 10:30 starts inside the booked 10:00–11:00 hour.
        let err = create_appointment(&pool, &locks, now, request(client, "2026-03-02 10:30:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(appointment_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_conflict_is_global_across_clients() {
        let pool = test_pool().await;
        let first = insert_client(&pool, "a@example.com").await;
        let second = insert_client(&pool, "b@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 12:00:00");

        create_appointment(&pool, &locks, now, request(first, "2026-03-02 10:00:00"))
            .await
            .unwrap();
        let err = create_appointment(&pool, &locks, now, request(second, "2026-03-02 10:45:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_back_to_back_booking_is_legal() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 12:00:00");

        create_appointment(&pool, &locks, now, request(client, "2026-03-02 10:00:00"))
            .await
            .unwrap();
        // Starts exactly where the previous one ends.
        create_appointment(&pool, &locks, now, request(client, "2026-03-02 11:00:00"))
            .await
            .unwrap();
        assert_eq!(appointment_count(&pool).await, 2);
    }

    #[tokio::test]
    async fn test_cancelled_appointment_does_not_block() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 12:00:00");

        let appt =
            create_appointment(&pool, &locks, now, request(client, "2026-03-02 10:00:00"))
                .await
                .unwrap();
        cancel_appointment(&pool, &locks, now, appt.id, client)
            .await
            .unwrap();

        create_appointment(&pool, &locks, now, request(client, "2026-03-02 10:00:00"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_subscription_rejected_without_side_effects() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let sub = insert_subscription(&pool, client, 0).await;
        let locks = CalendarLocks::new();

        let mut req = request(client, "2026-03-02 10:00:00");
        req.subscription_id = Some(sub);
        let err = create_appointment(&pool, &locks, dt("2026-03-01 12:00:00"), req)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidSubscription));
        assert_eq!(appointment_count(&pool).await, 0);
        assert_eq!(sessions_remaining(&pool, sub).await, 0);
    }

    #[tokio::test]
    async fn test_foreign_subscription_rejected() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let other = insert_client(&pool, "b@example.com").await;
        let other_sub = insert_subscription(&pool, other, 4).await;
        let locks = CalendarLocks::new();

        let mut req = request(client, "2026-03-02 10:00:00");
        req.subscription_id = Some(other_sub);
        let err = create_appointment(&pool, &locks, dt("2026-03-01 12:00:00"), req)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidSubscription));
        assert_eq!(sessions_remaining(&pool, other_sub).await, 4);
    }

    #[tokio::test]
    async fn test_booking_consumes_one_session() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let sub = insert_subscription(&pool, client, 4).await;
        let locks = CalendarLocks::new();

        let mut req = request(client, "2026-03-02 10:00:00");
        req.subscription_id = Some(sub);
        let appt = create_appointment(&pool, &locks, dt("2026-03-01 12:00:00"), req)
            .await
            .unwrap();

        assert_eq!(appt.subscription_id, Some(sub));
        assert_eq!(sessions_remaining(&pool, sub).await, 3);
    }

    #[tokio::test]
    async fn test_early_cancellation_refunds_exactly_one_session() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let sub = insert_subscription(&pool, client, 4).await;
        let untouched = insert_subscription(&pool, client, 2).await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 09:00:00");

        let mut req = request(client, "2026-03-05 10:00:00");
        req.subscription_id = Some(sub);
        let appt = create_appointment(&pool, &locks, now, req).await.unwrap();
        assert_eq!(sessions_remaining(&pool, sub).await, 3);

        let result = cancel_appointment(&pool, &locks, now, appt.id, client)
            .await
            .unwrap();
        assert!(result.refunded);
        assert_eq!(result.appointment.status, "cancelled");
        assert_eq!(sessions_remaining(&pool, sub).await, 4);
        assert_eq!(sessions_remaining(&pool, untouched).await, 2);
    }

    #[tokio::test]
    async fn test_late_cancellation_forfeits_session() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let sub = insert_subscription(&pool, client, 4).await;
        let locks = CalendarLocks::new();

        let mut req = request(client, "2026-03-02 10:00:00");
        req.subscription_id = Some(sub);
        let appt = create_appointment(&pool, &locks, dt("2026-03-01 09:00:00"), req)
            .await
            .unwrap();

        // Less than 24h before the start.
        let result = cancel_appointment(&pool, &locks, dt("2026-03-02 08:00:00"), appt.id, client)
            .await
            .unwrap();
        assert!(!result.refunded);
        assert_eq!(result.appointment.status, "cancelled");
        assert_eq!(sessions_remaining(&pool, sub).await, 3);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_guarded() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 09:00:00");

        let appt = create_appointment(&pool, &locks, now, request(client, "2026-03-05 10:00:00"))
            .await
            .unwrap();
        cancel_appointment(&pool, &locks, now, appt.id, client)
            .await
            .unwrap();
        let err = cancel_appointment(&pool, &locks, now, appt.id, client)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AlreadyCancelled));
    }

    #[tokio::test]
    async fn test_cancel_past_appointment_rejected() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();

        let appt = create_appointment(
            &pool,
            &locks,
            dt("2026-03-01 09:00:00"),
            request(client, "2026-03-02 10:00:00"),
        )
        .await
        .unwrap();

        let err = cancel_appointment(&pool, &locks, dt("2026-03-02 10:00:00"), appt.id, client)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AlreadyOccurred));
    }

    #[tokio::test]
    async fn test_cancel_foreign_appointment_not_found() {
        let pool = test_pool().await;
        let owner = insert_client(&pool, "a@example.com").await;
        let stranger = insert_client(&pool, "b@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 09:00:00");

        let appt = create_appointment(&pool, &locks, now, request(owner, "2026-03-05 10:00:00"))
            .await
            .unwrap();
        let err = cancel_appointment(&pool, &locks, now, appt.id, stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_double_book_settles_to_one() {
        let pool = test_pool().await;
        let first = insert_client(&pool, "a@example.com").await;
        let second = insert_client(&pool, "b@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 12:00:00");

        let (a, b) = tokio::join!(
            create_appointment(&pool, &locks, now, request(first, "2026-03-02 10:00:00")),
            create_appointment(&pool, &locks, now, request(second, "2026-03-02 10:00:00")),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let confirmed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments WHERE status = 'confirmed'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(confirmed, 1);
    }

    #[tokio::test]
    async fn test_no_overlap_invariant_after_mixed_bookings() {
        let pool = test_pool().await;
        let client = insert_client(&pool, "a@example.com").await;
        let locks = CalendarLocks::new();
        let now = dt("2026-03-01 12:00:00");

        for start in [
            "2026-03-02 09:00:00",
            "2026-03-02 10:00:00",
            "2026-03-02 09:30:00",
            "2026-03-02 11:00:00",
            "2026-03-02 10:15:00",
        ] {
            let _ = create_appointment(&pool, &locks, now, request(client, start)).await;
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT start_time, end_time FROM appointments WHERE status != 'cancelled'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for (i, a) in rows.iter().enumerate() {
            for b in rows.iter().skip(i + 1) {
                let (a_start, a_end) = (dt(&a.0), dt(&a.1));
                let (b_start, b_end) = (dt(&b.0), dt(&b.1));
                assert!(
                    !crate::availability::intervals_overlap(a_start, a_end, b_start, b_end),
                    "stored appointments overlap: {a:?} vs {b:?}"
                );
            }
        }
    }
}
