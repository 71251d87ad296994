use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Datelike, Duration};
use std::sync::Arc;

use crate::auth::{self, AuthUser};
use crate::availability::{
    compute_available_slots, DateException, WeeklyRule, DEFAULT_SLOT_INTERVAL_MIN,
};
use crate::booking::{self, CreateAppointment};
use crate::error::ApiError;
use crate::models::*;
use crate::time::{
    fmt_datetime, fmt_time_hm, parse_date, parse_datetime, parse_time_of_day, studio_now,
};
use crate::AppState;

/// Duration assumed when the availability query names no service.
const DEFAULT_SERVICE_DURATION_MIN: i64 = 60;

pub(super) const SERVICE_SELECT: &str = "SELECT id, name, description, duration_min, price, category, \
     is_active FROM services";

pub(super) const APPOINTMENT_DETAIL_SELECT: &str = "SELECT a.id, a.client_id, a.service_id, a.subscription_id, a.start_time, a.end_time, \
            a.status, a.notes, a.created_at, s.name AS service_name, s.duration_min \
     FROM appointments a JOIN services s ON s.id = a.service_id";

pub(super) const SUBSCRIPTION_DETAIL_SELECT: &str = "SELECT cs.id, cs.client_id, cs.plan_id, cs.start_date, cs.end_date, \
            cs.sessions_remaining, cs.status, cs.payment_status, \
            sp.name AS plan_name, sp.description AS plan_description \
     FROM client_subscriptions cs JOIN subscription_plans sp ON sp.id = cs.plan_id";

fn current_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    auth::authenticate(headers, &state.secret, studio_now())
}

async fn active_subscription(
    state: &AppState,
    client_id: i64,
) -> Result<Option<SubscriptionDetail>, ApiError> {
    let sub = sqlx::query_as::<_, SubscriptionDetail>(&format!(
        "{SUBSCRIPTION_DETAIL_SELECT}
         WHERE cs.client_id = ? AND cs.status = 'active'
         ORDER BY cs.end_date DESC LIMIT 1"
    ))
    .bind(client_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(sub)
}

// ── Profile ──

/// GET /api/client/profile — account, profile and active subscription.
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let user = current_user(&state, &headers)?;

    let account = sqlx::query_as::<_, UserPublic>(
        "SELECT id, email, full_name, phone, role FROM users WHERE id = ?",
    )
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("User not found"))?;

    let profile = sqlx::query_as::<_, ClientProfile>(
        "SELECT user_id, birth_date, address, city, state, postal_code,
                emergency_contact, health_notes
         FROM client_profiles WHERE user_id = ?",
    )
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?;

    let subscription = active_subscription(&state, user.id).await?;

    Ok(Json(ApiResponse::success(ProfileResponse {
        user: account,
        profile,
        subscription,
    })))
}

/// PUT /api/client/profile — patch account and profile fields.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let user = current_user(&state, &headers)?;

    if let Some(full_name) = &body.full_name {
        if full_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("Full name cannot be empty".into()));
        }
        sqlx::query("UPDATE users SET full_name = ? WHERE id = ?")
            .bind(full_name.trim())
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(phone) = &body.phone {
        sqlx::query("UPDATE users SET phone = ? WHERE id = ?")
            .bind(phone)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }

    sqlx::query("INSERT OR IGNORE INTO client_profiles (user_id) VALUES (?)")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    if let Some(birth_date) = &body.birth_date {
        if parse_date(birth_date).is_none() {
            return Err(ApiError::InvalidInput(
                "Invalid birth_date; expected YYYY-MM-DD".into(),
            ));
        }
        sqlx::query("UPDATE client_profiles SET birth_date = ? WHERE user_id = ?")
            .bind(birth_date)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(address) = &body.address {
        sqlx::query("UPDATE client_profiles SET address = ? WHERE user_id = ?")
            .bind(address)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(city) = &body.city {
        sqlx::query("UPDATE client_profiles SET city = ? WHERE user_id = ?")
            .bind(city)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(region) = &body.state {
        sqlx::query("UPDATE client_profiles SET state = ? WHERE user_id = ?")
            .bind(region)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(postal_code) = &body.postal_code {
        sqlx::query("UPDATE client_profiles SET postal_code = ? WHERE user_id = ?")
            .bind(postal_code)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(emergency_contact) = &body.emergency_contact {
        sqlx::query("UPDATE client_profiles SET emergency_contact = ? WHERE user_id = ?")
            .bind(emergency_contact)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }
    if let Some(health_notes) = &body.health_notes {
        sqlx::query("UPDATE client_profiles SET health_notes = ? WHERE user_id = ?")
            .bind(health_notes)
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }

    Ok(Json(ApiResponse::success("Profile updated")))
}

// ── Catalog ──

/// GET /api/services — active services.
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Service>>>, ApiError> {
    let services = sqlx::query_as::<_, Service>(&format!(
        "{SERVICE_SELECT} WHERE is_active = 1 ORDER BY name ASC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(services)))
}

/// GET /api/plans — active subscription plans.
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<SubscriptionPlan>>>, ApiError> {
    let plans = sqlx::query_as::<_, SubscriptionPlan>(
        "SELECT id, name, description, price, duration_days, sessions_included, is_active
         FROM subscription_plans WHERE is_active = 1 ORDER BY price ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(plans)))
}

// ── Availability ──

/// GET /api/availability?date=YYYY-MM-DD&service_id=N — bookable slots.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, ApiError> {
    let date = parse_date(&query.date)
        .ok_or_else(|| ApiError::InvalidInput("Invalid date; expected YYYY-MM-DD".into()))?;

    let service_duration = match query.service_id {
        Some(service_id) => {
            let service = sqlx::query_as::<_, Service>(&format!(
                "{SERVICE_SELECT} WHERE id = ? AND is_active = 1"
            ))
            .bind(service_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(ApiError::NotFound("Service not found"))?;
            service.duration_min
        }
        None => DEFAULT_SERVICE_DURATION_MIN,
    };

    let weekday = date.weekday().num_days_from_sunday();
    let weekly_rows = sqlx::query_as::<_, WeeklyAvailability>(
        "SELECT id, day_of_week, start_time, end_time, is_available
         FROM weekly_availability WHERE day_of_week = ?",
    )
    .bind(weekday as i64)
    .fetch_all(&state.db)
    .await?;

    let weekly: Vec<WeeklyRule> = weekly_rows
        .iter()
        .filter_map(|row| {
            let start = parse_time_of_day(&row.start_time);
            let end = parse_time_of_day(&row.end_time);
            match (start, end) {
                (Some(start), Some(end)) => Some(WeeklyRule {
                    day_of_week: row.day_of_week as u32,
                    start,
                    end,
                    available: row.is_available,
                }),
                _ => {
                    tracing::warn!("weekly_availability row {} has unparseable times", row.id);
                    None
                }
            }
        })
        .collect();

    let exception_row = sqlx::query_as::<_, AvailabilityException>(
        "SELECT id, date, start_time, end_time, is_available, reason
         FROM availability_exceptions WHERE date = ? LIMIT 1",
    )
    .bind(&query.date)
    .fetch_optional(&state.db)
    .await?;

    let exception = exception_row.as_ref().map(|row| DateException {
        start: row.start_time.as_deref().and_then(parse_time_of_day),
        end: row.end_time.as_deref().and_then(parse_time_of_day),
        available: row.is_available,
    });

    let day_start = fmt_datetime(date.and_hms_opt(0, 0, 0).unwrap());
    let day_end = fmt_datetime((date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap());
    let booked_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT start_time, end_time FROM appointments
         WHERE status != 'cancelled' AND start_time < ? AND end_time > ?",
    )
    .bind(&day_end)
    .bind(&day_start)
    .fetch_all(&state.db)
    .await?;

    let booked: Vec<_> = booked_rows
        .iter()
        .filter_map(|(start, end)| Some((parse_datetime(start)?, parse_datetime(end)?)))
        .collect();

    let slots = compute_available_slots(
        date,
        service_duration,
        &weekly,
        exception.as_ref(),
        &booked,
        DEFAULT_SLOT_INTERVAL_MIN,
    )?;

    let available_slots: Vec<SlotView> = slots
        .iter()
        .map(|slot| SlotView {
            start_time: fmt_datetime(slot.start),
            end_time: fmt_datetime(slot.end),
            formatted_time: fmt_time_hm(slot.start),
        })
        .collect();

    Ok(Json(ApiResponse::success(AvailabilityResponse {
        available: !available_slots.is_empty(),
        available_slots,
        service_duration,
    })))
}

// ── Appointments ──

/// POST /api/appointments — book a slot.
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Appointment>>), ApiError> {
    let user = current_user(&state, &headers)?;

    let start_time = parse_datetime(&body.start_time).ok_or_else(|| {
        ApiError::InvalidInput("Invalid start_time; expected YYYY-MM-DD HH:MM:SS".into())
    })?;

    let appointment = booking::create_appointment(
        &state.db,
        &state.locks,
        studio_now(),
        CreateAppointment {
            client_id: user.id,
            service_id: body.service_id,
            start_time,
            subscription_id: body.subscription_id,
            notes: body.notes,
        },
    )
    .await?;

    notify_appointment_email(&state, &appointment, AppointmentEvent::Confirmed).await;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(appointment))))
}

/// GET /api/appointments?status=&past= — the caller's appointments.
pub async fn my_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<AppointmentDetail>>>, ApiError> {
    let user = current_user(&state, &headers)?;
    let now = fmt_datetime(studio_now());

    // Optional status filter folds into one statement; the past/upcoming
    // split changes the ordering, so it stays an explicit branch.
    let appointments = match query.past {
        Some(true) => {
            sqlx::query_as::<_, AppointmentDetail>(&format!(
                "{APPOINTMENT_DETAIL_SELECT}
                 WHERE a.client_id = ? AND a.status = COALESCE(?, a.status)
                   AND a.end_time < ?
                 ORDER BY a.start_time DESC"
            ))
            .bind(user.id)
            .bind(&query.status)
            .bind(&now)
            .fetch_all(&state.db)
            .await?
        }
        Some(false) => {
            sqlx::query_as::<_, AppointmentDetail>(&format!(
                "{APPOINTMENT_DETAIL_SELECT}
                 WHERE a.client_id = ? AND a.status = COALESCE(?, a.status)
                   AND a.end_time >= ?
                 ORDER BY a.start_time ASC"
            ))
            .bind(user.id)
            .bind(&query.status)
            .bind(&now)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, AppointmentDetail>(&format!(
                "{APPOINTMENT_DETAIL_SELECT}
                 WHERE a.client_id = ? AND a.status = COALESCE(?, a.status)
                 ORDER BY a.start_time ASC"
            ))
            .bind(user.id)
            .bind(&query.status)
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(Json(ApiResponse::success(appointments)))
}

/// GET /api/appointments/:id — one appointment, owner only.
pub async fn appointment_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, ApiError> {
    let user = current_user(&state, &headers)?;

    let appointment = sqlx::query_as::<_, AppointmentDetail>(&format!(
        "{APPOINTMENT_DETAIL_SELECT} WHERE a.id = ? AND a.client_id = ?"
    ))
    .bind(id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Appointment not found"))?;

    Ok(Json(ApiResponse::success(appointment)))
}

/// PUT /api/appointments/:id/cancel — cancel with the 24h refund policy.
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CancelAppointmentResponse>>, ApiError> {
    let user = current_user(&state, &headers)?;

    let result =
        booking::cancel_appointment(&state.db, &state.locks, studio_now(), id, user.id).await?;

    notify_appointment_email(&state, &result.appointment, AppointmentEvent::Cancelled).await;

    Ok(Json(ApiResponse::success(CancelAppointmentResponse {
        message: "Appointment cancelled".into(),
        refund: result.refunded,
    })))
}

/// GET /api/client/subscription — the caller's active subscription.
pub async fn my_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, ApiError> {
    let user = current_user(&state, &headers)?;
    let subscription = active_subscription(&state, user.id).await?;

    Ok(Json(ApiResponse::success(SubscriptionResponse {
        has_subscription: subscription.is_some(),
        subscription,
    })))
}

// ── Notification plumbing ──

enum AppointmentEvent {
    Confirmed,
    Cancelled,
}

/// Look up the client and service for an appointment and fire the matching
/// email. Lookup failures are logged, never surfaced to the booking caller.
async fn notify_appointment_email(
    state: &AppState,
    appointment: &Appointment,
    event: AppointmentEvent,
) {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash, full_name, phone, role, created_at, last_login
         FROM users WHERE id = ?",
    )
    .bind(appointment.client_id)
    .fetch_optional(&state.db)
    .await;

    let service = sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE id = ?"))
        .bind(appointment.service_id)
        .fetch_optional(&state.db)
        .await;

    match (user, service) {
        (Ok(Some(user)), Ok(Some(service))) => match event {
            AppointmentEvent::Confirmed => {
                state.mailer.notify_confirmation(appointment, &user, &service)
            }
            AppointmentEvent::Cancelled => {
                state.mailer.notify_cancellation(appointment, &user, &service)
            }
        },
        _ => tracing::error!(
            "could not load client/service for appointment {} notification",
            appointment.id
        ),
    }
}
