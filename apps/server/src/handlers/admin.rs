use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Duration;
use std::sync::Arc;

use crate::auth::{self, AuthUser};
use crate::error::ApiError;
use crate::models::*;
use crate::time::{fmt_datetime, parse_date, parse_time_of_day, studio_now};
use crate::AppState;

use super::client::{APPOINTMENT_DETAIL_SELECT, SERVICE_SELECT, SUBSCRIPTION_DETAIL_SELECT};
use super::reviews::REVIEW_DETAIL_SELECT;

const APPOINTMENT_STATUSES: &[&str] = &["pending", "confirmed", "completed", "cancelled"];
const SUBSCRIPTION_STATUSES: &[&str] = &["active", "expired", "cancelled"];

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    auth::authenticate_admin(headers, &state.secret, studio_now())
}

// ── Dashboard ──

/// GET /api/admin/dashboard — headline counters.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<DashboardStats>>, ApiError> {
    require_admin(&state, &headers)?;
    let now = fmt_datetime(studio_now());

    let clients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'client'")
        .fetch_one(&state.db)
        .await?;
    let upcoming_appointments: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM appointments WHERE status = 'confirmed' AND start_time >= ?",
    )
    .bind(&now)
    .fetch_one(&state.db)
    .await?;
    let active_subscriptions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM client_subscriptions WHERE status = 'active'")
            .fetch_one(&state.db)
            .await?;
    let pending_reviews: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE is_approved = 0")
            .fetch_one(&state.db)
            .await?;

    Ok(Json(ApiResponse::success(DashboardStats {
        clients,
        upcoming_appointments,
        active_subscriptions,
        pending_reviews,
    })))
}

// ── Clients ──

/// GET /api/admin/clients — every client account.
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<UserPublic>>>, ApiError> {
    require_admin(&state, &headers)?;

    let clients = sqlx::query_as::<_, UserPublic>(
        "SELECT id, email, full_name, phone, role FROM users
         WHERE role = 'client' ORDER BY full_name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(clients)))
}

/// GET /api/admin/clients/:id — one client with profile and subscription.
pub async fn client_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    require_admin(&state, &headers)?;

    let user = sqlx::query_as::<_, UserPublic>(
        "SELECT id, email, full_name, phone, role FROM users WHERE id = ? AND role = 'client'",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Client not found"))?;

    let profile = sqlx::query_as::<_, ClientProfile>(
        "SELECT user_id, birth_date, address, city, state, postal_code,
                emergency_contact, health_notes
         FROM client_profiles WHERE user_id = ?",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    let subscription = sqlx::query_as::<_, SubscriptionDetail>(&format!(
        "{SUBSCRIPTION_DETAIL_SELECT}
         WHERE cs.client_id = ? AND cs.status = 'active'
         ORDER BY cs.end_date DESC LIMIT 1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(ProfileResponse {
        user,
        profile,
        subscription,
    })))
}

// ── Services ──

/// GET /api/admin/services — all services, inactive included.
pub async fn list_all_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Service>>>, ApiError> {
    require_admin(&state, &headers)?;

    let services = sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} ORDER BY name ASC"))
        .fetch_all(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(services)))
}

/// POST /api/admin/services — add a service to the catalog.
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Service>>), ApiError> {
    require_admin(&state, &headers)?;

    if body.name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Service name is required".into()));
    }
    if body.duration_min <= 0 {
        return Err(ApiError::InvalidInput(
            "Service duration must be positive".into(),
        ));
    }
    if body.price < 0 {
        return Err(ApiError::InvalidInput("Price cannot be negative".into()));
    }

    let id = sqlx::query(
        "INSERT INTO services (name, description, duration_min, price, category)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(body.name.trim())
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.duration_min)
    .bind(body.price)
    .bind(&body.category)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let service = sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(service))))
}

/// PUT /api/admin/services/:id — patch service fields.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, ApiError> {
    require_admin(&state, &headers)?;

    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM services WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("Service not found"));
    }

    if let Some(name) = &body.name {
        sqlx::query("UPDATE services SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(description) = &body.description {
        sqlx::query("UPDATE services SET description = ? WHERE id = ?")
            .bind(description)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(duration_min) = body.duration_min {
        if duration_min <= 0 {
            return Err(ApiError::InvalidInput(
                "Service duration must be positive".into(),
            ));
        }
        sqlx::query("UPDATE services SET duration_min = ? WHERE id = ?")
            .bind(duration_min)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(price) = body.price {
        sqlx::query("UPDATE services SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(category) = &body.category {
        sqlx::query("UPDATE services SET category = ? WHERE id = ?")
            .bind(category)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(is_active) = body.is_active {
        sqlx::query("UPDATE services SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    let service = sqlx::query_as::<_, Service>(&format!("{SERVICE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(service)))
}

/// DELETE /api/admin/services/:id — delete when unreferenced, otherwise
/// deactivate so appointment history keeps its join target.
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    require_admin(&state, &headers)?;

    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM services WHERE id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("Service not found"));
    }

    let referenced: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM appointments WHERE service_id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    if referenced {
        sqlx::query("UPDATE services SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&state.db)
            .await?;
        Ok(Json(ApiResponse::success(
            "Service has appointment history and was deactivated instead",
        )))
    } else {
        sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&state.db)
            .await?;
        Ok(Json(ApiResponse::success("Service deleted")))
    }
}

// ── Plans ──

/// GET /api/admin/plans — all plans, inactive included.
pub async fn list_all_plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<SubscriptionPlan>>>, ApiError> {
    require_admin(&state, &headers)?;

    let plans = sqlx::query_as::<_, SubscriptionPlan>(
        "SELECT id, name, description, price, duration_days, sessions_included, is_active
         FROM subscription_plans ORDER BY price ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(plans)))
}

/// POST /api/admin/plans — create a subscription plan.
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubscriptionPlan>>), ApiError> {
    require_admin(&state, &headers)?;

    if body.name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Plan name is required".into()));
    }
    if body.duration_days <= 0 || body.sessions_included <= 0 {
        return Err(ApiError::InvalidInput(
            "Plan duration and session count must be positive".into(),
        ));
    }

    let id = sqlx::query(
        "INSERT INTO subscription_plans (name, description, price, duration_days, sessions_included)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(body.name.trim())
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.price)
    .bind(body.duration_days)
    .bind(body.sessions_included)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let plan = sqlx::query_as::<_, SubscriptionPlan>(
        "SELECT id, name, description, price, duration_days, sessions_included, is_active
         FROM subscription_plans WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(plan))))
}

/// PUT /api/admin/plans/:id — patch plan fields.
pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePlanRequest>,
) -> Result<Json<ApiResponse<SubscriptionPlan>>, ApiError> {
    require_admin(&state, &headers)?;

    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM subscription_plans WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if !exists {
        return Err(ApiError::NotFound("Plan not found"));
    }

    if let Some(name) = &body.name {
        sqlx::query("UPDATE subscription_plans SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(description) = &body.description {
        sqlx::query("UPDATE subscription_plans SET description = ? WHERE id = ?")
            .bind(description)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(price) = body.price {
        sqlx::query("UPDATE subscription_plans SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(duration_days) = body.duration_days {
        sqlx::query("UPDATE subscription_plans SET duration_days = ? WHERE id = ?")
            .bind(duration_days)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(sessions_included) = body.sessions_included {
        sqlx::query("UPDATE subscription_plans SET sessions_included = ? WHERE id = ?")
            .bind(sessions_included)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(is_active) = body.is_active {
        sqlx::query("UPDATE subscription_plans SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    let plan = sqlx::query_as::<_, SubscriptionPlan>(
        "SELECT id, name, description, price, duration_days, sessions_included, is_active
         FROM subscription_plans WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(plan)))
}

/// DELETE /api/admin/plans/:id — delete when no subscription references the
/// plan, otherwise deactivate.
pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    require_admin(&state, &headers)?;

    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM subscription_plans WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if !exists {
        return Err(ApiError::NotFound("Plan not found"));
    }

    let referenced: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM client_subscriptions WHERE plan_id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    if referenced {
        sqlx::query("UPDATE subscription_plans SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&state.db)
            .await?;
        Ok(Json(ApiResponse::success(
            "Plan has subscriptions and was deactivated instead",
        )))
    } else {
        sqlx::query("DELETE FROM subscription_plans WHERE id = ?")
            .bind(id)
            .execute(&state.db)
            .await?;
        Ok(Json(ApiResponse::success("Plan deleted")))
    }
}

// ── Subscriptions ──

/// GET /api/admin/subscriptions — every subscription with its plan.
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<SubscriptionDetail>>>, ApiError> {
    require_admin(&state, &headers)?;

    let subscriptions = sqlx::query_as::<_, SubscriptionDetail>(&format!(
        "{SUBSCRIPTION_DETAIL_SELECT} ORDER BY cs.end_date DESC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(subscriptions)))
}

/// POST /api/admin/subscriptions — start a client on a plan. Dates and the
/// session balance come from the plan.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubscriptionDetail>>), ApiError> {
    require_admin(&state, &headers)?;

    let client_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ? AND role = 'client'",
    )
    .bind(body.client_id)
    .fetch_one(&state.db)
    .await?;
    if !client_exists {
        return Err(ApiError::NotFound("Client not found"));
    }

    let plan = sqlx::query_as::<_, SubscriptionPlan>(
        "SELECT id, name, description, price, duration_days, sessions_included, is_active
         FROM subscription_plans WHERE id = ? AND is_active = 1",
    )
    .bind(body.plan_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Plan not found"))?;

    let start = studio_now();
    let end = start + Duration::days(plan.duration_days);

    let id = sqlx::query(
        "INSERT INTO client_subscriptions
         (client_id, plan_id, start_date, end_date, sessions_remaining, status, payment_status)
         VALUES (?, ?, ?, ?, ?, 'active', ?)",
    )
    .bind(body.client_id)
    .bind(plan.id)
    .bind(fmt_datetime(start))
    .bind(fmt_datetime(end))
    .bind(plan.sessions_included)
    .bind(body.payment_status.as_deref().unwrap_or("pending"))
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let subscription = sqlx::query_as::<_, SubscriptionDetail>(&format!(
        "{SUBSCRIPTION_DETAIL_SELECT} WHERE cs.id = ?"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(subscription))))
}

/// PUT /api/admin/subscriptions/:id — patch status, payment status or the
/// session balance.
pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSubscriptionRequest>,
) -> Result<Json<ApiResponse<SubscriptionDetail>>, ApiError> {
    require_admin(&state, &headers)?;

    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM client_subscriptions WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db)
            .await?;
    if !exists {
        return Err(ApiError::NotFound("Subscription not found"));
    }

    if let Some(sessions_remaining) = body.sessions_remaining {
        if sessions_remaining < 0 {
            return Err(ApiError::InvalidInput(
                "Session balance cannot be negative".into(),
            ));
        }
        sqlx::query("UPDATE client_subscriptions SET sessions_remaining = ? WHERE id = ?")
            .bind(sessions_remaining)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(status) = &body.status {
        if !SUBSCRIPTION_STATUSES.contains(&status.as_str()) {
            return Err(ApiError::InvalidInput(format!(
                "Unknown subscription status {status:?}"
            )));
        }
        sqlx::query("UPDATE client_subscriptions SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(payment_status) = &body.payment_status {
        sqlx::query("UPDATE client_subscriptions SET payment_status = ? WHERE id = ?")
            .bind(payment_status)
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    let subscription = sqlx::query_as::<_, SubscriptionDetail>(&format!(
        "{SUBSCRIPTION_DETAIL_SELECT} WHERE cs.id = ?"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(subscription)))
}

// ── Appointments ──

/// GET /api/admin/appointments — by date, by range, or upcoming.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AdminAppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<AppointmentDetail>>>, ApiError> {
    require_admin(&state, &headers)?;

    let appointments = if let Some(date) = &query.date {
        let date = parse_date(date)
            .ok_or_else(|| ApiError::InvalidInput("Invalid date; expected YYYY-MM-DD".into()))?;
        let from = fmt_datetime(date.and_hms_opt(0, 0, 0).unwrap());
        let to = fmt_datetime((date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap());
        sqlx::query_as::<_, AppointmentDetail>(&format!(
            "{APPOINTMENT_DETAIL_SELECT}
             WHERE a.start_time >= ? AND a.start_time < ?
             ORDER BY a.start_time ASC"
        ))
        .bind(&from)
        .bind(&to)
        .fetch_all(&state.db)
        .await?
    } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
        let from = parse_date(from)
            .ok_or_else(|| ApiError::InvalidInput("Invalid from date".into()))?;
        let to =
            parse_date(to).ok_or_else(|| ApiError::InvalidInput("Invalid to date".into()))?;
        let from = fmt_datetime(from.and_hms_opt(0, 0, 0).unwrap());
        let to = fmt_datetime((to + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap());
        sqlx::query_as::<_, AppointmentDetail>(&format!(
            "{APPOINTMENT_DETAIL_SELECT}
             WHERE a.start_time >= ? AND a.start_time < ?
             ORDER BY a.start_time ASC"
        ))
        .bind(&from)
        .bind(&to)
        .fetch_all(&state.db)
        .await?
    } else {
        let now = fmt_datetime(studio_now());
        sqlx::query_as::<_, AppointmentDetail>(&format!(
            "{APPOINTMENT_DETAIL_SELECT}
             WHERE a.start_time >= ? AND a.status != 'cancelled'
             ORDER BY a.start_time ASC"
        ))
        .bind(&now)
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(ApiResponse::success(appointments)))
}

/// PUT /api/admin/appointments/:id/status — direct status write. This is how
/// appointments become `completed`, which unlocks reviews; it does not touch
/// subscription balances.
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<ApiResponse<Appointment>>, ApiError> {
    require_admin(&state, &headers)?;

    if !APPOINTMENT_STATUSES.contains(&body.status.as_str()) {
        return Err(ApiError::InvalidInput(format!(
            "Unknown appointment status {:?}",
            body.status
        )));
    }

    let appointment = sqlx::query_as::<_, Appointment>(
        "SELECT id, client_id, service_id, subscription_id, start_time, end_time, status,
                notes, created_at
         FROM appointments WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Appointment not found"))?;

    // Cancelled is terminal; everything else is the admin's call.
    if appointment.status == "cancelled" {
        return Err(ApiError::AlreadyCancelled);
    }

    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(&body.status)
        .bind(id)
        .execute(&state.db)
        .await?;

    let appointment = sqlx::query_as::<_, Appointment>(
        "SELECT id, client_id, service_id, subscription_id, start_time, end_time, status,
                notes, created_at
         FROM appointments WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(appointment)))
}

// ── Availability ──

/// GET /api/admin/availability — the weekly schedule.
pub async fn get_weekly_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<WeeklyAvailability>>>, ApiError> {
    require_admin(&state, &headers)?;

    let rows = sqlx::query_as::<_, WeeklyAvailability>(
        "SELECT id, day_of_week, start_time, end_time, is_available
         FROM weekly_availability ORDER BY day_of_week ASC, start_time ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// POST /api/admin/availability — replace a weekday's window.
pub async fn set_weekly_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SetWeeklyAvailabilityRequest>,
) -> Result<Json<ApiResponse<WeeklyAvailability>>, ApiError> {
    require_admin(&state, &headers)?;

    if !(0..=6).contains(&body.day_of_week) {
        return Err(ApiError::InvalidInput(
            "day_of_week must be 0 (Sunday) through 6 (Saturday)".into(),
        ));
    }
    let start = parse_time_of_day(&body.start_time)
        .ok_or_else(|| ApiError::InvalidInput("Invalid start_time; expected HH:MM".into()))?;
    let end = parse_time_of_day(&body.end_time)
        .ok_or_else(|| ApiError::InvalidInput("Invalid end_time; expected HH:MM".into()))?;
    if start >= end {
        return Err(ApiError::InvalidInput(
            "start_time must be before end_time".into(),
        ));
    }

    sqlx::query("DELETE FROM weekly_availability WHERE day_of_week = ?")
        .bind(body.day_of_week)
        .execute(&state.db)
        .await?;

    let id = sqlx::query(
        "INSERT INTO weekly_availability (day_of_week, start_time, end_time, is_available)
         VALUES (?, ?, ?, ?)",
    )
    .bind(body.day_of_week)
    .bind(&body.start_time)
    .bind(&body.end_time)
    .bind(body.is_available.unwrap_or(true))
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let row = sqlx::query_as::<_, WeeklyAvailability>(
        "SELECT id, day_of_week, start_time, end_time, is_available
         FROM weekly_availability WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(row)))
}

/// GET /api/admin/availability/exceptions — upcoming date overrides.
pub async fn list_exceptions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<AvailabilityException>>>, ApiError> {
    require_admin(&state, &headers)?;

    let rows = sqlx::query_as::<_, AvailabilityException>(
        "SELECT id, date, start_time, end_time, is_available, reason
         FROM availability_exceptions ORDER BY date ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// POST /api/admin/availability/exceptions — add or replace a date override.
pub async fn add_exception(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AddExceptionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AvailabilityException>>), ApiError> {
    require_admin(&state, &headers)?;

    if parse_date(&body.date).is_none() {
        return Err(ApiError::InvalidInput(
            "Invalid date; expected YYYY-MM-DD".into(),
        ));
    }
    for (label, value) in [("start_time", &body.start_time), ("end_time", &body.end_time)] {
        if let Some(value) = value {
            if parse_time_of_day(value).is_none() {
                return Err(ApiError::InvalidInput(format!(
                    "Invalid {label}; expected HH:MM"
                )));
            }
        }
    }

    // One override per date: the slot computation reads a single exception.
    sqlx::query("DELETE FROM availability_exceptions WHERE date = ?")
        .bind(&body.date)
        .execute(&state.db)
        .await?;

    let id = sqlx::query(
        "INSERT INTO availability_exceptions (date, start_time, end_time, is_available, reason)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&body.date)
    .bind(&body.start_time)
    .bind(&body.end_time)
    .bind(body.is_available)
    .bind(&body.reason)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let row = sqlx::query_as::<_, AvailabilityException>(
        "SELECT id, date, start_time, end_time, is_available, reason
         FROM availability_exceptions WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(row))))
}

/// DELETE /api/admin/availability/exceptions/:id — drop a date override.
pub async fn delete_exception(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    require_admin(&state, &headers)?;

    let deleted = sqlx::query("DELETE FROM availability_exceptions WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Exception not found"));
    }
    Ok(Json(ApiResponse::success("Exception removed")))
}

// ── Review moderation ──

/// GET /api/admin/reviews — full moderation queue, newest first.
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<ReviewDetail>>>, ApiError> {
    require_admin(&state, &headers)?;

    let reviews = sqlx::query_as::<_, ReviewDetail>(&format!(
        "{REVIEW_DETAIL_SELECT} ORDER BY r.created_at DESC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(reviews)))
}

/// PUT /api/admin/reviews/:id/approve — publish a review.
pub async fn approve_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    require_admin(&state, &headers)?;

    let updated = sqlx::query("UPDATE reviews SET is_approved = 1, is_public = 1 WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(ApiError::NotFound("Review not found"));
    }
    Ok(Json(ApiResponse::success("Review approved")))
}

/// PUT /api/admin/reviews/:id/reject — take a review off the public wall.
pub async fn reject_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    require_admin(&state, &headers)?;

    let updated = sqlx::query("UPDATE reviews SET is_approved = 0, is_public = 0 WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(ApiError::NotFound("Review not found"));
    }
    Ok(Json(ApiResponse::success("Review rejected")))
}

/// DELETE /api/admin/reviews/:id — remove a review entirely.
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    require_admin(&state, &headers)?;

    let deleted = sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Review not found"));
    }
    Ok(Json(ApiResponse::success("Review deleted")))
}
