use serde::{Deserialize, Serialize};

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

/// User fields safe to return to clients.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserPublic {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientProfile {
    pub user_id: i64,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub emergency_contact: Option<String>,
    pub health_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub duration_min: i64,
    pub price: i64,
    pub category: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub duration_days: i64,
    pub sessions_included: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientSubscription {
    pub id: i64,
    pub client_id: i64,
    pub plan_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub sessions_remaining: i64,
    pub status: String,
    pub payment_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: i64,
    pub client_id: i64,
    pub service_id: i64,
    pub subscription_id: Option<i64>,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklyAvailability {
    pub id: i64,
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvailabilityException {
    pub id: i64,
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_available: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub client_id: i64,
    pub appointment_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub is_approved: bool,
    pub is_public: bool,
    pub created_at: String,
}

// ── Joined rows ──

/// Appointment enriched with service data for list/detail endpoints.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AppointmentDetail {
    pub id: i64,
    pub client_id: i64,
    pub service_id: i64,
    pub subscription_id: Option<i64>,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub service_name: String,
    pub duration_min: i64,
}

/// Subscription joined with its plan, as shown to the owning client.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SubscriptionDetail {
    pub id: i64,
    pub client_id: i64,
    pub plan_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub sessions_remaining: i64,
    pub status: String,
    pub payment_status: String,
    pub plan_name: String,
    pub plan_description: String,
}

/// Review joined with service and author names (client listing, public wall,
/// moderation queue).
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ReviewDetail {
    pub id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub is_approved: bool,
    pub is_public: bool,
    pub created_at: String,
    pub service_name: String,
    pub client_name: String,
}

/// Row shape for the daily reminder sweep.
#[derive(Debug, sqlx::FromRow)]
pub struct ReminderRow {
    pub id: i64,
    pub start_time: String,
    pub email: String,
    pub full_name: String,
    pub service_name: String,
    pub duration_min: i64,
}

// ── Auth API types ──

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserPublic,
}

// ── Client API types ──

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub emergency_contact: Option<String>,
    pub health_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserPublic,
    pub profile: Option<ClientProfile>,
    pub subscription: Option<SubscriptionDetail>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub service_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub start_time: String,
    pub end_time: String,
    pub formatted_time: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    pub available_slots: Vec<SlotView>,
    pub service_duration: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub service_id: i64,
    pub start_time: String,
    pub subscription_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    pub status: Option<String>,
    pub past: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CancelAppointmentResponse {
    pub message: String,
    pub refund: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub has_subscription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionDetail>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub appointment_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

// ── Admin API types ──

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_min: i64,
    pub price: i64,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_min: Option<i64>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_days: i64,
    pub sessions_included: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration_days: Option<i64>,
    pub sessions_included: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub client_id: i64,
    pub plan_id: i64,
    pub payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub sessions_remaining: Option<i64>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetWeeklyAvailabilityRequest {
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddExceptionRequest {
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_available: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminAppointmentsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub clients: i64,
    pub upcoming_appointments: i64,
    pub active_subscriptions: i64,
    pub pending_reviews: i64,
}

// ── Response envelope ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
