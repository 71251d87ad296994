use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::auth;
use crate::error::ApiError;
use crate::models::*;
use crate::time::{fmt_datetime, studio_now};
use crate::AppState;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

const USER_SELECT: &str = "SELECT id, email, password_hash, full_name, phone, role, \
     created_at, last_login FROM users";

const USER_PUBLIC_SELECT: &str = "SELECT id, email, full_name, phone, role FROM users";

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let looks_like_email = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !looks_like_email {
        return Err(ApiError::InvalidInput("Invalid email address".into()));
    }
    Ok(())
}

/// POST /api/auth/register — create a client account and sign it in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    validate_email(&body.email)?;
    validate_password(&body.password)?;
    if body.full_name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Full name is required".into()));
    }

    let taken: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(ApiError::InvalidInput("Email is already registered".into()));
    }

    let user_id = sqlx::query(
        "INSERT INTO users (email, password_hash, full_name, phone, role)
         VALUES (?, ?, ?, ?, 'client')",
    )
    .bind(&body.email)
    .bind(auth::hash_password(&body.password))
    .bind(body.full_name.trim())
    .bind(&body.phone)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    sqlx::query("INSERT INTO client_profiles (user_id) VALUES (?)")
        .bind(user_id)
        .execute(&state.db)
        .await?;

    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE id = ?"))
        .bind(user_id)
        .fetch_one(&state.db)
        .await?;

    state.mailer.notify_welcome(&user);

    let now = studio_now();
    let token = auth::issue_session_token(&state.secret, user.id, &user.role, now);
    let public = sqlx::query_as::<_, UserPublic>(&format!("{USER_PUBLIC_SELECT} WHERE id = ?"))
        .bind(user.id)
        .fetch_one(&state.db)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AuthResponse {
            token,
            user: public,
        })),
    ))
}

/// POST /api/auth/login — verify credentials and issue a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE email = ?"))
        .bind(&body.email)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::Unauthorized("Invalid credentials"))?;

    if !auth::verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("Invalid credentials"));
    }

    let now = studio_now();
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(fmt_datetime(now))
        .bind(user.id)
        .execute(&state.db)
        .await?;

    let token = auth::issue_session_token(&state.secret, user.id, &user.role, now);
    let public = sqlx::query_as::<_, UserPublic>(&format!("{USER_PUBLIC_SELECT} WHERE id = ?"))
        .bind(user.id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(AuthResponse {
        token,
        user: public,
    })))
}

/// POST /api/auth/forgot-password — send a reset link when the address is
/// known. The response never reveals whether the account exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE email = ?"))
        .bind(&body.email)
        .fetch_optional(&state.db)
        .await?;

    if let Some(user) = user {
        let token = auth::issue_reset_token(&state.secret, user.id, studio_now());
        state.mailer.notify_password_reset(&user, &token);
    }

    Ok(Json(ApiResponse::success(
        "If the email is registered, you will receive reset instructions",
    )))
}

/// POST /api/auth/reset-password — set a new password from a reset token.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let claims = auth::verify_token(&state.secret, &body.token, studio_now())
        .filter(|c| c.purpose == auth::PURPOSE_RESET)
        .ok_or(ApiError::Unauthorized("Invalid or expired token"))?;

    validate_password(&body.password)?;

    let updated = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(auth::hash_password(&body.password))
        .bind(claims.sub)
        .execute(&state.db)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(ApiError::NotFound("User not found"));
    }

    Ok(Json(ApiResponse::success("Password updated")))
}

/// GET /api/auth/verify-token — resolve the current session to a user.
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<UserPublic>>, ApiError> {
    let identity = auth::authenticate(&headers, &state.secret, studio_now())?;

    let user = sqlx::query_as::<_, UserPublic>(&format!("{USER_PUBLIC_SELECT} WHERE id = ?"))
        .bind(identity.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    Ok(Json(ApiResponse::success(user)))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@nodot").is_err());
        assert!(validate_email("ana@.com").is_err());
    }

    #[test]
    fn test_password_validation() {
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
    }
}
