use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::auth;
use crate::error::ApiError;
use crate::models::*;
use crate::time::studio_now;
use crate::AppState;

pub(super) const REVIEW_DETAIL_SELECT: &str = "SELECT r.id, r.rating, r.comment, r.is_approved, r.is_public, r.created_at, \
            s.name AS service_name, u.full_name AS client_name \
     FROM reviews r \
     JOIN appointments a ON a.id = r.appointment_id \
     JOIN services s ON s.id = a.service_id \
     JOIN users u ON u.id = r.client_id";

fn validate_rating(rating: i64) -> Result<(), ApiError> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::InvalidInput(
            "Rating must be between 1 and 5".into(),
        ));
    }
    Ok(())
}

/// GET /api/reviews/public — approved reviews for the public wall.
pub async fn public_reviews(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ReviewDetail>>>, ApiError> {
    let reviews = sqlx::query_as::<_, ReviewDetail>(&format!(
        "{REVIEW_DETAIL_SELECT}
         WHERE r.is_approved = 1 AND r.is_public = 1
         ORDER BY r.created_at DESC"
    ))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(reviews)))
}

/// GET /api/reviews — the caller's own reviews, approved or not.
pub async fn my_reviews(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<ReviewDetail>>>, ApiError> {
    let user = auth::authenticate(&headers, &state.secret, studio_now())?;

    let reviews = sqlx::query_as::<_, ReviewDetail>(&format!(
        "{REVIEW_DETAIL_SELECT}
         WHERE r.client_id = ?
         ORDER BY r.created_at DESC"
    ))
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(reviews)))
}

/// POST /api/reviews — review a completed appointment. Moderation starts
/// every review unapproved and private.
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Review>>), ApiError> {
    let user = auth::authenticate(&headers, &state.secret, studio_now())?;
    validate_rating(body.rating)?;

    // Only the client's own completed appointments are reviewable.
    let eligible: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM appointments
         WHERE id = ? AND client_id = ? AND status = 'completed'",
    )
    .bind(body.appointment_id)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;
    if !eligible {
        return Err(ApiError::NotFound(
            "Appointment not found or not eligible for review",
        ));
    }

    let existing: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM reviews WHERE appointment_id = ?")
            .bind(body.appointment_id)
            .fetch_one(&state.db)
            .await?;
    if existing {
        return Err(ApiError::Conflict("This appointment already has a review"));
    }

    let review_id = sqlx::query(
        "INSERT INTO reviews (client_id, appointment_id, rating, comment, is_approved, is_public)
         VALUES (?, ?, ?, ?, 0, 0)",
    )
    .bind(user.id)
    .bind(body.appointment_id)
    .bind(body.rating)
    .bind(&body.comment)
    .execute(&state.db)
    .await?
    .last_insert_rowid();

    let review = sqlx::query_as::<_, Review>(
        "SELECT id, client_id, appointment_id, rating, comment, is_approved, is_public, created_at
         FROM reviews WHERE id = ?",
    )
    .bind(review_id)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(review))))
}

/// PUT /api/reviews/:id — edit an unapproved review; edits re-enter the
/// moderation queue.
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let user = auth::authenticate(&headers, &state.secret, studio_now())?;

    let review = sqlx::query_as::<_, Review>(
        "SELECT id, client_id, appointment_id, rating, comment, is_approved, is_public, created_at
         FROM reviews WHERE id = ? AND client_id = ?",
    )
    .bind(id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Review not found"))?;

    if review.is_approved {
        return Err(ApiError::InvalidInput(
            "Approved reviews can no longer be edited".into(),
        ));
    }

    if let Some(rating) = body.rating {
        validate_rating(rating)?;
        sqlx::query("UPDATE reviews SET rating = ? WHERE id = ?")
            .bind(rating)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    if let Some(comment) = &body.comment {
        sqlx::query("UPDATE reviews SET comment = ? WHERE id = ?")
            .bind(comment)
            .bind(id)
            .execute(&state.db)
            .await?;
    }
    sqlx::query("UPDATE reviews SET is_approved = 0, is_public = 0 WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(ApiResponse::success(
        "Review updated and waiting for approval",
    )))
}

/// DELETE /api/reviews/:id — remove the caller's review.
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    let user = auth::authenticate(&headers, &state.secret, studio_now())?;

    let deleted = sqlx::query("DELETE FROM reviews WHERE id = ? AND client_id = ?")
        .bind(id)
        .bind(user.id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(ApiError::NotFound("Review not found"));
    }

    Ok(Json(ApiResponse::success("Review deleted")))
}

// ── Tests ──
