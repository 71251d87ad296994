mod auth;
mod availability;
mod booking;
mod calendar_lock;
mod db;
mod error;
mod handlers;
mod mailer;
mod models;
mod rate_limit;
mod scheduler;
mod time;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use calendar_lock::CalendarLocks;
use mailer::Mailer;
use rate_limit::{
    limit_account, limit_admin, limit_booking, limit_browse, RateLimiter, TierConfig,
};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub secret: String,
    pub mailer: Mailer,
    pub locks: Arc<CalendarLocks>,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Required env vars ──
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:verbena.db?mode=rwc".into());
    let secret = std::env::var("APP_SECRET").expect("APP_SECRET must be set");

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let frontend_url =
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".into());

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    // Admin bootstrap from env; hashes never live in migration files.
    match (
        std::env::var("ADMIN_EMAIL").ok(),
        std::env::var("ADMIN_PASSWORD").ok(),
    ) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            db::ensure_admin_account(&pool, &email, &password).await?;
        }
        _ => tracing::warn!("ADMIN_EMAIL/ADMIN_PASSWORD not set — no admin account created"),
    }

    let state = Arc::new(AppState {
        db: pool,
        secret,
        mailer: Mailer::from_env(),
        locks: Arc::new(CalendarLocks::new()),
        started_at: Instant::now(),
    });

    // ── Background task: daily reminder sweep ──
    let reminders_enabled = std::env::var("ENABLE_REMINDERS")
        .map(|v| v != "0" && v != "false")
        .unwrap_or(true);
    if reminders_enabled {
        scheduler::spawn_daily_sweep(
            state.db.clone(),
            state.mailer.clone(),
            state.locks.clone(),
        );
        tracing::info!("Daily reminder sweep enabled");
    }

    // ── Rate limiter ──
    let rate_limiter = RateLimiter::new();
    rate_limiter.add_tier(
        "browse",
        TierConfig {
            max_requests: 60,
            window: Duration::from_secs(60),
        },
    );
    rate_limiter.add_tier(
        "account",
        TierConfig {
            max_requests: 30,
            window: Duration::from_secs(60),
        },
    );
    rate_limiter.add_tier(
        "booking",
        TierConfig {
            max_requests: 5,
            window: Duration::from_secs(300),
        },
    );
    rate_limiter.add_tier(
        "admin",
        TierConfig {
            max_requests: 120,
            window: Duration::from_secs(60),
        },
    );

    // ── Background task: cleanup stale rate limit counters ──
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist FRONTEND_URL when configured, otherwise allow any ──
    let cors = match frontend_url.parse::<axum::http::HeaderValue>() {
        Ok(origin) if frontend_url != "http://localhost:5173" => CorsLayer::new()
            .allow_origin(AllowOrigin::list([
                origin,
                "http://localhost:5173".parse().unwrap(), // Vite dev server
            ]))
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    // ── Router (route groups with per-group rate limits) ──

    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Account: registration, login, sessions (30 req/min)
    let account_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route(
            "/api/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/api/auth/verify-token", get(handlers::auth::verify_token))
        .route(
            "/api/client/profile",
            get(handlers::client::get_profile).put(handlers::client::update_profile),
        )
        .route(
            "/api/client/subscription",
            get(handlers::client::my_subscription),
        )
        .route(
            "/api/appointments/my",
            get(handlers::client::my_appointments),
        )
        .route(
            "/api/appointments/{id}",
            get(handlers::client::appointment_details),
        )
        .route(
            "/api/appointments/{id}/cancel",
            put(handlers::client::cancel_appointment),
        )
        .route(
            "/api/reviews",
            get(handlers::reviews::my_reviews).post(handlers::reviews::create_review),
        )
        .route(
            "/api/reviews/{id}",
            put(handlers::reviews::update_review).delete(handlers::reviews::delete_review),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), limit_account));

    // 3. Browse: public read-only endpoints (60 req/min)
    let browse_routes = Router::new()
        .route("/api/services", get(handlers::client::list_services))
        .route("/api/plans", get(handlers::client::list_plans))
        .route("/api/availability", get(handlers::client::availability))
        .route("/api/reviews/public", get(handlers::reviews::public_reviews))
        .layer(from_fn_with_state(rate_limiter.clone(), limit_browse));

    // 4. Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route(
            "/api/appointments",
            post(handlers::client::create_appointment),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), limit_booking));

    // 5. Admin: the whole management surface (120 req/min)
    let admin_routes = Router::new()
        .route("/api/admin/dashboard", get(handlers::admin::dashboard))
        .route("/api/admin/clients", get(handlers::admin::list_clients))
        .route(
            "/api/admin/clients/{id}",
            get(handlers::admin::client_details),
        )
        .route(
            "/api/admin/services",
            get(handlers::admin::list_all_services).post(handlers::admin::create_service),
        )
        .route(
            "/api/admin/services/{id}",
            put(handlers::admin::update_service).delete(handlers::admin::delete_service),
        )
        .route(
            "/api/admin/plans",
            get(handlers::admin::list_all_plans).post(handlers::admin::create_plan),
        )
        .route(
            "/api/admin/plans/{id}",
            put(handlers::admin::update_plan).delete(handlers::admin::delete_plan),
        )
        .route(
            "/api/admin/subscriptions",
            get(handlers::admin::list_subscriptions).post(handlers::admin::create_subscription),
        )
        .route(
            "/api/admin/subscriptions/{id}",
            put(handlers::admin::update_subscription),
        )
        .route(
            "/api/admin/appointments",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/{id}/status",
            put(handlers::admin::update_appointment_status),
        )
        .route(
            "/api/admin/availability",
            get(handlers::admin::get_weekly_availability)
                .post(handlers::admin::set_weekly_availability),
        )
        .route(
            "/api/admin/availability/exceptions",
            get(handlers::admin::list_exceptions).post(handlers::admin::add_exception),
        )
        .route(
            "/api/admin/availability/exceptions/{id}",
            delete(handlers::admin::delete_exception),
        )
        .route("/api/admin/reviews", get(handlers::admin::list_reviews))
        .route(
            "/api/admin/reviews/{id}",
            delete(handlers::admin::delete_review),
        )
        .route(
            "/api/admin/reviews/{id}/approve",
            put(handlers::admin::approve_review),
        )
        .route(
            "/api/admin/reviews/{id}/reject",
            put(handlers::admin::reject_review),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), limit_admin));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(account_routes)
        .merge(browse_routes)
        .merge(booking_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Verbena server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
