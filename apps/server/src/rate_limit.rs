use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Configuration ──

/// Limits for one named tier.
#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Fixed window length.
    pub window: Duration,
}

/// Fixed-window request counter per tier.
#[derive(Debug)]
struct Counter {
    window_started: Instant,
    count: u32,
}

// ── Core rate limiter ──

/// In-memory per-IP rate limiter. Each tier keeps an independent counter map
/// keyed by client IP; counters reset when their window elapses.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    tiers: Arc<DashMap<&'static str, (TierConfig, DashMap<IpAddr, Counter>)>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tier(&self, name: &'static str, config: TierConfig) {
        self.tiers.insert(name, (config, DashMap::new()));
    }

    /// Returns `Ok(())` when the request fits the tier's budget,
    /// `Err(retry_after_secs)` otherwise.
    pub fn check(&self, tier: &'static str, ip: IpAddr) -> Result<(), u64> {
        let entry = self.tiers.get(tier).expect("unknown rate limit tier");
        let (config, counters) = entry.value();
        let now = Instant::now();

        let mut counter = counters.entry(ip).or_insert_with(|| Counter {
            window_started: now,
            count: 0,
        });

        if now.duration_since(counter.window_started) >= config.window {
            counter.window_started = now;
            counter.count = 0;
        }

        if counter.count >= config.max_requests {
            let elapsed = now.duration_since(counter.window_started);
            let retry_after = config.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }

        counter.count += 1;
        Ok(())
    }

    /// Drop counters whose window expired long ago. Run from a background
    /// task so idle IPs do not accumulate.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for entry in self.tiers.iter() {
            let (config, counters) = entry.value();
            counters
                .retain(|_, c| now.duration_since(c.window_started) < config.window * 2);
        }
    }
}

// ── IP extraction ──

/// Client IP: first hop of X-Forwarded-For behind the reverse proxy, else
/// the socket peer address.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
        })
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

// ── Middleware (one per tier) ──

/// Public read-only endpoints (services, plans, availability).
pub async fn limit_browse(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("browse", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Registration, login and other account endpoints.
pub async fn limit_account(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("account", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Appointment creation, the strictest tier.
pub async fn limit_booking(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("booking", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Admin surface.
pub async fn limit_admin(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check("admin", ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn limiter(max: u32, window: Duration) -> RateLimiter {
        let l = RateLimiter::new();
        l.add_tier("test", TierConfig {
            max_requests: max,
            window,
        });
        l
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_allows_within_budget() {
        let l = limiter(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(l.check("test", ip(1)).is_ok());
        }
    }

    #[test]
    fn test_rejects_over_budget_with_retry_hint() {
        let l = limiter(2, Duration::from_secs(60));
        l.check("test", ip(1)).unwrap();
        l.check("test", ip(1)).unwrap();
        let retry = l.check("test", ip(1)).unwrap_err();
        assert!((1..=60).contains(&retry));
    }

    #[test]
    fn test_window_reset_restores_budget() {
        let l = limiter(1, Duration::from_millis(50));
        assert!(l.check("test", ip(1)).is_ok());
        assert!(l.check("test", ip(1)).is_err());

        sleep(Duration::from_millis(70));

        assert!(l.check("test", ip(1)).is_ok());
    }

    #[test]
    fn test_ips_counted_independently() {
        let l = limiter(1, Duration::from_secs(60));
        assert!(l.check("test", ip(1)).is_ok());
        assert!(l.check("test", ip(1)).is_err());
        assert!(l.check("test", ip(2)).is_ok());
    }

    #[test]
    fn test_tiers_counted_independently() {
        let l = RateLimiter::new();
        let cfg = TierConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        };
        l.add_tier("a", cfg);
        l.add_tier("b", cfg);
        assert!(l.check("a", ip(1)).is_ok());
        assert!(l.check("a", ip(1)).is_err());
        assert!(l.check("b", ip(1)).is_ok());
    }

    #[test]
    fn test_cleanup_drops_stale_counters_only() {
        let l = limiter(5, Duration::from_millis(40));
        l.check("test", ip(1)).unwrap();

        sleep(Duration::from_millis(100)); // > 2× window
        l.check("test", ip(2)).unwrap();
        l.cleanup();

        let entry = l.tiers.get("test").unwrap();
        let (_, counters) = entry.value();
        assert!(!counters.contains_key(&ip(1)));
        assert!(counters.contains_key(&ip(2)));
    }
}
