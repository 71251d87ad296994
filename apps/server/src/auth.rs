//! Bearer-token authentication and password storage.
//!
//! Tokens are `hex(claims JSON) . hex(HMAC-SHA256(secret, payload))`. The
//! server re-computes the tag and compares in constant time, then checks
//! expiry and purpose. Passwords are stored as `salt$digest` where the digest
//! is HMAC-SHA256 keyed by the salt. The booking core never sees any of this;
//! it receives the resolved `{id, role}` identity and trusts it.

use axum::http::{header, HeaderMap};
use chrono::NaiveDateTime;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Session token lifetime (7 days).
const SESSION_TTL_SECS: i64 = 7 * 86400;
/// Password-reset token lifetime (1 hour).
const RESET_TTL_SECS: i64 = 3600;

pub const PURPOSE_SESSION: &str = "session";
pub const PURPOSE_RESET: &str = "reset";

/// Authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: String,
    pub purpose: String,
    pub exp: i64,
}

fn sign(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn issue(secret: &str, claims: &Claims) -> String {
    let payload = hex::encode(serde_json::to_vec(claims).expect("claims serialize"));
    let tag = sign(secret, &payload);
    format!("{payload}.{tag}")
}

pub fn issue_session_token(secret: &str, user_id: i64, role: &str, now: NaiveDateTime) -> String {
    issue(
        secret,
        &Claims {
            sub: user_id,
            role: role.to_string(),
            purpose: PURPOSE_SESSION.into(),
            exp: now.and_utc().timestamp() + SESSION_TTL_SECS,
        },
    )
}

pub fn issue_reset_token(secret: &str, user_id: i64, now: NaiveDateTime) -> String {
    issue(
        secret,
        &Claims {
            sub: user_id,
            role: String::new(),
            purpose: PURPOSE_RESET.into(),
            exp: now.and_utc().timestamp() + RESET_TTL_SECS,
        },
    )
}

/// Verify signature and expiry; returns the claims without judging purpose.
pub fn verify_token(secret: &str, token: &str, now: NaiveDateTime) -> Option<Claims> {
    let (payload, tag) = token.split_once('.')?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&hex::decode(tag).ok()?).ok()?;

    let claims: Claims = serde_json::from_slice(&hex::decode(payload).ok()?).ok()?;
    if claims.exp <= now.and_utc().timestamp() {
        return None;
    }
    Some(claims)
}

/// Resolve the request's identity from `Authorization: Bearer <token>`.
pub fn authenticate(
    headers: &HeaderMap,
    secret: &str,
    now: NaiveDateTime,
) -> Result<AuthUser, ApiError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("Missing Authorization header"))?;

    let claims = verify_token(secret, bearer, now)
        .filter(|c| c.purpose == PURPOSE_SESSION)
        .ok_or(ApiError::Unauthorized("Invalid or expired token"))?;

    Ok(AuthUser {
        id: claims.sub,
        role: claims.role,
    })
}

/// Resolve an admin identity or fail with 401/403.
pub fn authenticate_admin(
    headers: &HeaderMap,
    secret: &str,
    now: NaiveDateTime,
) -> Result<AuthUser, ApiError> {
    let user = authenticate(headers, secret, now)?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

// ── Password storage ──

static SALT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_salt() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let count = SALT_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(count.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

pub fn hash_password(password: &str) -> String {
    let salt = generate_salt();
    let mut mac =
        HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("{salt}${digest}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, digest)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(salt.as_bytes()) else {
        return false;
    };
    mac.update(password.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_datetime;

    const SECRET: &str = "test-secret";

    fn now() -> NaiveDateTime {
        parse_datetime("2026-03-02 12:00:00").unwrap()
    }

    #[test]
    fn test_session_token_roundtrip() {
        let token = issue_session_token(SECRET, 42, "client", now());
        let claims = verify_token(SECRET, &token, now()).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, "client");
        assert_eq!(claims.purpose, PURPOSE_SESSION);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_session_token(SECRET, 42, "client", now());
        let much_later = parse_datetime("2026-03-10 12:00:01").unwrap();
        assert!(verify_token(SECRET, &token, much_later).is_none());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let token = issue_session_token(SECRET, 42, "client", now());
        let mut tampered = token[..token.len() - 2].to_string();
        tampered.push_str("00");
        assert!(verify_token(SECRET, &tampered, now()).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = issue_session_token(SECRET, 42, "client", now());
        let (payload, tag) = token.split_once('.').unwrap();
        // Forge a different payload under the original tag.
        let forged_claims = Claims {
            sub: 1,
            role: "admin".into(),
            purpose: PURPOSE_SESSION.into(),
            exp: now().and_utc().timestamp() + 3600,
        };
        let forged = hex::encode(serde_json::to_vec(&forged_claims).unwrap());
        assert_ne!(forged, payload);
        assert!(verify_token(SECRET, &format!("{forged}.{tag}"), now()).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_session_token(SECRET, 42, "client", now());
        assert!(verify_token("other-secret", &token, now()).is_none());
    }

    #[test]
    fn test_reset_token_does_not_authenticate() {
        let token = issue_reset_token(SECRET, 42, now());
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        assert!(authenticate(&headers, SECRET, now()).is_err());
        // But it still verifies as a reset token.
        let claims = verify_token(SECRET, &token, now()).unwrap();
        assert_eq!(claims.purpose, PURPOSE_RESET);
    }

    #[test]
    fn test_authenticate_from_header() {
        let token = issue_session_token(SECRET, 7, "client", now());
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let user = authenticate(&headers, SECRET, now()).unwrap();
        assert_eq!(user.id, 7);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_missing_header_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(
            authenticate(&headers, SECRET, now()),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_admin_gate() {
        let token = issue_session_token(SECRET, 7, "client", now());
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        assert!(matches!(
            authenticate_admin(&headers, SECRET, now()),
            Err(ApiError::Forbidden)
        ));

        let token = issue_session_token(SECRET, 1, "admin", now());
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        assert!(authenticate_admin(&headers, SECRET, now()).is_ok());
    }

    #[test]
    fn test_password_roundtrip() {
        let stored = hash_password("hunter22");
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
    }

    #[test]
    fn test_password_hashes_are_salted() {
        let a = hash_password("same-password");
        let b = hash_password("same-password");
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a));
        assert!(verify_password("same-password", &b));
    }

    #[test]
    fn test_malformed_stored_hash_rejected() {
        assert!(!verify_password("anything", "no-dollar-separator"));
        assert!(!verify_password("anything", "salt$not-hex"));
    }
}
