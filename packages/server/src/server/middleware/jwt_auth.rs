//! Tenant authentication (spec §6): every mining route is scoped to a
//! tenant, proven either by a tenant-signed JWT or, for the manual-miner
//! ingest path, a shared bearer token configured out of band.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::common::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Tenant id the JWT is scoped to.
    tenant_id: String,
    exp: usize,
}

#[derive(Debug, Clone)]
pub struct TenantAuth {
    pub tenant_id: String,
    /// `true` when authenticated via the shared manual-miner token rather
    /// than a tenant-signed JWT — callers that only want to accept
    /// operator-submitted rows (not automated tenants) can check this.
    pub via_manual_token: bool,
}

pub enum AuthError {
    MissingHeader,
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingHeader => (StatusCode::UNAUTHORIZED, "missing authorization header"),
            AuthError::Invalid => (StatusCode::UNAUTHORIZED, "invalid or expired token"),
        };
        (status, message).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl FromRequestParts<AppState> for TenantAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingHeader)?;

        if constant_time_eq(token, state.config.manual_miner_token.expose()) {
            let tenant_id = parts
                .headers
                .get("x-tenant-id")
                .and_then(|v| v.to_str().ok())
                .ok_or(AuthError::Invalid)?
                .to_string();
            return Ok(TenantAuth { tenant_id, via_manual_token: true });
        }

        let key = DecodingKey::from_secret(state.config.jwt_secret.expose().as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::default()).map_err(|_| AuthError::Invalid)?;
        Ok(TenantAuth { tenant_id: data.claims.tenant_id, via_manual_token: false })
    }
}

/// Constant-time comparison so a timing side channel can't be used to
/// brute-force the manual-miner token byte by byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("abc123", "abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn constant_time_eq_rejects_different_content() {
        assert!(!constant_time_eq("abc123", "abc124"));
    }
}
