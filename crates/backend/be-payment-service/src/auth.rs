use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::PaymentError;
use crate::service::AppState;

/// Proof that the caller holds the scheduler's shared secret.
pub struct CronAuth;

impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = PaymentError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PaymentError::Unauthorized("Missing authorization header".to_string())
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            PaymentError::Unauthorized(
                "Authorization header must start with 'Bearer '".to_string(),
            )
        })?;

        if !constant_time_eq(token.as_bytes(), state.config.cron_secret.as_bytes()) {
            return Err(PaymentError::Unauthorized("Invalid cron secret".to_string()));
        }

        Ok(CronAuth)
    }
}

/// Compares without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
