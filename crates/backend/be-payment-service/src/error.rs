use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use be_remote_db::DbError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("Gift site not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Payment provider error: {0}")]
    Upstream(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Database error: {0}")]
    Database(#[source] DbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<DbError> for PaymentError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { id, .. } => Self::NotFound(id.unwrap_or_default()),
            other => Self::Database(other),
        }
    }
}

impl PaymentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PaymentError::Stripe(stripe::StripeError::Stripe(_, code)) => match code {
                400 => StatusCode::BAD_REQUEST,
                402 => StatusCode::PAYMENT_REQUIRED,
                429 => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            PaymentError::Stripe(_) | PaymentError::Upstream(_) => StatusCode::BAD_GATEWAY,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PaymentError::InvalidSignature | PaymentError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            PaymentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PaymentError::Database(_) | PaymentError::Config(_) | PaymentError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to an untrusted caller.
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Stripe(stripe::StripeError::Stripe(api_error, code))
                if (400..500).contains(code) =>
            {
                api_error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Payment processing error".to_string())
            }
            PaymentError::Stripe(_) | PaymentError::Upstream(_) | PaymentError::Timeout(_) => {
                "Payment provider unavailable".to_string()
            }
            PaymentError::NotFound(_) => "Gift site not found".to_string(),
            PaymentError::Unauthorized(_)
            | PaymentError::InvalidSignature
            | PaymentError::InvalidRequest(_) => self.to_string(),
            PaymentError::Database(_) | PaymentError::Config(_) | PaymentError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Payment service error");
        } else {
            tracing::warn!(%status, error = %self, "Payment request rejected");
        }

        (
            status,
            axum::Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_not_found_maps_to_not_found() {
        let err: PaymentError = DbError::not_found_with_id("gift site", "abc").into();
        assert!(err.is_not_found());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internals_are_not_leaked() {
        let err: PaymentError = DbError::connection("password authentication failed").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");

        let err = PaymentError::Upstream("connection reset by 10.0.0.3".into());
        assert_eq!(err.public_message(), "Payment provider unavailable");
    }

    #[test]
    fn signature_failures_are_bad_requests() {
        assert_eq!(
            PaymentError::InvalidSignature.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
