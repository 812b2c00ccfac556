use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use be_payment_service::PaymentError;
use be_remote_db::DbError;
use be_storage::StorageError;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Gift site not found")]
    NotFound,

    #[error("Edit credential does not match")]
    Authorization,

    #[error("Gift site has not been paid for yet")]
    Unpaid,

    #[error("Gift site has expired")]
    Expired,

    #[error("Could not allocate a unique slug after {0} attempts")]
    SlugExhaustion(usize),

    #[error("File is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

pub type SiteResult<T> = Result<T, SiteError>;

impl SiteError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SiteError::Validation(vec![msg.into()])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SiteError::Validation(_) => StatusCode::BAD_REQUEST,
            SiteError::NotFound => StatusCode::NOT_FOUND,
            SiteError::Authorization => StatusCode::FORBIDDEN,
            SiteError::Unpaid => StatusCode::PAYMENT_REQUIRED,
            SiteError::Expired => StatusCode::GONE,
            SiteError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            SiteError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SiteError::SlugExhaustion(_) | SiteError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SiteError::Payment(e) => e.status(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            SiteError::Validation(_) => "validation_error",
            SiteError::NotFound => "not_found",
            SiteError::Authorization => "unauthorized",
            SiteError::Unpaid => "unpaid",
            SiteError::Expired => "expired",
            SiteError::SlugExhaustion(_) => "slug_exhaustion",
            SiteError::FileTooLarge { .. } => "file_too_large",
            SiteError::UnsupportedMediaType(_) => "unsupported_media_type",
            SiteError::Upstream(_) => "upstream_error",
            SiteError::Payment(_) => "payment_error",
        }
    }
}

impl From<DbError> for SiteError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => SiteError::NotFound,
            DbError::Rejected(constraint) => SiteError::validation(format!("rejected by {constraint}")),
            other => SiteError::Upstream(format!("database: {other}")),
        }
    }
}

impl From<StorageError> for SiteError {
    fn from(err: StorageError) -> Self {
        SiteError::Upstream(format!("image host: {err}"))
    }
}

impl IntoResponse for SiteError {
    fn into_response(self) -> Response {
        if let SiteError::Payment(e) = self {
            return e.into_response();
        }

        let status = self.status();
        let (message, details) = match &self {
            SiteError::Validation(problems) => {
                warn!(?problems, "Rejected invalid gift site input");
                ("Invalid input".to_string(), Some(problems.join("; ")))
            }
            SiteError::SlugExhaustion(_) | SiteError::Upstream(_) => {
                error!(error = %self, "Gift site request failed");
                ("Internal server error".to_string(), None)
            }
            other => {
                warn!(%status, error = %other, "Gift site request rejected");
                (other.to_string(), None)
            }
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}
