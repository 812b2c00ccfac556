//! Error types for the gift site record store

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{entity} not found{}", .id.as_ref().map(|id| format!(": {}", id)).unwrap_or_default())]
    NotFound {
        entity: &'static str,
        id: Option<String>,
    },

    /// A unique index rejected the write. `field` names the column when the
    /// constraint is one of ours.
    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    /// A check constraint rejected the write.
    #[error("Record rejected by {0}")]
    Rejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored record is malformed: {0}")]
    Malformed(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl DbError {
    pub fn not_found_with_id(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: Some(id.into()),
        }
    }

    pub fn duplicate(field: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate {
            field,
            value: value.into(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

fn unique_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("gift_sites_slug_key") => "slug",
        Some("gift_sites_edit_credential_key") => "edit_credential",
        Some("gift_sites_pkey") => "id",
        _ => "constraint",
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "gift site",
                id: None,
            },
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    // unique_violation
                    Some("23505") => {
                        let constraint = db_err.constraint();
                        Self::Duplicate {
                            field: unique_field(constraint),
                            value: constraint.unwrap_or("unknown").to_string(),
                        }
                    }
                    // check_violation
                    Some("23514") => {
                        Self::Rejected(db_err.constraint().unwrap_or("unknown").to_string())
                    }
                    _ => Self::Database(sqlx::Error::Database(db_err)),
                }
            }
            sqlx::Error::PoolTimedOut => Self::Unavailable("pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Unavailable("pool closed".to_string()),
            sqlx::Error::Io(io_err) => Self::Unavailable(io_err.to_string()),
            sqlx::Error::Tls(tls_err) => Self::Unavailable(format!("tls: {}", tls_err)),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::Malformed(format!("column {}: {}", index, source))
            }
            other => Self::Database(other),
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
