//! Error types for the image host

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid image host configuration: {0}")]
    Configuration(String),

    #[error("Could not prepare image directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image host error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("Refusing to store an empty image")]
    EmptyImage,
}

impl StorageError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn missing_env_var(var_name: impl Into<String>) -> Self {
        Self::MissingEnvVar(var_name.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::MissingEnvVar(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_named() {
        let err = StorageError::missing_env_var("ASSET_STORAGE_S3_BUCKET");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: ASSET_STORAGE_S3_BUCKET"
        );
    }

    #[test]
    fn runtime_failures_are_not_configuration() {
        assert!(!StorageError::EmptyImage.is_configuration());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!err.is_configuration());
    }
}
