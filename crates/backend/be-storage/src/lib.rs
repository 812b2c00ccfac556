//! Image host for gift site uploads, built on OpenDAL.
//!
//! Uses either the local filesystem or S3 as the backend, configurable via
//! environment variables. Stored objects are addressed publicly through
//! `IMAGE_PUBLIC_BASE_URL`.
//!
//! ## Environment Variables
//!
//! - `ASSET_STORAGE_BACKEND`: Either "fs" (default) or "s3"
//! - `IMAGE_PUBLIC_BASE_URL`: Public URL prefix for stored images
//!   (required for S3, default `http://localhost:3000/uploads` for fs)
//!
//! ### For filesystem backend:
//! - `ASSET_STORAGE_FS_ROOT`: Root directory for file storage (default: "./uploads")
//!
//! ### For S3 backend:
//! - `ASSET_STORAGE_S3_BUCKET`: S3 bucket name (required)
//! - `ASSET_STORAGE_S3_REGION`: S3 region (required)
//! - `ASSET_STORAGE_S3_ENDPOINT`: S3 endpoint URL (optional, for S3-compatible services)
//! - `ASSET_STORAGE_S3_ACCESS_KEY_ID`: access key ID (required)
//! - `ASSET_STORAGE_S3_SECRET_ACCESS_KEY`: secret access key (required)

mod error;

pub use error::{StorageError, StorageResult};

use bon::bon;
use chrono::Utc;
use opendal::{Operator, services};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_FS_ROOT: &str = "./uploads";
const DEFAULT_FS_PUBLIC_URL: &str = "http://localhost:3000/uploads";

#[derive(Debug, Clone)]
pub enum StorageBackend {
    FS {
        root: String,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        access_key_id: String,
        secret_access_key: SecretString,
    },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::FS {
                root: DEFAULT_FS_ROOT.to_string(),
            },
            public_base_url: DEFAULT_FS_PUBLIC_URL.to_string(),
        }
    }
}

fn required_env(name: &str) -> StorageResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorageError::missing_env_var(name))
}

impl StorageConfig {
    /// Create configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MissingEnvVar` if required environment variables
    /// are not set when using S3 backend.
    pub fn from_env() -> StorageResult<Self> {
        let backend = std::env::var("ASSET_STORAGE_BACKEND")
            .unwrap_or_else(|_| "fs".to_string())
            .to_lowercase();

        match backend.as_str() {
            "s3" => Ok(StorageConfig {
                backend: StorageBackend::S3 {
                    bucket: required_env("ASSET_STORAGE_S3_BUCKET")?,
                    region: required_env("ASSET_STORAGE_S3_REGION")?,
                    endpoint: std::env::var("ASSET_STORAGE_S3_ENDPOINT").ok(),
                    access_key_id: required_env("ASSET_STORAGE_S3_ACCESS_KEY_ID")?,
                    secret_access_key: required_env("ASSET_STORAGE_S3_SECRET_ACCESS_KEY")?
                        .into(),
                },
                public_base_url: required_env("IMAGE_PUBLIC_BASE_URL")?,
            }),
            "fs" => Ok(StorageConfig {
                backend: StorageBackend::FS {
                    root: std::env::var("ASSET_STORAGE_FS_ROOT")
                        .unwrap_or_else(|_| DEFAULT_FS_ROOT.to_string()),
                },
                public_base_url: std::env::var("IMAGE_PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_FS_PUBLIC_URL.to_string()),
            }),
            other => Err(StorageError::configuration(format!(
                "unknown ASSET_STORAGE_BACKEND '{other}', expected 'fs' or 's3'"
            ))),
        }
    }
}

/// A stored image and the URL it is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StorageService {
    operator: Operator,
    config: StorageConfig,
}

#[bon]
impl StorageService {
    /// Create a new storage service with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operator cannot be created.
    #[builder]
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        let operator = Self::create_operator(&config.backend)?;
        Ok(Self { operator, config })
    }

    /// Create a new storage service using environment variables for configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the operator cannot be created.
    pub fn from_env() -> StorageResult<Self> {
        let config = StorageConfig::from_env()?;
        info!("Initializing image storage with config: {:?}", config);
        Self::builder().config(config).build()
    }

    fn create_operator(backend: &StorageBackend) -> StorageResult<Operator> {
        match backend {
            StorageBackend::FS { root } => {
                debug!("Creating filesystem storage operator with root: {}", root);

                std::fs::create_dir_all(root)?;

                let builder = services::Fs::default().root(root);

                Ok(Operator::new(builder)?.finish())
            }
            StorageBackend::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
            } => {
                debug!("Creating S3 storage operator for bucket: {}", bucket);

                let mut builder = services::S3::default()
                    .bucket(bucket)
                    .region(region)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key.expose_secret());

                if let Some(ep) = endpoint {
                    builder = builder.endpoint(ep);
                }

                Ok(Operator::new(builder)?.finish())
            }
        }
    }

    /// `{folder}/{unix millis}-{random suffix}.{ext}`
    pub fn generate_path(folder: &str, extension: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}-{}.{}",
            folder.trim_matches('/'),
            Utc::now().timestamp_millis(),
            &suffix[..8],
            extension
        )
    }

    pub fn extension_from_mime(mime_type: &str) -> &'static str {
        match mime_type {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            path
        )
    }

    /// Upload an image under `folder` and return where it is served from.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload operation fails.
    pub async fn upload_image(
        &self,
        folder: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> StorageResult<StoredImage> {
        if content.is_empty() {
            return Err(StorageError::EmptyImage);
        }

        let extension = Self::extension_from_mime(mime_type);
        let path = Self::generate_path(folder, extension);
        let size = content.len();

        debug!("Uploading image to path: {} ({} bytes)", path, size);

        self.operator
            .write_with(&path, content)
            .content_type(mime_type)
            .await?;

        info!(%path, size, "Stored image");

        let url = self.public_url(&path);
        Ok(StoredImage { path, url })
    }

    /// Root directory of the filesystem backend, if that is the backend in use.
    pub fn fs_root(&self) -> Option<&str> {
        match &self.config.backend {
            StorageBackend::FS { root } => Some(root),
            StorageBackend::S3 { .. } => None,
        }
    }
}
