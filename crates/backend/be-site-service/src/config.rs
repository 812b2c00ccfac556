use chrono::Duration;

/// How long an unpaid site stays viewable.
pub const PROVISIONAL_TTL_HOURS: i64 = 24;
/// Slug/credential generation attempts before giving up.
pub const SLUG_ATTEMPTS: usize = 5;
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const UPLOAD_FOLDER: &str = "gift-sites";
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub provisional_ttl: Duration,
    pub slug_attempts: usize,
    pub max_upload_bytes: usize,
    pub upload_folder: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            provisional_ttl: Duration::hours(PROVISIONAL_TTL_HOURS),
            slug_attempts: SLUG_ATTEMPTS,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            upload_folder: UPLOAD_FOLDER.to_string(),
        }
    }
}

impl SiteConfig {
    pub fn is_allowed_image_type(mime_type: &str) -> bool {
        ALLOWED_IMAGE_TYPES.contains(&mime_type)
    }
}
