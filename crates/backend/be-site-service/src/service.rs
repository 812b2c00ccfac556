use std::sync::Arc;

use be_payment_service::auth::constant_time_eq;
use be_payment_service::{PaymentBridge, PaymentStart, analytics};
use be_remote_db::{Clock, GiftSite, NewGiftSite, SiteContent, SiteStore, SystemClock};
use be_storage::{StorageService, StoredImage};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SiteConfig;
use crate::credentials::{generate_edit_credential, generate_slug};
use crate::error::{SiteError, SiteResult};
use crate::types::{
    CreateSiteRequest, CreateSiteResponse, CreatedSite, EditableSite, PublicSite, SiteIdentifier,
    SitePatch,
};
use crate::validation::{check_content, normalize_youtube_link, validate_create};

#[derive(bon::Builder)]
pub struct SiteService {
    store: Arc<dyn SiteStore>,
    bridge: Arc<PaymentBridge>,
    storage: Arc<StorageService>,
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    clock: Arc<dyn Clock>,
    #[builder(default)]
    config: SiteConfig,
}

impl SiteService {
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Validates and persists a new unpaid site with a provisional deadline.
    #[instrument(skip_all)]
    pub async fn create_site(&self, req: &CreateSiteRequest) -> SiteResult<CreatedSite> {
        let valid = validate_create(req)?;
        let template_type = valid.template.template_type();

        for attempt in 1..=self.config.slug_attempts {
            let slug = generate_slug()?;
            if self.store.slug_exists(&slug).await? {
                debug!(attempt, %slug, "Slug already taken, regenerating");
                continue;
            }

            let now = self.clock.now();
            let new_site = NewGiftSite {
                id: Uuid::now_v7(),
                slug,
                edit_credential: generate_edit_credential()?,
                title: valid.title.clone(),
                message: valid.message.clone(),
                special_date: valid.special_date,
                youtube_link: valid.youtube_link.clone(),
                images: valid.images.clone(),
                template: valid.template.clone(),
                customer_email: valid.customer_email.clone(),
                expires_at: now + self.config.provisional_ttl,
                created_at: now,
            };

            match self.store.insert_site(new_site).await {
                Ok(site) => {
                    info!(site_id = %site.id, slug = %site.slug, %template_type, "Gift site created");
                    analytics::track_site_created(&template_type.to_string());
                    return Ok(CreatedSite {
                        site_id: site.id,
                        slug: site.slug,
                        edit_credential: site.edit_credential,
                    });
                }
                Err(e) if e.is_duplicate() => {
                    warn!(attempt, error = %e, "Insert hit a uniqueness constraint, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SiteError::SlugExhaustion(self.config.slug_attempts))
    }

    /// Creates a site and opens its payment. The site is removed again when
    /// the payment cannot be created.
    pub async fn create_and_start_payment(
        &self,
        req: &CreateSiteRequest,
    ) -> SiteResult<CreateSiteResponse> {
        let created = self.create_site(req).await?;

        let start = match self.bridge.start_payment(created.site_id).await {
            Ok(start) => start,
            Err(e) => {
                if let Err(delete_err) = self.store.delete_site(created.site_id).await {
                    error!(
                        site_id = %created.site_id,
                        error = %delete_err,
                        "Failed to roll back site after payment creation failed"
                    );
                }
                return Err(e.into());
            }
        };

        let PaymentStart { handle, .. } = start;
        let (client_secret, checkout_url) = handle
            .map(|h| (h.client_secret, h.checkout_url))
            .unwrap_or_default();

        Ok(CreateSiteResponse {
            success: true,
            site_id: created.site_id,
            slug: created.slug,
            edit_credential: created.edit_credential,
            client_secret,
            checkout_url,
        })
    }

    async fn load(&self, identifier: &SiteIdentifier) -> SiteResult<GiftSite> {
        let site = match identifier {
            SiteIdentifier::Id(id) => self.store.get_site(*id).await?,
            SiteIdentifier::Slug(slug) => self.store.get_site_by_slug(slug).await?,
        };
        Ok(site)
    }

    /// Applies an authenticated content edit to a paid site.
    #[instrument(skip(self, credential, patch))]
    pub async fn edit_site(
        &self,
        credential: &str,
        identifier: &SiteIdentifier,
        mut patch: SitePatch,
    ) -> SiteResult<GiftSite> {
        let site = self.load(identifier).await?;

        if !constant_time_eq(credential.as_bytes(), site.edit_credential.as_bytes()) {
            return Err(SiteError::Authorization);
        }

        let immutable = patch.immutable_fields();
        if !immutable.is_empty() {
            return Err(SiteError::Validation(
                immutable
                    .into_iter()
                    .map(|field| format!("{field} cannot be changed"))
                    .collect(),
            ));
        }

        if !site.paid {
            return Err(SiteError::Unpaid);
        }

        let mut content = SiteContent::from(&site);
        let mut problems = Vec::new();

        if let Some(title) = patch.title.take() {
            let title = title.trim();
            if title.is_empty() {
                problems.push("title cannot be empty".to_string());
            }
            content.title = title.to_string();
        }
        if let Some(message) = patch.message.take() {
            let message = message.trim();
            if message.is_empty() {
                problems.push("message cannot be empty".to_string());
            }
            content.message = message.to_string();
        }
        if let Some(special_date) = patch.special_date.take() {
            content.special_date = special_date;
        }
        if let Some(youtube_link) = patch.youtube_link.take() {
            content.youtube_link = normalize_youtube_link(youtube_link);
        }
        if let Some(images) = patch.images.take() {
            content.images = images;
        }
        for template_patch in patch.take_template_patches() {
            template_patch.merge_into(&mut content.template)?;
        }

        check_content(
            content.youtube_link.as_deref(),
            &content.images,
            &content.template,
            &mut problems,
        );
        if !problems.is_empty() {
            return Err(SiteError::Validation(problems));
        }

        let updated = self
            .store
            .update_site_content(site.id, content, self.clock.now())
            .await?;
        info!(slug = %updated.slug, "Gift site edited");
        Ok(updated)
    }

    /// The public view of a site. An expired site with a processor id gets
    /// one live payment check before it is reported as expired.
    #[instrument(skip(self))]
    pub async fn get_public_site(&self, slug: &str) -> SiteResult<PublicSite> {
        let mut site = self.store.get_site_by_slug(slug).await?;

        if site.is_expired_at(self.clock.now()) && site.processor_ref().is_some() {
            match self.bridge.refresh_site(site.clone()).await {
                Ok(refreshed) => site = refreshed,
                Err(e) => warn!(%slug, error = %e, "Inline payment check failed"),
            }
        }

        if site.is_expired_at(self.clock.now()) {
            return Err(SiteError::Expired);
        }

        Ok(site.into())
    }

    /// The edit-page view, for holders of the edit credential.
    #[instrument(skip(self, credential))]
    pub async fn get_editable_site(&self, slug: &str, credential: &str) -> SiteResult<EditableSite> {
        let site = self.store.get_site_by_slug(slug).await?;

        if !constant_time_eq(credential.as_bytes(), site.edit_credential.as_bytes()) {
            return Err(SiteError::Authorization);
        }
        if !site.paid {
            return Err(SiteError::Unpaid);
        }

        Ok(site.into())
    }

    /// Stores an already-read image after checking type and size.
    pub async fn upload_image(&self, mime_type: &str, content: Vec<u8>) -> SiteResult<StoredImage> {
        if !SiteConfig::is_allowed_image_type(mime_type) {
            return Err(SiteError::UnsupportedMediaType(mime_type.to_string()));
        }
        if content.len() > self.config.max_upload_bytes {
            return Err(SiteError::FileTooLarge {
                size: content.len(),
                limit: self.config.max_upload_bytes,
            });
        }
        if content.is_empty() {
            return Err(SiteError::validation("file is empty"));
        }

        let stored = self
            .storage
            .upload_image(&self.config.upload_folder, content, mime_type)
            .await?;
        Ok(stored)
    }
}
