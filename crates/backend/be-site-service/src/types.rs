use be_remote_db::{
    AnniversaryText, BirthdayText, DeclarationText, GiftSite, TemplateContent, TemplateType,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::template::{AnniversaryPatch, BirthdayPatch, DeclarationPatch, TemplatePatch};

/// Distinguishes an absent field from an explicit `null`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub template_type: Option<String>,
    pub customer_email: Option<String>,
    pub special_date: Option<NaiveDate>,
    pub youtube_link: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub birthday: Option<BirthdayText>,
    pub anniversary: Option<AnniversaryText>,
    pub declaration: Option<DeclarationText>,
}

impl CreateSiteRequest {
    /// Supplied text bundles, in template order.
    pub(crate) fn bundles(&self) -> Vec<TemplateContent> {
        let mut bundles = Vec::new();
        if let Some(text) = &self.birthday {
            bundles.push(TemplateContent::Birthday(text.clone()));
        }
        if let Some(text) = &self.anniversary {
            bundles.push(TemplateContent::Anniversary(text.clone()));
        }
        if let Some(text) = &self.declaration {
            bundles.push(TemplateContent::Declaration(text.clone()));
        }
        bundles
    }
}

/// Identifier, slug and edit credential of a freshly created site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSite {
    pub site_id: Uuid,
    pub slug: String,
    pub edit_credential: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteResponse {
    pub success: bool,
    pub site_id: Uuid,
    pub slug: String,
    pub edit_credential: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

/// How an edit request names its site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteIdentifier {
    Id(Uuid),
    Slug(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSiteRequest {
    pub edit_credential: String,
    pub site_id: Option<Uuid>,
    pub slug: Option<String>,
    #[serde(flatten)]
    pub patch: SitePatch,
}

impl EditSiteRequest {
    pub fn identifier(&self) -> Option<SiteIdentifier> {
        self.site_id
            .map(SiteIdentifier::Id)
            .or_else(|| self.slug.clone().map(SiteIdentifier::Slug))
    }
}

/// Editable fields of a site plus any immutable fields the caller tried to
/// change, which are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePatch {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub special_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub youtube_link: Option<Option<String>>,
    pub images: Option<Vec<String>>,
    pub birthday: Option<BirthdayPatch>,
    pub anniversary: Option<AnniversaryPatch>,
    pub declaration: Option<DeclarationPatch>,

    // Present at all, even as null, means the caller tried to change it.
    #[serde(default, deserialize_with = "nullable")]
    pub template_type: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub customer_email: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub paid: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub payment_intent_id: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub checkout_session_id: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: Option<Option<serde_json::Value>>,
}

impl SitePatch {
    pub(crate) fn immutable_fields(&self) -> Vec<&'static str> {
        [
            ("templateType", self.template_type.is_some()),
            ("customerEmail", self.customer_email.is_some()),
            ("paid", self.paid.is_some()),
            ("expiresAt", self.expires_at.is_some()),
            ("paymentIntentId", self.payment_intent_id.is_some()),
            ("checkoutSessionId", self.checkout_session_id.is_some()),
            ("createdAt", self.created_at.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }

    pub(crate) fn take_template_patches(&mut self) -> Vec<TemplatePatch> {
        let mut patches = Vec::new();
        if let Some(patch) = self.birthday.take() {
            patches.push(TemplatePatch::Birthday(patch));
        }
        if let Some(patch) = self.anniversary.take() {
            patches.push(TemplatePatch::Anniversary(patch));
        }
        if let Some(patch) = self.declaration.take() {
            patches.push(TemplatePatch::Declaration(patch));
        }
        patches
    }
}

/// Template text keyed by template name, e.g. `"birthday": {...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSection {
    Birthday(BirthdayText),
    Anniversary(AnniversaryText),
    Declaration(DeclarationText),
}

impl From<TemplateContent> for TemplateSection {
    fn from(content: TemplateContent) -> Self {
        match content {
            TemplateContent::Birthday(text) => TemplateSection::Birthday(text),
            TemplateContent::Anniversary(text) => TemplateSection::Anniversary(text),
            TemplateContent::Declaration(text) => TemplateSection::Declaration(text),
        }
    }
}

/// What anyone holding the share link may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSite {
    pub slug: String,
    pub template_type: TemplateType,
    pub title: String,
    pub message: String,
    pub special_date: Option<NaiveDate>,
    pub youtube_link: Option<String>,
    pub images: Vec<String>,
    #[serde(flatten)]
    pub template: TemplateSection,
    pub paid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<GiftSite> for PublicSite {
    fn from(site: GiftSite) -> Self {
        Self {
            slug: site.slug,
            template_type: site.template_type,
            title: site.title,
            message: site.message,
            special_date: site.special_date,
            youtube_link: site.youtube_link,
            images: site.images,
            template: site.template_content.0.into(),
            paid: site.paid,
            expires_at: site.expires_at,
            created_at: site.created_at,
        }
    }
}

/// What the edit page needs, for a caller that proved the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableSite {
    pub site_id: Uuid,
    pub slug: String,
    pub template_type: TemplateType,
    pub title: String,
    pub message: String,
    pub special_date: Option<NaiveDate>,
    pub youtube_link: Option<String>,
    pub images: Vec<String>,
    #[serde(flatten)]
    pub template: TemplateSection,
    pub customer_email: String,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GiftSite> for EditableSite {
    fn from(site: GiftSite) -> Self {
        Self {
            site_id: site.id,
            slug: site.slug,
            template_type: site.template_type,
            title: site.title,
            message: site.message,
            special_date: site.special_date,
            youtube_link: site.youtube_link,
            images: site.images,
            template: site.template_content.0.into(),
            customer_email: site.customer_email,
            paid: site.paid,
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditQuery {
    pub edit_credential: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSiteResponse {
    pub success: bool,
    pub site: EditableSite,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
}
