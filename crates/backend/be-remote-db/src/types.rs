use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type, types::Json};
use uuid::Uuid;

/// Maximum number of images a gift site may carry.
pub const MAX_IMAGES: usize = 5;

/// Maximum number of named items in any template list.
pub const MAX_NAMED_ITEMS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "template_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Birthday,
    Anniversary,
    Declaration,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateType::Birthday => write!(f, "birthday"),
            TemplateType::Anniversary => write!(f, "anniversary"),
            TemplateType::Declaration => write!(f, "declaration"),
        }
    }
}

/// A titled entry in one of the template lists (a wish, a milestone, a reason).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BirthdayText {
    pub heading: String,
    pub wishes_title: String,
    pub wishes: Vec<NamedItem>,
    pub closing_note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnniversaryText {
    pub heading: String,
    pub timeline_title: String,
    pub milestones: Vec<NamedItem>,
    pub closing_note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeclarationText {
    pub heading: String,
    pub reasons_title: String,
    pub reasons: Vec<NamedItem>,
    pub promise: String,
}

/// Template-specific text, tagged by the template it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "templateType", rename_all = "lowercase")]
pub enum TemplateContent {
    Birthday(BirthdayText),
    Anniversary(AnniversaryText),
    Declaration(DeclarationText),
}

impl TemplateContent {
    pub fn empty(template_type: TemplateType) -> Self {
        match template_type {
            TemplateType::Birthday => Self::Birthday(BirthdayText::default()),
            TemplateType::Anniversary => Self::Anniversary(AnniversaryText::default()),
            TemplateType::Declaration => Self::Declaration(DeclarationText::default()),
        }
    }

    pub fn template_type(&self) -> TemplateType {
        match self {
            Self::Birthday(_) => TemplateType::Birthday,
            Self::Anniversary(_) => TemplateType::Anniversary,
            Self::Declaration(_) => TemplateType::Declaration,
        }
    }

    pub fn items(&self) -> &[NamedItem] {
        match self {
            Self::Birthday(text) => &text.wishes,
            Self::Anniversary(text) => &text.milestones,
            Self::Declaration(text) => &text.reasons,
        }
    }
}

/// The payment processor's own reference for a site's payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ProcessorRef {
    PaymentIntent(String),
    CheckoutSession(String),
}

impl ProcessorRef {
    pub fn id(&self) -> &str {
        match self {
            Self::PaymentIntent(id) | Self::CheckoutSession(id) => id,
        }
    }

    fn payment_intent_id(&self) -> Option<&str> {
        match self {
            Self::PaymentIntent(id) => Some(id),
            Self::CheckoutSession(_) => None,
        }
    }

    fn checkout_session_id(&self) -> Option<&str> {
        match self {
            Self::CheckoutSession(id) => Some(id),
            Self::PaymentIntent(_) => None,
        }
    }

    pub(crate) fn columns(processor_ref: Option<&Self>) -> (Option<&str>, Option<&str>) {
        (
            processor_ref.and_then(Self::payment_intent_id),
            processor_ref.and_then(Self::checkout_session_id),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GiftSite {
    pub id: Uuid,
    pub slug: String,
    pub edit_credential: String,
    pub template_type: TemplateType,
    pub title: String,
    pub message: String,
    pub special_date: Option<NaiveDate>,
    pub youtube_link: Option<String>,
    pub images: Vec<String>,
    pub template_content: Json<TemplateContent>,
    pub customer_email: String,
    pub paid: bool,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GiftSite {
    /// Prefers the checkout session, which is what the sweep would query first.
    pub fn processor_ref(&self) -> Option<ProcessorRef> {
        match (&self.checkout_session_id, &self.payment_intent_id) {
            (Some(id), _) => Some(ProcessorRef::CheckoutSession(id.clone())),
            (None, Some(id)) => Some(ProcessorRef::PaymentIntent(id.clone())),
            (None, None) => None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.paid && self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewGiftSite {
    pub id: Uuid,
    pub slug: String,
    pub edit_credential: String,
    pub title: String,
    pub message: String,
    pub special_date: Option<NaiveDate>,
    pub youtube_link: Option<String>,
    pub images: Vec<String>,
    pub template: TemplateContent,
    pub customer_email: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewGiftSite {
    pub(crate) fn into_site(self) -> GiftSite {
        GiftSite {
            id: self.id,
            slug: self.slug,
            edit_credential: self.edit_credential,
            template_type: self.template.template_type(),
            title: self.title,
            message: self.message,
            special_date: self.special_date,
            youtube_link: self.youtube_link,
            images: self.images,
            template_content: Json(self.template),
            customer_email: self.customer_email,
            paid: false,
            payment_intent_id: None,
            checkout_session_id: None,
            expires_at: Some(self.expires_at),
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Editable content of a site; everything else is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteContent {
    pub title: String,
    pub message: String,
    pub special_date: Option<NaiveDate>,
    pub youtube_link: Option<String>,
    pub images: Vec<String>,
    pub template: TemplateContent,
}

impl From<&GiftSite> for SiteContent {
    fn from(site: &GiftSite) -> Self {
        Self {
            title: site.title.clone(),
            message: site.message.clone(),
            special_date: site.special_date,
            youtube_link: site.youtube_link.clone(),
            images: site.images.clone(),
            template: site.template_content.0.clone(),
        }
    }
}
