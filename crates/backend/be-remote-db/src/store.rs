use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::DbResult,
    types::{GiftSite, NewGiftSite, ProcessorRef, SiteContent},
};

/// Persistence for gift site records.
///
/// Implementations must reject a second record with the same `slug` or
/// `edit_credential` with [`DbError::Duplicate`](crate::DbError::Duplicate).
#[async_trait]
pub trait SiteStore: Send + Sync + 'static {
    /// Checks the store is reachable.
    async fn ping(&self) -> DbResult<()>;

    async fn insert_site(&self, site: NewGiftSite) -> DbResult<GiftSite>;

    async fn slug_exists(&self, slug: &str) -> DbResult<bool>;

    async fn get_site(&self, id: Uuid) -> DbResult<GiftSite>;

    async fn get_site_by_slug(&self, slug: &str) -> DbResult<GiftSite>;

    async fn update_site_content(
        &self,
        id: Uuid,
        content: SiteContent,
        now: DateTime<Utc>,
    ) -> DbResult<GiftSite>;

    async fn attach_processor_ref(
        &self,
        id: Uuid,
        processor_ref: &ProcessorRef,
        now: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Promotes an unpaid site to paid and clears its expiry.
    ///
    /// Returns `None` when the site was already paid, so only the first
    /// caller observes the promotion.
    async fn mark_paid(
        &self,
        id: Uuid,
        processor_ref: Option<&ProcessorRef>,
        now: DateTime<Utc>,
    ) -> DbResult<Option<GiftSite>>;

    /// Unpaid sites past their expiry that carry a processor reference.
    async fn list_lapsed_unpaid(&self, now: DateTime<Utc>) -> DbResult<Vec<GiftSite>>;

    async fn delete_site(&self, id: Uuid) -> DbResult<()>;
}
