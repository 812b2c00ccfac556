//! Non-persistent record store used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    error::{DbError, DbResult},
    store::SiteStore,
    types::{GiftSite, NewGiftSite, ProcessorRef, SiteContent},
};

#[derive(Debug, Default)]
pub struct MemorySiteStore {
    sites: RwLock<HashMap<Uuid, GiftSite>>,
}

impl MemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sites.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }
}

#[async_trait]
impl SiteStore for MemorySiteStore {
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }

    async fn insert_site(&self, site: NewGiftSite) -> DbResult<GiftSite> {
        let mut sites = self.sites.write();

        if sites.contains_key(&site.id) {
            return Err(DbError::duplicate("id", site.id.to_string()));
        }
        for existing in sites.values() {
            if existing.slug == site.slug {
                return Err(DbError::duplicate("slug", site.slug));
            }
            if existing.edit_credential == site.edit_credential {
                return Err(DbError::duplicate("edit_credential", "<redacted>"));
            }
        }

        let site = site.into_site();
        sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn slug_exists(&self, slug: &str) -> DbResult<bool> {
        Ok(self.sites.read().values().any(|site| site.slug == slug))
    }

    async fn get_site(&self, id: Uuid) -> DbResult<GiftSite> {
        self.sites
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found_with_id("gift site", id.to_string()))
    }

    async fn get_site_by_slug(&self, slug: &str) -> DbResult<GiftSite> {
        self.sites
            .read()
            .values()
            .find(|site| site.slug == slug)
            .cloned()
            .ok_or_else(|| DbError::not_found_with_id("gift site", slug))
    }

    async fn update_site_content(
        &self,
        id: Uuid,
        content: SiteContent,
        now: DateTime<Utc>,
    ) -> DbResult<GiftSite> {
        let mut sites = self.sites.write();
        let site = sites
            .get_mut(&id)
            .filter(|site| site.template_type == content.template.template_type())
            .ok_or_else(|| DbError::not_found_with_id("gift site", id.to_string()))?;

        site.title = content.title;
        site.message = content.message;
        site.special_date = content.special_date;
        site.youtube_link = content.youtube_link;
        site.images = content.images;
        site.template_content = Json(content.template);
        site.updated_at = now;

        Ok(site.clone())
    }

    async fn attach_processor_ref(
        &self,
        id: Uuid,
        processor_ref: &ProcessorRef,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut sites = self.sites.write();
        let site = sites
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found_with_id("gift site", id.to_string()))?;

        apply_processor_ref(site, processor_ref);
        site.updated_at = now;
        Ok(())
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        processor_ref: Option<&ProcessorRef>,
        now: DateTime<Utc>,
    ) -> DbResult<Option<GiftSite>> {
        let mut sites = self.sites.write();
        let site = sites
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found_with_id("gift site", id.to_string()))?;

        if site.paid {
            return Ok(None);
        }

        site.paid = true;
        site.expires_at = None;
        if let Some(processor_ref) = processor_ref {
            apply_processor_ref(site, processor_ref);
        }
        site.updated_at = now;

        Ok(Some(site.clone()))
    }

    async fn list_lapsed_unpaid(&self, now: DateTime<Utc>) -> DbResult<Vec<GiftSite>> {
        let mut lapsed: Vec<GiftSite> = self
            .sites
            .read()
            .values()
            .filter(|site| site.is_expired_at(now) && site.processor_ref().is_some())
            .cloned()
            .collect();
        lapsed.sort_by_key(|site| site.expires_at);
        Ok(lapsed)
    }

    async fn delete_site(&self, id: Uuid) -> DbResult<()> {
        self.sites
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DbError::not_found_with_id("gift site", id.to_string()))
    }
}

fn apply_processor_ref(site: &mut GiftSite, processor_ref: &ProcessorRef) {
    match processor_ref {
        ProcessorRef::PaymentIntent(id) => site.payment_intent_id = Some(id.clone()),
        ProcessorRef::CheckoutSession(id) => site.checkout_session_id = Some(id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::{TemplateContent, TemplateType};

    fn new_site(slug: &str, credential: &str, expires_at: DateTime<Utc>) -> NewGiftSite {
        NewGiftSite {
            id: Uuid::now_v7(),
            slug: slug.into(),
            edit_credential: credential.into(),
            title: "Title".into(),
            message: "Message".into(),
            special_date: None,
            youtube_link: None,
            images: vec![],
            template: TemplateContent::empty(TemplateType::Anniversary),
            customer_email: "buyer@example.com".into(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_slug_and_credential() {
        let store = MemorySiteStore::new();
        let expires = Utc::now() + Duration::hours(24);
        store
            .insert_site(new_site("slug0001", "cred-a", expires))
            .await
            .unwrap();

        let err = store
            .insert_site(new_site("slug0001", "cred-b", expires))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        let err = store
            .insert_site(new_site("slug0002", "cred-a", expires))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn mark_paid_only_promotes_once() {
        let store = MemorySiteStore::new();
        let site = store
            .insert_site(new_site("slug0001", "cred-a", Utc::now()))
            .await
            .unwrap();
        let processor_ref = ProcessorRef::PaymentIntent("pi_1".into());

        let first = store
            .mark_paid(site.id, Some(&processor_ref), Utc::now())
            .await
            .unwrap()
            .expect("first promotion");
        assert!(first.paid);
        assert!(first.expires_at.is_none());
        assert_eq!(first.payment_intent_id.as_deref(), Some("pi_1"));

        let second = store
            .mark_paid(site.id, Some(&processor_ref), Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn mark_paid_unknown_site_is_not_found() {
        let store = MemorySiteStore::new();
        let err = store
            .mark_paid(Uuid::now_v7(), None, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn lapsed_listing_requires_processor_ref() {
        let store = MemorySiteStore::new();
        let now = Utc::now();
        let past = now - Duration::hours(1);

        let without_ref = store
            .insert_site(new_site("noref001", "cred-a", past))
            .await
            .unwrap();
        let with_ref = store
            .insert_site(new_site("hasref01", "cred-b", past))
            .await
            .unwrap();
        store
            .insert_site(new_site("future01", "cred-c", now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .attach_processor_ref(with_ref.id, &ProcessorRef::CheckoutSession("cs_1".into()), now)
            .await
            .unwrap();

        let lapsed = store.list_lapsed_unpaid(now).await.unwrap();
        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].id, with_ref.id);
        assert_ne!(lapsed[0].id, without_ref.id);
    }

    #[tokio::test]
    async fn delete_removes_site() {
        let store = MemorySiteStore::new();
        let site = store
            .insert_site(new_site("slug0001", "cred-a", Utc::now()))
            .await
            .unwrap();

        store.delete_site(site.id).await.unwrap();
        assert!(store.get_site(site.id).await.unwrap_err().is_not_found());
        assert!(!store.slug_exists("slug0001").await.unwrap());
    }
}
