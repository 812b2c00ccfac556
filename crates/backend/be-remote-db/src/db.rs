use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use bon::bon;
use chrono::{DateTime, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
    types::Json,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{DbError, DbResult},
    store::SiteStore,
    types::{GiftSite, NewGiftSite, ProcessorRef, SiteContent},
};

const SITE_COLUMNS: &str = "id, slug, edit_credential, template_type, title, message, special_date, \
     youtube_link, images, template_content, customer_email, paid, payment_intent_id, \
     checkout_session_id, expires_at, created_at, updated_at";

const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Postgres-backed record store.
///
/// The pool validates a connection before handing it out and replaces
/// broken ones, so callers never hold a stale handle.
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pub pool: PgPool,
}

#[bon]
impl DatabaseManager {
    #[builder]
    pub async fn connect(
        database_url: &str,
        #[builder(default = 20)] max_connections: u32,
        #[builder(default = Duration::from_secs(10))] acquire_timeout: Duration,
        #[builder(default = DEFAULT_STATEMENT_TIMEOUT)] statement_timeout: Duration,
    ) -> DbResult<Self> {
        if !sqlx::Postgres::database_exists(database_url).await? {
            sqlx::Postgres::create_database(database_url).await?;
        }

        let statement_timeout_ms = statement_timeout.as_millis().to_string();
        let options = PgConnectOptions::from_str(database_url)?
            .options([("statement_timeout", statement_timeout_ms.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        let db_manager = DatabaseManager { pool };

        Self::run_migrations(&db_manager.pool).await?;
        info!("Connected to gift site database");

        Ok(db_manager)
    }

    async fn run_migrations(pool: &PgPool) -> DbResult<()> {
        let migrator = sqlx::migrate!("./src/migrations");
        migrator.run(pool).await?;
        Ok(())
    }

    async fn fetch_site(&self, clause: &str, value: &str) -> DbResult<GiftSite> {
        let query = format!("SELECT {SITE_COLUMNS} FROM gift_sites WHERE {clause}");

        sqlx::query_as::<_, GiftSite>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found_with_id("gift site", value))
    }
}

#[async_trait]
impl SiteStore for DatabaseManager {
    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_site(&self, site: NewGiftSite) -> DbResult<GiftSite> {
        let template_type = site.template.template_type();
        let query = format!(
            r#"
            INSERT INTO gift_sites (
                id, slug, edit_credential, template_type, title, message, special_date,
                youtube_link, images, template_content, customer_email, paid,
                expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE, $12, $13, $13)
            RETURNING {SITE_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, GiftSite>(&query)
            .bind(site.id)
            .bind(&site.slug)
            .bind(&site.edit_credential)
            .bind(template_type)
            .bind(&site.title)
            .bind(&site.message)
            .bind(site.special_date)
            .bind(&site.youtube_link)
            .bind(&site.images)
            .bind(Json(&site.template))
            .bind(&site.customer_email)
            .bind(site.expires_at)
            .bind(site.created_at)
            .fetch_one(&self.pool)
            .await?;

        debug!(site_id = %inserted.id, slug = %inserted.slug, "Inserted gift site");

        Ok(inserted)
    }

    async fn slug_exists(&self, slug: &str) -> DbResult<bool> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM gift_sites WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0 > 0)
    }

    async fn get_site(&self, id: Uuid) -> DbResult<GiftSite> {
        self.fetch_site("id = $1::uuid", &id.to_string()).await
    }

    async fn get_site_by_slug(&self, slug: &str) -> DbResult<GiftSite> {
        self.fetch_site("slug = $1", slug).await
    }

    async fn update_site_content(
        &self,
        id: Uuid,
        content: SiteContent,
        now: DateTime<Utc>,
    ) -> DbResult<GiftSite> {
        let query = format!(
            r#"
            UPDATE gift_sites
            SET title = $2, message = $3, special_date = $4, youtube_link = $5,
                images = $6, template_content = $7, updated_at = $8
            WHERE id = $1 AND template_type = $9
            RETURNING {SITE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, GiftSite>(&query)
            .bind(id)
            .bind(&content.title)
            .bind(&content.message)
            .bind(content.special_date)
            .bind(&content.youtube_link)
            .bind(&content.images)
            .bind(Json(&content.template))
            .bind(now)
            .bind(content.template.template_type())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found_with_id("gift site", id.to_string()))
    }

    async fn attach_processor_ref(
        &self,
        id: Uuid,
        processor_ref: &ProcessorRef,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let (payment_intent_id, checkout_session_id) = ProcessorRef::columns(Some(processor_ref));

        let result = sqlx::query(
            r#"
            UPDATE gift_sites
            SET payment_intent_id = COALESCE($2, payment_intent_id),
                checkout_session_id = COALESCE($3, checkout_session_id),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(payment_intent_id)
        .bind(checkout_session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found_with_id("gift site", id.to_string()));
        }

        Ok(())
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        processor_ref: Option<&ProcessorRef>,
        now: DateTime<Utc>,
    ) -> DbResult<Option<GiftSite>> {
        let (payment_intent_id, checkout_session_id) = ProcessorRef::columns(processor_ref);
        let query = format!(
            r#"
            UPDATE gift_sites
            SET paid = TRUE,
                expires_at = NULL,
                payment_intent_id = COALESCE($2, payment_intent_id),
                checkout_session_id = COALESCE($3, checkout_session_id),
                updated_at = $4
            WHERE id = $1 AND paid = FALSE
            RETURNING {SITE_COLUMNS}
            "#
        );

        let promoted = sqlx::query_as::<_, GiftSite>(&query)
            .bind(id)
            .bind(payment_intent_id)
            .bind(checkout_session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        if promoted.is_none() && !self.site_id_exists(id).await? {
            return Err(DbError::not_found_with_id("gift site", id.to_string()));
        }

        Ok(promoted)
    }

    async fn list_lapsed_unpaid(&self, now: DateTime<Utc>) -> DbResult<Vec<GiftSite>> {
        let query = format!(
            r#"
            SELECT {SITE_COLUMNS}
            FROM gift_sites
            WHERE paid = FALSE
              AND expires_at IS NOT NULL
              AND expires_at <= $1
              AND (payment_intent_id IS NOT NULL OR checkout_session_id IS NOT NULL)
            ORDER BY expires_at ASC
            "#
        );

        let sites = sqlx::query_as::<_, GiftSite>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(sites)
    }

    async fn delete_site(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM gift_sites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found_with_id("gift site", id.to_string()));
        }

        Ok(())
    }
}

impl DatabaseManager {
    async fn site_id_exists(&self, id: Uuid) -> DbResult<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM gift_sites WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0 > 0)
    }
}
