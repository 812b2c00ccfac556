//! Payment bridge: opens payments for gift sites and reconciles processor
//! state back into the record store.
//!
//! Promotion to paid is a conditional write on `paid = false`, so the webhook,
//! the sweep and the read path can all race on the same site and only the
//! first one promotes it (and sends the notification).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use be_email_service::{Notifier, SiteReadyEmail};
use be_remote_db::{Clock, GiftSite, ProcessorRef, SiteStore, SystemClock};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::analytics;
use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::processor::PaymentProcessor;
use crate::types::{
    PaymentHandle, PaymentRequest, PaymentStart, ProcessorEvent, ReconcileOutcome, SweepEntry,
    SweepReport,
};

const SWEEP_CONCURRENCY: usize = 4;
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
/// Minimum time between two read-path status checks of the same site.
const READ_RECHECK_SECS: i64 = 60;

/// Result of attempting to promote one site.
#[derive(Debug, Clone)]
pub enum Promotion {
    Promoted(GiftSite),
    AlreadyPaid,
}

#[derive(bon::Builder)]
pub struct PaymentBridge {
    store: Arc<dyn SiteStore>,
    processor: Arc<dyn PaymentProcessor>,
    notifier: Arc<dyn Notifier>,
    config: PaymentConfig,
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    clock: Arc<dyn Clock>,
    /// When each site last had a read-path status check.
    #[builder(skip)]
    read_checks: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl PaymentBridge {
    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = Result<T, PaymentError>>,
    ) -> Result<T, PaymentError> {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| PaymentError::Timeout(what))?
    }

    /// Opens a payment for `site_id`, or returns straight away if the site
    /// is already paid.
    #[instrument(skip(self))]
    pub async fn start_payment(&self, site_id: Uuid) -> Result<PaymentStart, PaymentError> {
        let site = self.store.get_site(site_id).await?;

        if site.paid {
            debug!(slug = %site.slug, "Site already paid, not creating a payment");
            return Ok(PaymentStart {
                site_id,
                slug: site.slug,
                handle: None,
            });
        }

        // The stored processor id is the one the sweep checks; it is only
        // replaced once the processor has given up on that payment.
        if let Some(existing) = site.processor_ref() {
            let status = self
                .bounded("payment status", self.processor.fetch_status(&existing))
                .await
                .inspect_err(|e| analytics::track_payment_start_failed(error_kind(e)))?;

            if status.succeeded {
                self.promote(site_id, Some(&existing), "start").await?;
                return Ok(PaymentStart {
                    site_id,
                    slug: site.slug,
                    handle: None,
                });
            }

            if !status.abandoned {
                debug!(
                    slug = %site.slug,
                    processor_id = %existing.id(),
                    status = %status.status,
                    "Resuming open payment"
                );
                let handle = status.resume.unwrap_or(PaymentHandle {
                    processor_ref: existing,
                    client_secret: None,
                    checkout_url: None,
                });
                return Ok(PaymentStart {
                    site_id,
                    slug: site.slug,
                    handle: Some(handle),
                });
            }

            debug!(slug = %site.slug, processor_id = %existing.id(), "Previous payment abandoned");
        }

        let request = PaymentRequest {
            site_id,
            slug: site.slug.clone(),
            customer_email: Some(site.customer_email.clone()).filter(|e| !e.is_empty()),
        };

        let handle = match self
            .bounded("payment creation", self.processor.create_payment(&request))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                analytics::track_payment_start_failed(error_kind(&e));
                return Err(e);
            }
        };

        // The processor keeps its own record of the payment, and the metadata
        // carries the site id, so a failed write here is recoverable.
        if let Err(e) = self
            .store
            .attach_processor_ref(site_id, &handle.processor_ref, self.clock.now())
            .await
        {
            warn!(
                error = %e,
                processor_id = %handle.processor_ref.id(),
                "Failed to attach processor id to site"
            );
        }

        info!(slug = %site.slug, processor_id = %handle.processor_ref.id(), "Payment started");
        analytics::track_payment_started(match handle.processor_ref {
            ProcessorRef::PaymentIntent(_) => "intent",
            ProcessorRef::CheckoutSession(_) => "checkout",
        });

        Ok(PaymentStart {
            site_id,
            slug: site.slug,
            handle: Some(handle),
        })
    }

    /// Webhook entry point. Fails closed on a bad signature.
    pub async fn reconcile(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let event = self.processor.verify_event(payload, signature)?;

        let (site_id, processor_ref) = match event {
            ProcessorEvent::Ignored { event_type } => {
                debug!(%event_type, "Ignoring webhook event");
                return Ok(ReconcileOutcome::Ignored);
            }
            ProcessorEvent::PaymentSucceeded {
                site_id: None,
                processor_ref,
            } => {
                warn!(
                    processor_id = %processor_ref.id(),
                    "Payment succeeded without siteId metadata"
                );
                return Ok(ReconcileOutcome::MissingSiteId);
            }
            ProcessorEvent::PaymentSucceeded {
                site_id: Some(site_id),
                processor_ref,
            } => (site_id, processor_ref),
        };

        match self.promote(site_id, Some(&processor_ref), "webhook").await {
            Ok(Promotion::Promoted(_)) => Ok(ReconcileOutcome::Promoted),
            Ok(Promotion::AlreadyPaid) => Ok(ReconcileOutcome::AlreadyPaid),
            Err(e) if e.is_not_found() => {
                warn!(%site_id, processor_id = %processor_ref.id(), "Payment for unknown site");
                Ok(ReconcileOutcome::UnknownSite)
            }
            Err(e) => Err(e),
        }
    }

    /// Marks the site paid and, on the first promotion only, sends the
    /// customer their links.
    pub async fn promote(
        &self,
        site_id: Uuid,
        processor_ref: Option<&ProcessorRef>,
        source: &'static str,
    ) -> Result<Promotion, PaymentError> {
        match self
            .store
            .mark_paid(site_id, processor_ref, self.clock.now())
            .await?
        {
            Some(site) => {
                info!(slug = %site.slug, %source, "Site promoted to paid");
                analytics::track_site_promoted(source);
                self.notify_site_ready(&site).await;
                Ok(Promotion::Promoted(site))
            }
            None => {
                debug!(%site_id, %source, "Site already paid, promotion skipped");
                Ok(Promotion::AlreadyPaid)
            }
        }
    }

    async fn notify_site_ready(&self, site: &GiftSite) {
        let email = SiteReadyEmail {
            to: site.customer_email.clone(),
            site_title: site.title.clone(),
            share_url: self.config.share_url(&site.slug),
            edit_url: self.config.edit_url(&site.slug, &site.edit_credential),
        };

        match tokio::time::timeout(NOTIFY_TIMEOUT, self.notifier.send_site_ready(&email)).await {
            Ok(Ok(())) => debug!(slug = %site.slug, "Site ready email sent"),
            Ok(Err(e)) => warn!(slug = %site.slug, error = %e, "Failed to send site ready email"),
            Err(_) => warn!(slug = %site.slug, "Site ready email timed out"),
        }
    }

    /// Asks the processor about one site and promotes it if it has paid.
    /// Returns the processor status and `None` when the payment is not
    /// captured yet.
    async fn check_and_promote(
        &self,
        site: &GiftSite,
        processor_ref: &ProcessorRef,
        source: &'static str,
    ) -> Result<(String, Option<Promotion>), PaymentError> {
        let status = self
            .bounded("payment status", self.processor.fetch_status(processor_ref))
            .await?;

        if !status.succeeded {
            debug!(slug = %site.slug, status = %status.status, "Payment not captured");
            return Ok((status.status, None));
        }

        let promotion = self.promote(site.id, Some(processor_ref), source).await?;
        Ok((status.status, Some(promotion)))
    }

    /// Reconciliation backstop for missed webhooks.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<SweepReport, PaymentError> {
        let lapsed = self.store.list_lapsed_unpaid(self.clock.now()).await?;
        let checked = lapsed.len();

        let results: Vec<SweepEntry> = futures::stream::iter(lapsed)
            .map(|site| async move { self.sweep_one(&site).await })
            .buffered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        let recovered = results.iter().filter(|entry| entry.recovered).count();

        info!(checked, recovered, "Reconciliation sweep finished");
        analytics::track_sweep_completed(checked, recovered);

        Ok(SweepReport {
            checked,
            recovered,
            results,
        })
    }

    async fn sweep_one(&self, site: &GiftSite) -> SweepEntry {
        let Some(processor_ref) = site.processor_ref() else {
            return SweepEntry {
                slug: site.slug.clone(),
                processor_status: "no_processor_id".to_string(),
                recovered: false,
            };
        };

        match self.check_and_promote(site, &processor_ref, "sweep").await {
            Ok((processor_status, promotion)) => SweepEntry {
                slug: site.slug.clone(),
                processor_status,
                recovered: matches!(promotion, Some(Promotion::Promoted(_))),
            },
            Err(e) => {
                warn!(slug = %site.slug, error = %e, "Sweep could not check site");
                SweepEntry {
                    slug: site.slug.clone(),
                    processor_status: format!("error: {}", error_kind(&e)),
                    recovered: false,
                }
            }
        }
    }

    /// Read-path reconciliation: an expired site with a processor id gets its
    /// live status checked before the caller decides it has lapsed.
    pub async fn refresh_site(&self, site: GiftSite) -> Result<GiftSite, PaymentError> {
        if !site.is_expired_at(self.clock.now()) {
            return Ok(site);
        }
        let Some(processor_ref) = site.processor_ref() else {
            return Ok(site);
        };
        if !self.claim_read_check(site.id) {
            debug!(slug = %site.slug, "Payment checked recently, skipping read-path check");
            return Ok(site);
        }

        match self.check_and_promote(&site, &processor_ref, "read").await? {
            (_, Some(Promotion::Promoted(promoted))) => Ok(promoted),
            // Someone else promoted it between our read and the status check.
            (_, Some(Promotion::AlreadyPaid)) => Ok(self.store.get_site(site.id).await?),
            (_, None) => Ok(site),
        }
    }

    /// Whether a read may ask the processor about `site_id` now. Claims the
    /// window for this caller when it may.
    fn claim_read_check(&self, site_id: Uuid) -> bool {
        let now = self.clock.now();
        let window = chrono::Duration::seconds(READ_RECHECK_SECS);

        let mut checks = self.read_checks.lock();
        checks.retain(|_, checked_at| now - *checked_at < window);
        if checks.contains_key(&site_id) {
            return false;
        }
        checks.insert(site_id, now);
        true
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn error_kind(e: &PaymentError) -> &'static str {
    match e {
        PaymentError::Stripe(_) => "stripe",
        PaymentError::Upstream(_) => "upstream",
        PaymentError::Timeout(_) => "timeout",
        PaymentError::NotFound(_) => "not_found",
        PaymentError::Database(_) => "database",
        _ => "internal",
    }
}
