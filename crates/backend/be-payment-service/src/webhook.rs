//! Reduces verified Stripe events to the reconciliation events we act on.

use std::collections::HashMap;

use be_remote_db::ProcessorRef;
use stripe_checkout::CheckoutSessionPaymentStatus;
use stripe_webhook::{Event, EventObject};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::processor::SITE_ID_METADATA_KEY;
use crate::types::ProcessorEvent;

pub(crate) fn site_id_from_metadata(metadata: &HashMap<String, String>) -> Option<Uuid> {
    let raw = metadata.get(SITE_ID_METADATA_KEY)?;
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(site_id = %raw, error = %e, "Ignoring malformed siteId metadata");
            None
        }
    }
}

/// Maps a verified event to a [`ProcessorEvent`].
///
/// Handles `payment_intent.succeeded`, `checkout.session.completed` (only
/// once the session is paid) and `checkout.session.async_payment_succeeded`.
pub fn classify_event(event: Event) -> ProcessorEvent {
    let event_type = event.type_.to_string();

    match event.data.object {
        EventObject::PaymentIntentSucceeded(intent) => ProcessorEvent::PaymentSucceeded {
            site_id: site_id_from_metadata(&intent.metadata),
            processor_ref: ProcessorRef::PaymentIntent(intent.id.to_string()),
        },
        EventObject::CheckoutSessionCompleted(session)
            if matches!(session.payment_status, CheckoutSessionPaymentStatus::Paid) =>
        {
            let site_id = session
                .metadata
                .as_ref()
                .and_then(site_id_from_metadata)
                .or_else(|| {
                    session
                        .client_reference_id
                        .as_deref()
                        .and_then(|id| Uuid::parse_str(id).ok())
                });
            ProcessorEvent::PaymentSucceeded {
                site_id,
                processor_ref: ProcessorRef::CheckoutSession(session.id.to_string()),
            }
        }
        EventObject::CheckoutSessionAsyncPaymentSucceeded(session) => {
            ProcessorEvent::PaymentSucceeded {
                site_id: session.metadata.as_ref().and_then(site_id_from_metadata),
                processor_ref: ProcessorRef::CheckoutSession(session.id.to_string()),
            }
        }
        _ => {
            debug!(%event_type, "Webhook event not relevant to reconciliation");
            ProcessorEvent::Ignored { event_type }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_site_id_from_metadata() {
        let site_id = Uuid::now_v7();
        let metadata = HashMap::from([
            ("siteId".to_string(), site_id.to_string()),
            ("slug".to_string(), "abcd1234".to_string()),
        ]);
        assert_eq!(site_id_from_metadata(&metadata), Some(site_id));
    }

    #[test]
    fn malformed_or_missing_site_id_is_none() {
        let metadata = HashMap::from([("siteId".to_string(), "not-a-uuid".to_string())]);
        assert_eq!(site_id_from_metadata(&metadata), None);
        assert_eq!(site_id_from_metadata(&HashMap::new()), None);
    }
}
