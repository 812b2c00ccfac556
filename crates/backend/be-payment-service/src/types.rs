use be_remote_db::ProcessorRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the processor needs to open a payment for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub site_id: Uuid,
    pub slug: String,
    pub customer_email: Option<String>,
}

/// Client-usable handle for a freshly created payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    pub processor_ref: ProcessorRef,
    pub client_secret: Option<String>,
    pub checkout_url: Option<String>,
}

/// Live status reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorStatus {
    pub status: String,
    pub succeeded: bool,
    /// The payment can no longer be paid (canceled intent, expired session).
    pub abandoned: bool,
    /// Handle the customer can still complete, while the payment is open.
    pub resume: Option<PaymentHandle>,
}

/// A verified webhook event, reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    PaymentSucceeded {
        site_id: Option<Uuid>,
        processor_ref: ProcessorRef,
    },
    Ignored {
        event_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStart {
    pub site_id: Uuid,
    pub slug: String,
    /// `None` when the site was already paid and no payment was created.
    pub handle: Option<PaymentHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Promoted,
    AlreadyPaid,
    UnknownSite,
    MissingSiteId,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepEntry {
    pub slug: String,
    pub processor_status: String,
    pub recovered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub checked: usize,
    pub recovered: usize,
    pub results: Vec<SweepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPaymentRequest {
    pub site_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPaymentResponse {
    pub success: bool,
    pub site_id: Uuid,
    pub slug: String,
    pub already_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

impl From<PaymentStart> for StartPaymentResponse {
    fn from(start: PaymentStart) -> Self {
        let (client_secret, checkout_url) = start
            .handle
            .as_ref()
            .map(|h| (h.client_secret.clone(), h.checkout_url.clone()))
            .unwrap_or_default();

        Self {
            success: true,
            site_id: start.site_id,
            slug: start.slug,
            already_paid: start.handle.is_none(),
            client_secret,
            checkout_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: ReconcileOutcome,
}
