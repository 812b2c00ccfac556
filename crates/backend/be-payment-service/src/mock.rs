//! In-process stand-ins for Stripe and the wall clock, for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use be_email_service::{EmailError, Notifier, SiteReadyEmail};
use be_remote_db::{Clock, ProcessorRef};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PaymentFlow;
use crate::error::PaymentError;
use crate::types::{PaymentHandle, PaymentRequest, ProcessorEvent, ProcessorStatus};

pub const MOCK_SIGNATURE: &str = "mock-signature";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockEvent {
    #[serde(rename = "type")]
    event_type: String,
    site_id: Option<Uuid>,
    processor_ref: Option<ProcessorRef>,
}

/// Payment processor that records calls and answers from a status table.
#[derive(Debug)]
pub struct MockProcessor {
    flow: PaymentFlow,
    statuses: Mutex<HashMap<String, String>>,
    created: Mutex<Vec<PaymentRequest>>,
    status_checks: AtomicUsize,
    fail_create: AtomicBool,
    fail_status: AtomicBool,
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new(PaymentFlow::Intent)
    }
}

impl MockProcessor {
    pub fn new(flow: PaymentFlow) -> Self {
        Self {
            flow,
            statuses: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            status_checks: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
        }
    }

    /// `succeeded`/`paid` count as captured, `canceled`/`expired` as
    /// abandoned, anything else as still open.
    pub fn set_status(&self, processor_id: &str, status: &str) {
        self.statuses
            .lock()
            .insert(processor_id.to_string(), status.to_string());
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<PaymentRequest> {
        self.created.lock().clone()
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// A webhook payload and signature the mock accepts.
    pub fn succeeded_event(site_id: Option<Uuid>, processor_ref: ProcessorRef) -> (String, String) {
        let event_type = match processor_ref {
            ProcessorRef::PaymentIntent(_) => "payment_intent.succeeded",
            ProcessorRef::CheckoutSession(_) => "checkout.session.completed",
        };
        let payload = serde_json::to_string(&MockEvent {
            event_type: event_type.to_string(),
            site_id,
            processor_ref: Some(processor_ref),
        })
        .unwrap_or_default();
        (payload, MOCK_SIGNATURE.to_string())
    }

    pub fn other_event(event_type: &str) -> (String, String) {
        let payload = serde_json::to_string(&MockEvent {
            event_type: event_type.to_string(),
            site_id: None,
            processor_ref: None,
        })
        .unwrap_or_default();
        (payload, MOCK_SIGNATURE.to_string())
    }
}

fn mock_handle(processor_ref: ProcessorRef) -> PaymentHandle {
    let (client_secret, checkout_url) = match &processor_ref {
        ProcessorRef::PaymentIntent(id) => (Some(format!("{id}_secret")), None),
        ProcessorRef::CheckoutSession(id) => {
            (None, Some(format!("https://checkout.example.com/{id}")))
        }
    };
    PaymentHandle {
        processor_ref,
        client_secret,
        checkout_url,
    }
}

#[async_trait]
impl crate::processor::PaymentProcessor for MockProcessor {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PaymentError::Upstream("mock processor unavailable".into()));
        }

        let mut created = self.created.lock();
        created.push(request.clone());
        let n = created.len();

        Ok(mock_handle(match self.flow {
            PaymentFlow::Intent => ProcessorRef::PaymentIntent(format!("pi_mock_{n}")),
            PaymentFlow::Checkout => ProcessorRef::CheckoutSession(format!("cs_mock_{n}")),
        }))
    }

    async fn fetch_status(
        &self,
        processor_ref: &ProcessorRef,
    ) -> Result<ProcessorStatus, PaymentError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);

        if self.fail_status.load(Ordering::SeqCst) {
            return Err(PaymentError::Upstream("mock processor unavailable".into()));
        }

        let status = self
            .statuses
            .lock()
            .get(processor_ref.id())
            .cloned()
            .unwrap_or_else(|| "requires_payment_method".to_string());
        let succeeded = matches!(status.as_str(), "succeeded" | "paid");
        let abandoned = matches!(status.as_str(), "canceled" | "expired");

        Ok(ProcessorStatus {
            status,
            succeeded,
            abandoned,
            resume: (!succeeded && !abandoned).then(|| mock_handle(processor_ref.clone())),
        })
    }

    fn verify_event(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<ProcessorEvent, PaymentError> {
        if signature != MOCK_SIGNATURE {
            return Err(PaymentError::InvalidSignature);
        }

        let event: MockEvent =
            serde_json::from_str(payload).map_err(|_| PaymentError::InvalidSignature)?;

        Ok(match event.processor_ref {
            Some(processor_ref)
                if matches!(
                    event.event_type.as_str(),
                    "payment_intent.succeeded" | "checkout.session.completed"
                ) =>
            {
                ProcessorEvent::PaymentSucceeded {
                    site_id: event.site_id,
                    processor_ref,
                }
            }
            _ => ProcessorEvent::Ignored {
                event_type: event.event_type,
            },
        })
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Notifier that keeps every email it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SiteReadyEmail>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SiteReadyEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_site_ready(&self, email: &SiteReadyEmail) -> Result<(), EmailError> {
        self.sent.lock().push(email.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::Config("mock mailer down".into()));
        }
        Ok(())
    }
}
