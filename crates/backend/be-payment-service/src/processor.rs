use std::collections::HashMap;

use async_trait::async_trait;
use be_remote_db::ProcessorRef;
use stripe::{ClientBuilder, RequestStrategy};
use stripe_checkout::CheckoutSessionMode;
use stripe_checkout::{CheckoutSessionPaymentStatus, CheckoutSessionStatus};
use stripe_checkout::checkout_session::{
    CreateCheckoutSession, CreateCheckoutSessionLineItems, RetrieveCheckoutSession,
};
use stripe_core::payment_intent::{CreatePaymentIntent, RetrievePaymentIntent};
use stripe_shared::PaymentIntentStatus;
use stripe_types::Currency;
use stripe_webhook::Webhook;
use tracing::debug;

use crate::config::{PaymentConfig, PaymentFlow};
use crate::error::PaymentError;
use crate::types::{PaymentHandle, PaymentRequest, ProcessorEvent, ProcessorStatus};
use crate::webhook;

pub const SITE_ID_METADATA_KEY: &str = "siteId";
pub const SLUG_METADATA_KEY: &str = "slug";

/// The external payment processor, as seen by the payment bridge.
#[async_trait]
pub trait PaymentProcessor: Send + Sync + 'static {
    async fn create_payment(&self, request: &PaymentRequest)
    -> Result<PaymentHandle, PaymentError>;

    async fn fetch_status(
        &self,
        processor_ref: &ProcessorRef,
    ) -> Result<ProcessorStatus, PaymentError>;

    /// Authenticates a webhook payload against the signing secret.
    fn verify_event(&self, payload: &str, signature: &str)
    -> Result<ProcessorEvent, PaymentError>;
}

pub(crate) fn correlation_metadata(request: &PaymentRequest) -> HashMap<String, String> {
    HashMap::from([
        (
            SITE_ID_METADATA_KEY.to_string(),
            request.site_id.to_string(),
        ),
        (SLUG_METADATA_KEY.to_string(), request.slug.clone()),
    ])
}

pub struct StripeProcessor {
    client: stripe::Client,
    config: PaymentConfig,
    currency: Currency,
}

impl StripeProcessor {
    pub fn new(config: PaymentConfig) -> Result<Self, PaymentError> {
        let client = ClientBuilder::new(&config.stripe_secret_key)
            .request_strategy(RequestStrategy::ExponentialBackoff(3))
            .build()
            .map_err(|e| PaymentError::Config(format!("Failed to build Stripe client: {e}")))?;

        Self::with_client(client, config)
    }

    pub fn with_client(client: stripe::Client, config: PaymentConfig) -> Result<Self, PaymentError> {
        let currency = config.currency.parse::<Currency>().map_err(|_| {
            PaymentError::Config(format!(
                "PAYMENT_CURRENCY '{}' is not a known currency",
                config.currency
            ))
        })?;

        Ok(Self {
            client,
            config,
            currency,
        })
    }

    async fn create_intent(&self, request: &PaymentRequest) -> Result<PaymentHandle, PaymentError> {
        let mut req = CreatePaymentIntent::new(self.config.amount_cents, self.currency.clone())
            .metadata(correlation_metadata(request))
            .description(format!("Gift site {}", request.slug));

        if let Some(ref email) = request.customer_email {
            req = req.receipt_email(email);
        }

        let intent = req.send(&self.client).await?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Upstream("payment intent has no client secret".into()))?;

        Ok(PaymentHandle {
            processor_ref: ProcessorRef::PaymentIntent(intent.id.to_string()),
            client_secret: Some(client_secret),
            checkout_url: None,
        })
    }

    async fn create_checkout(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        let price_id = self
            .config
            .price_id
            .clone()
            .ok_or_else(|| PaymentError::Config("STRIPE_PRICE_ID is not configured".into()))?;

        let line_items = vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price: Some(price_id),
            ..Default::default()
        }];

        // Double braces escape in format! to produce the literal {CHECKOUT_SESSION_ID}
        // that Stripe replaces with the actual session ID on redirect.
        let success_url = format!(
            "{}/payment/success?slug={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.config.site_base_url, request.slug
        );
        let cancel_url = format!("{}/create?canceled=1", self.config.site_base_url);

        let mut req = CreateCheckoutSession::new()
            .mode(CheckoutSessionMode::Payment)
            .line_items(line_items)
            .success_url(&success_url)
            .cancel_url(&cancel_url)
            .client_reference_id(request.site_id.to_string())
            .metadata(correlation_metadata(request));

        if let Some(ref email) = request.customer_email {
            req = req.customer_email(email);
        }

        let session = req.send(&self.client).await?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Upstream("checkout session has no URL".into()))?;

        Ok(PaymentHandle {
            processor_ref: ProcessorRef::CheckoutSession(session.id.to_string()),
            client_secret: None,
            checkout_url: Some(url),
        })
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        match self.config.flow {
            PaymentFlow::Intent => self.create_intent(request).await,
            PaymentFlow::Checkout => self.create_checkout(request).await,
        }
    }

    async fn fetch_status(
        &self,
        processor_ref: &ProcessorRef,
    ) -> Result<ProcessorStatus, PaymentError> {
        let status = match processor_ref {
            ProcessorRef::PaymentIntent(id) => {
                let intent = RetrievePaymentIntent::new(id.as_str())
                    .send(&self.client)
                    .await?;
                let succeeded = matches!(intent.status, PaymentIntentStatus::Succeeded);
                let abandoned = matches!(intent.status, PaymentIntentStatus::Canceled);
                ProcessorStatus {
                    status: intent.status.to_string(),
                    succeeded,
                    abandoned,
                    resume: intent
                        .client_secret
                        .filter(|_| !succeeded && !abandoned)
                        .map(|secret| PaymentHandle {
                            processor_ref: processor_ref.clone(),
                            client_secret: Some(secret),
                            checkout_url: None,
                        }),
                }
            }
            ProcessorRef::CheckoutSession(id) => {
                let session = RetrieveCheckoutSession::new(id.as_str())
                    .send(&self.client)
                    .await?;
                let open = matches!(session.status, Some(CheckoutSessionStatus::Open));
                ProcessorStatus {
                    status: session.payment_status.to_string(),
                    succeeded: matches!(
                        session.payment_status,
                        CheckoutSessionPaymentStatus::Paid
                    ),
                    abandoned: matches!(session.status, Some(CheckoutSessionStatus::Expired)),
                    resume: session.url.filter(|_| open).map(|url| PaymentHandle {
                        processor_ref: processor_ref.clone(),
                        client_secret: None,
                        checkout_url: Some(url),
                    }),
                }
            }
        };

        debug!(processor_id = %processor_ref.id(), status = %status.status, "Fetched processor status");
        Ok(status)
    }

    fn verify_event(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<ProcessorEvent, PaymentError> {
        let event = Webhook::construct_event(payload, signature, &self.config.stripe_webhook_secret)
            .map_err(|_| PaymentError::InvalidSignature)?;

        Ok(webhook::classify_event(event))
    }
}
