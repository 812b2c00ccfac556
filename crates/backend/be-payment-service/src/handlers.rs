use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use tracing::info;

use crate::auth::CronAuth;
use crate::error::PaymentError;
use crate::service::AppState;
use crate::types::{StartPaymentRequest, StartPaymentResponse, SweepReport, WebhookAck};

// ---------------------------------------------------------------------------
// POST /payment/start
// ---------------------------------------------------------------------------

/// Opens (or re-opens) a payment for an existing unpaid site.
pub async fn start_payment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartPaymentRequest>,
) -> Result<Json<StartPaymentResponse>, PaymentError> {
    let start = state.bridge.start_payment(body.site_id).await?;
    Ok(Json(start.into()))
}

// ---------------------------------------------------------------------------
// POST /payment/webhook
// ---------------------------------------------------------------------------

/// Handles incoming Stripe webhook events with signature verification.
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, PaymentError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(PaymentError::InvalidSignature)?;

    let outcome = state.bridge.reconcile(&body, signature).await?;

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}

// ---------------------------------------------------------------------------
// GET|POST /cron/reconcile
// ---------------------------------------------------------------------------

/// Checks lapsed unpaid sites against the processor and promotes any that
/// were paid but never heard about.
pub async fn reconcile_expired(
    _auth: CronAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepReport>, PaymentError> {
    let report = state.bridge.sweep_expired().await?;
    info!(
        checked = report.checked,
        recovered = report.recovered,
        "Scheduled reconciliation complete"
    );
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use be_email_service::LoggingNotifier;
    use be_remote_db::{MemorySiteStore, NewGiftSite, SiteStore, TemplateContent, TemplateType};
    use chrono::{Duration, Utc};
    use stripe_webhook::Webhook;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::bridge::PaymentBridge;
    use crate::config::test_config;
    use crate::mock::MockProcessor;
    use crate::processor::StripeProcessor;

    fn stripe_state() -> Arc<AppState> {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let config = test_config();
        let client = stripe::Client::new(&config.stripe_secret_key);
        let processor = StripeProcessor::with_client(client, config.clone()).unwrap();
        let bridge = PaymentBridge::builder()
            .store(Arc::new(MemorySiteStore::new()))
            .processor(Arc::new(processor))
            .notifier(Arc::new(LoggingNotifier))
            .config(config)
            .build();
        Arc::new(AppState::new(Arc::new(bridge)))
    }

    fn mock_state(store: Arc<MemorySiteStore>) -> Arc<AppState> {
        let bridge = PaymentBridge::builder()
            .store(store)
            .processor(Arc::new(MockProcessor::default()))
            .notifier(Arc::new(LoggingNotifier))
            .config(test_config())
            .build();
        Arc::new(AppState::new(Arc::new(bridge)))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn webhook_rejects_missing_signature() {
        let app = crate::create_router(stripe_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payment/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature() {
        let app = crate::create_router(stripe_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payment/webhook")
                    .header("content-type", "application/json")
                    .header("stripe-signature", "t=123,v1=badsig")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_accepts_valid_signature() {
        let state = stripe_state();
        let secret = state.config.stripe_webhook_secret.clone();
        let app = crate::create_router(state);

        let payload = serde_json::json!({
            "id": "evt_test",
            "object": "event",
            "api_version": "2017-05-25",
            "created": 1533204620,
            "livemode": false,
            "pending_webhooks": 1,
            "data": {
                "object": {
                    "object": "bank_account",
                    "country": "us",
                    "currency": "usd",
                    "id": "ba_test",
                    "last4": "6789",
                    "status": "verified"
                }
            },
            "type": "account.external_account.created"
        })
        .to_string();

        let sig = Webhook::generate_test_header(&payload, &secret, None);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payment/webhook")
                    .header("content-type", "application/json")
                    .header("stripe-signature", sig)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["received"], true);
        assert_eq!(body["outcome"], "ignored");
    }

    #[tokio::test]
    async fn start_payment_returns_client_secret() {
        let store = Arc::new(MemorySiteStore::new());
        let now = Utc::now();
        let site = store
            .insert_site(NewGiftSite {
                id: Uuid::now_v7(),
                slug: "abcd1234".into(),
                edit_credential: "0".repeat(32),
                title: "Sarah's Day".into(),
                message: "Happy birthday".into(),
                special_date: None,
                youtube_link: None,
                images: vec![],
                template: TemplateContent::empty(TemplateType::Birthday),
                customer_email: "buyer@example.com".into(),
                expires_at: now + Duration::hours(24),
                created_at: now,
            })
            .await
            .unwrap();
        let app = crate::create_router(mock_state(store));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payment/start")
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "127.0.0.1")
                    .body(Body::from(
                        serde_json::json!({ "siteId": site.id }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["slug"], "abcd1234");
        assert_eq!(body["alreadyPaid"], false);
        assert_eq!(body["clientSecret"], "pi_mock_1_secret");
    }

    #[tokio::test]
    async fn start_payment_unknown_site_is_404() {
        let app = crate::create_router(mock_state(Arc::new(MemorySiteStore::new())));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payment/start")
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "127.0.0.1")
                    .body(Body::from(
                        serde_json::json!({ "siteId": Uuid::now_v7() }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cron_requires_secret() {
        let app = crate::create_router(mock_state(Arc::new(MemorySiteStore::new())));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cron/reconcile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cron/reconcile")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/cron/reconcile")
                    .header("authorization", "Bearer cron-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["checked"], 0);
        assert_eq!(body["recovered"], 0);
    }
}
