use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use be_email_service::Notifier;
use be_remote_db::SiteStore;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

pub mod analytics;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod processor;
pub mod service;
pub mod types;
pub mod webhook;

use service::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let start_governor = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let start_route = Router::new()
        .route("/payment/start", post(handlers::start_payment))
        .layer(GovernorLayer::new(Arc::new(start_governor)));

    let webhook_route = Router::new().route("/payment/webhook", post(handlers::handle_webhook));

    let cron_route = Router::new().route(
        "/cron/reconcile",
        get(handlers::reconcile_expired).post(handlers::reconcile_expired),
    );

    start_route
        .merge(webhook_route)
        .merge(cron_route)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the Stripe-backed payment bridge and its routes.
pub fn init_payment_service(
    store: Arc<dyn SiteStore>,
    notifier: Arc<dyn Notifier>,
) -> Result<(Arc<bridge::PaymentBridge>, Router)> {
    debug!("Initializing payment service");

    let state = Arc::new(
        AppState::from_env(store, notifier).context("Failed to create payment service state")?,
    );

    Ok((state.bridge.clone(), create_router(state)))
}

pub use bridge::{PaymentBridge, Promotion};
pub use config::{PaymentConfig, PaymentFlow};
pub use error::PaymentError;
pub use processor::{PaymentProcessor, StripeProcessor};
pub use types::{
    PaymentHandle, PaymentStart, ReconcileOutcome, StartPaymentResponse, SweepEntry, SweepReport,
};
