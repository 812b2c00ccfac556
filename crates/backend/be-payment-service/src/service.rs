use std::sync::Arc;

use be_email_service::Notifier;
use be_remote_db::SiteStore;

use crate::bridge::PaymentBridge;
use crate::config::PaymentConfig;
use crate::error::PaymentError;
use crate::processor::StripeProcessor;

pub struct AppState {
    pub bridge: Arc<PaymentBridge>,
    pub config: PaymentConfig,
}

impl AppState {
    pub fn new(bridge: Arc<PaymentBridge>) -> Self {
        let config = bridge.config().clone();
        Self { bridge, config }
    }

    /// Wires a Stripe-backed bridge from the environment.
    pub fn from_env(
        store: Arc<dyn SiteStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PaymentError> {
        let config = PaymentConfig::from_env()?;
        let processor = Arc::new(StripeProcessor::new(config.clone())?);

        let bridge = PaymentBridge::builder()
            .store(store)
            .processor(processor)
            .notifier(notifier)
            .config(config)
            .build();

        Ok(Self::new(Arc::new(bridge)))
    }
}
