use std::time::Duration;

use axum::http::HeaderValue;

use crate::error::PaymentError;

const DEFAULT_AMOUNT_CENTS: i64 = 499;
const DEFAULT_CURRENCY: &str = "eur";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How the customer pays: an embedded payment intent confirmed client-side,
/// or a redirect to a hosted checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFlow {
    Intent,
    Checkout,
}

impl std::str::FromStr for PaymentFlow {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intent" | "payment_intent" => Ok(Self::Intent),
            "checkout" | "checkout_session" => Ok(Self::Checkout),
            other => Err(PaymentError::Config(format!(
                "PAYMENT_FLOW '{other}' is not supported, use 'intent' or 'checkout'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub site_base_url: String,
    pub cron_secret: String,
    pub flow: PaymentFlow,
    pub price_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub request_timeout: Duration,
}

fn required(name: &str) -> Result<String, PaymentError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PaymentError::Config(format!("{name} environment variable must be set")))
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, PaymentError> {
        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;
        let stripe_webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;
        let site_base_url = required("SITE_BASE_URL")?
            .trim_end_matches('/')
            .to_string();
        let cron_secret = required("CRON_SECRET")?;

        let flow = std::env::var("PAYMENT_FLOW")
            .unwrap_or_else(|_| "intent".to_string())
            .parse::<PaymentFlow>()?;

        let price_id = std::env::var("STRIPE_PRICE_ID")
            .ok()
            .filter(|v| !v.is_empty());

        let amount_cents = match std::env::var("PAYMENT_AMOUNT_CENTS") {
            Ok(raw) => raw.parse::<i64>().map_err(|e| {
                PaymentError::Config(format!("PAYMENT_AMOUNT_CENTS '{raw}' is not a number: {e}"))
            })?,
            Err(_) => DEFAULT_AMOUNT_CENTS,
        };

        let currency = std::env::var("PAYMENT_CURRENCY")
            .unwrap_or_else(|_| DEFAULT_CURRENCY.to_string())
            .to_lowercase();

        let config = Self {
            stripe_secret_key,
            stripe_webhook_secret,
            site_base_url,
            cron_secret,
            flow,
            price_id,
            amount_cents,
            currency,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PaymentError> {
        HeaderValue::from_str(&self.site_base_url).map_err(|e| {
            PaymentError::Config(format!(
                "SITE_BASE_URL '{}' is not a valid header value: {e}",
                self.site_base_url
            ))
        })?;

        if self.flow == PaymentFlow::Checkout && self.price_id.is_none() {
            return Err(PaymentError::Config(
                "STRIPE_PRICE_ID must be set when PAYMENT_FLOW is 'checkout'".into(),
            ));
        }

        if self.amount_cents <= 0 {
            return Err(PaymentError::Config(
                "PAYMENT_AMOUNT_CENTS must be positive".into(),
            ));
        }

        Ok(())
    }

    pub fn share_url(&self, slug: &str) -> String {
        format!("{}/{}", self.site_base_url, slug)
    }

    pub fn edit_url(&self, slug: &str, edit_credential: &str) -> String {
        format!(
            "{}/edit/{}?editCredential={}",
            self.site_base_url, slug, edit_credential
        )
    }
}

/// Configuration with fixed secrets and a short processor timeout.
#[cfg(any(test, feature = "test-util"))]
pub fn test_config() -> PaymentConfig {
    PaymentConfig {
        stripe_secret_key: "sk_test_fake".to_string(),
        stripe_webhook_secret: "whsec_test_secret".to_string(),
        site_base_url: "http://localhost:5173".to_string(),
        cron_secret: "cron-secret".to_string(),
        flow: PaymentFlow::Intent,
        price_id: None,
        amount_cents: DEFAULT_AMOUNT_CENTS,
        currency: DEFAULT_CURRENCY.to_string(),
        request_timeout: Duration::from_secs(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_payment_flow() {
        assert_eq!("intent".parse::<PaymentFlow>().unwrap(), PaymentFlow::Intent);
        assert_eq!(
            "Checkout".parse::<PaymentFlow>().unwrap(),
            PaymentFlow::Checkout
        );
        assert!("paypal".parse::<PaymentFlow>().is_err());
    }

    #[test]
    fn checkout_flow_requires_price() {
        let mut config = test_config();
        config.flow = PaymentFlow::Checkout;
        assert!(matches!(config.validate(), Err(PaymentError::Config(_))));

        config.price_id = Some("price_gift".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builds_share_and_edit_urls() {
        let config = test_config();
        assert_eq!(config.share_url("abcd1234"), "http://localhost:5173/abcd1234");
        assert_eq!(
            config.edit_url("abcd1234", "secret"),
            "http://localhost:5173/edit/abcd1234?editCredential=secret"
        );
    }
}
