//! Transactional email for gift sites.
//!
//! The only message sent today is the "your site is live" email carrying the
//! shareable link and the private edit link.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Email transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Email API rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteReadyEmail {
    pub to: String,
    pub site_title: String,
    pub share_url: String,
    pub edit_url: String,
}

impl SiteReadyEmail {
    pub fn subject(&self) -> String {
        format!("Your gift \"{}\" is live", self.site_title)
    }

    pub fn text_body(&self) -> String {
        format!(
            "Your gift site is ready to share.\n\n\
             Share this link: {}\n\n\
             Keep this private link to edit your site later: {}\n",
            self.share_url, self.edit_url
        )
    }
}

/// Sends customer notifications. Implementations must not retry forever;
/// callers treat every error as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send_site_ready(&self, email: &SiteReadyEmail) -> Result<(), EmailError>;
}

/// Logs messages instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_site_ready(&self, email: &SiteReadyEmail) -> Result<(), EmailError> {
        info!(
            to = %email.to,
            share_url = %email.share_url,
            "Site ready email (logging notifier, not sent)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub from: String,
}

impl EmailConfig {
    /// Returns `Ok(None)` when `EMAIL_API_KEY` is unset, so the caller can
    /// fall back to [`LoggingNotifier`].
    pub fn from_env() -> Result<Option<Self>, EmailError> {
        let Some(api_key) = std::env::var("EMAIL_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let api_url = std::env::var("EMAIL_API_URL")
            .unwrap_or_else(|_| "https://api.resend.com/emails".to_string());
        let from = std::env::var("EMAIL_FROM").map_err(|_| {
            EmailError::Config("EMAIL_FROM must be set when EMAIL_API_KEY is set".into())
        })?;

        Ok(Some(Self {
            api_url,
            api_key: api_key.into(),
            from,
        }))
    }
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    text: String,
}

/// Posts messages as JSON to a transactional email HTTP API using a bearer key.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    config: EmailConfig,
}

impl HttpMailer {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| EmailError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send_site_ready(&self, email: &SiteReadyEmail) -> Result<(), EmailError> {
        let message = OutgoingMessage {
            from: &self.config.from,
            to: [&email.to],
            subject: email.subject(),
            text: email.text_body(),
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(to = %email.to, "Site ready email sent");
        Ok(())
    }
}
