use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::AppConfig;

const RELAY_TIMEOUT_SECONDS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[axum::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Delivers mail through an HTTP relay that accepts `{from, to, subject, text}`.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: Url, token: Option<String>, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RELAY_TIMEOUT_SECONDS))
            .build()
            .context("failed to build mail relay client")?;
        Ok(Self {
            client,
            endpoint,
            token,
            from,
        })
    }
}

#[axum::async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .context("failed to reach mail relay")?
            .error_for_status()
            .context("mail relay rejected message")?;
        Ok(())
    }
}

/// Used when no relay is configured; records that a message would have been sent.
#[derive(Clone, Default)]
pub struct LogMailer;

#[axum::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(subject = %message.subject, "mail relay not configured, email skipped");
        Ok(())
    }
}

pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Mailer>> {
    match &config.mail_relay_url {
        Some(endpoint) => Ok(Arc::new(HttpMailer::new(
            endpoint.clone(),
            config.mail_relay_token.clone(),
            config.mail_from.clone(),
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}
