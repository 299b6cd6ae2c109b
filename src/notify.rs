use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use derive_more::{Display, From};
use serde::Serialize;
use tracing::{info, warn};

use crate::config;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Notification {
    /// Username of the recipient; the relay resolves the address.
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), Error>;
}

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("http: {_0}")]
    #[from]
    Http(reqwest::Error),

    #[display("timed out")]
    Timeout,
}

impl std::error::Error for Error {}

/// Fire-and-forget: the send runs on its own task and a failure is only
/// logged.
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(err) = notifier.send(&notification).await {
            warn!(%err, to = %notification.to, "failed to send notification");
        }
    });
}

pub fn from_config(config: &config::Notify) -> Arc<dyn Notifier> {
    match config {
        config::Notify::Log => Arc::new(LogNotifier),
        config::Notify::Webhook(webhook) => Arc::new(WebhookNotifier::new(
            webhook.url.clone(),
            webhook.timeout,
        )),
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), Error> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "notification",
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a mail relay.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), Error> {
        let request = self.client.post(&self.url).json(notification).send();
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout)??
            .error_for_status()?;
        Ok(())
    }
}
