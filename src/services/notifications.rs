use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NotificationKind {
    AttemptReturned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Notification {
    pub(crate) user_id: String,
    pub(crate) kind: NotificationKind,
    pub(crate) payload: serde_json::Value,
}

/// One-way delivery of user-facing notifications. Implementations must not
/// block the caller on delivery and own their own retry policy.
#[async_trait]
pub(crate) trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification);
}

pub(crate) fn sink_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn NotificationSink>> {
    let notifications = settings.notifications();
    match &notifications.webhook_url {
        Some(url) => {
            let sink = WebhookSink::new(url.clone(), notifications.timeout_seconds)?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(LogSink)),
    }
}

/// Posts each notification as JSON to a configured endpoint.
#[derive(Debug, Clone)]
pub(crate) struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub(crate) fn new(url: String, timeout_seconds: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build notification HTTP client")?;

        Ok(Self { client, url })
    }

    async fn deliver(client: Client, url: String, notification: Notification) {
        let result = client
            .post(&url)
            .json(&notification)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                metrics::counter!("notifications_delivered_total").increment(1);
            }
            Err(err) => {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(
                    user_id = %notification.user_id,
                    kind = ?notification.kind,
                    error = %err,
                    "Notification webhook delivery failed"
                );
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, notification: Notification) {
        tokio::spawn(Self::deliver(self.client.clone(), self.url.clone(), notification));
    }
}

/// Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            payload = %notification.payload,
            "Notification emitted"
        );
    }
}
