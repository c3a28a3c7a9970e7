// File: notifier-core/src/services/notifier.rs
//
// Webhook delivery. A failed delivery is never dropped silently: one
// follow-up report goes to the error channel carrying the original status
// code and message, so failures surface in the same place normal traffic
// does. The follow-up never escalates again - a broken error webhook is a
// terminal condition, and looping on it would hammer both endpoints.

use async_trait::async_trait;
use serde_json::json;
use tracing::error;

use crate::config::Settings;

/// Destination selector for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Primary,
    Error,
}

/// Seam between message producers and webhook delivery. Delivery failures
/// are handled internally; producers fire and forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, channel: Channel);
}

pub struct DiscordWebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
    error_webhook_url: String,
}

impl DiscordWebhookNotifier {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: settings.webhook_url.clone(),
            error_webhook_url: settings.error_webhook_url().to_string(),
        }
    }

    fn url_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::Primary => &self.webhook_url,
            Channel::Error => &self.error_webhook_url,
        }
    }

    /// `escalated` marks a failure report; those are not re-escalated.
    async fn deliver(&self, message: &str, channel: Channel, escalated: bool) {
        if channel == Channel::Error {
            error!("{}", message);
        }

        let resp = self
            .http
            .post(self.url_for(channel))
            .json(&json!({ "content": message }))
            .send()
            .await;

        let status = match resp {
            Ok(r) => r.status(),
            Err(e) => {
                error!("webhook unreachable: {}", e);
                return;
            }
        };

        if !status.is_success() {
            if escalated {
                error!(
                    "error webhook also failing (HTTP {}); giving up on this message",
                    status
                );
                return;
            }
            let report = format!(
                "Webhook failed when sending last message.\nStatus code: '{}'\nMessage: '{}'",
                status.as_u16(),
                message
            );
            Box::pin(self.deliver(&report, Channel::Error, true)).await;
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhookNotifier {
    async fn notify(&self, message: &str, channel: Channel) {
        self.deliver(message, channel, false).await;
    }
}
