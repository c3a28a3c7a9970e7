// File: notifier-core/src/platforms/twitch_eventsub/subscriptions.rs
//
// EventSub subscription management over the webhook transport. A new run
// clears everything a previous run left behind and re-subscribes from the
// configured list, so no subscription outlives the process that created it.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;

/// How long to wait for Twitch's verification callback before giving up on a
/// newly created subscription.
pub const CONFIRMATION_DEADLINE: Duration = Duration::from_secs(30);

/// Tracks verification callbacks, keyed by subscription id. Callbacks arrive
/// on the listener task and can land before the create-subscription response
/// has even been read, so a confirmation with no waiter yet is remembered
/// instead of dropped; `register` picks it up afterwards.
///
/// Both `confirm` and `register` re-check the other side's map after their
/// own insert, so no interleaving loses a confirmation.
#[derive(Default)]
pub struct ConfirmationRegistry {
    waiting: DashMap<String, oneshot::Sender<()>>,
    early: DashSet<String>,
}

impl ConfirmationRegistry {
    /// Called by the listener when a verification callback arrives.
    pub fn confirm(&self, sub_id: &str) {
        if let Some((_, tx)) = self.waiting.remove(sub_id) {
            let _ = tx.send(());
            return;
        }
        self.early.insert(sub_id.to_string());
        // a register racing with us may have missed the early mark
        if let Some((_, tx)) = self.waiting.remove(sub_id) {
            self.early.remove(sub_id);
            let _ = tx.send(());
        }
    }

    /// Registers a waiter for a subscription id. The returned receiver
    /// resolves once the verification callback has arrived - including when
    /// it already has.
    pub fn register(&self, sub_id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(sub_id.to_string(), tx);
        // the callback may have beaten us here
        if self.early.remove(sub_id).is_some() {
            if let Some((_, tx)) = self.waiting.remove(sub_id) {
                let _ = tx.send(());
            }
        }
        rx
    }

    /// Drops all state for a subscription id (waiter gave up).
    pub fn forget(&self, sub_id: &str) {
        self.waiting.remove(sub_id);
        self.early.remove(sub_id);
    }
}

/// Why subscribing a single broadcaster failed. Reported per broadcaster;
/// never aborts the subscription loop.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("a subscription for this broadcaster already exists")]
    Conflict,
    #[error("waiting for the subscription to be confirmed timed out")]
    Timeout,
    #[error("the subscription request was invalid")]
    InvalidRequest,
    #[error("the Twitch API appears to be down")]
    BackendUnavailable,
    #[error("Twitch API error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct SubscriptionsPage {
    data: Vec<SubscriptionRecord>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub sub_type: String,
    #[serde(default)]
    pub status: String,
}

pub struct EventSubClient {
    helix: Arc<TwitchHelixClient>,
    callback_url: String,
    secret: String,
    confirmations: Arc<ConfirmationRegistry>,
}

impl EventSubClient {
    /// `eventsub_url` is the public base URL Twitch can reach this process
    /// on; callbacks land on its `/eventsub` path.
    pub fn new(helix: Arc<TwitchHelixClient>, eventsub_url: &str, secret: String) -> Self {
        Self {
            helix,
            callback_url: format!("{}/eventsub", eventsub_url.trim_end_matches('/')),
            secret,
            confirmations: Arc::new(ConfirmationRegistry::default()),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn confirmations(&self) -> Arc<ConfirmationRegistry> {
        self.confirmations.clone()
    }

    fn subscriptions_url(&self) -> String {
        format!("{}/eventsub/subscriptions", self.helix.api_base())
    }

    /// Deletes every EventSub subscription registered for this app.
    /// Returns how many were removed.
    ///
    /// Helix paginates the listing; all pages are walked before deleting so
    /// the cursor never chases a list we are mutating.
    pub async fn unsubscribe_all(&self) -> Result<usize, Error> {
        let url = self.subscriptions_url();
        let mut subs: Vec<SubscriptionRecord> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut req = self
                .helix
                .http_client()
                .get(&url)
                .header("Client-Id", self.helix.client_id())
                .header("Authorization", format!("Bearer {}", self.helix.bearer_token()));
            if let Some(after) = &cursor {
                req = req.query(&[("after", after.as_str())]);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| Error::Platform(format!("list subscriptions network error: {}", e)))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Platform(format!(
                    "list subscriptions: HTTP {} => {}",
                    status, body
                )));
            }

            let page: SubscriptionsPage = resp
                .json()
                .await
                .map_err(|e| Error::Platform(format!("list subscriptions parse error: {}", e)))?;
            let empty_page = page.data.is_empty();
            subs.extend(page.data);

            cursor = page.pagination.cursor;
            if cursor.is_none() || empty_page {
                break;
            }
        }

        let mut removed = 0usize;
        for sub in &subs {
            let resp = self
                .helix
                .http_client()
                .delete(&url)
                .query(&[("id", sub.id.as_str())])
                .header("Client-Id", self.helix.client_id())
                .header("Authorization", format!("Bearer {}", self.helix.bearer_token()))
                .send()
                .await
                .map_err(|e| Error::Platform(format!("delete subscription network error: {}", e)))?;

            if resp.status().is_success() {
                debug!("removed subscription {} ({}, {})", sub.id, sub.sub_type, sub.status);
                removed += 1;
            } else {
                warn!(
                    "could not remove subscription {} => HTTP {}",
                    sub.id,
                    resp.status()
                );
            }
        }
        Ok(removed)
    }

    /// Creates one "stream.online" subscription for the given broadcaster and
    /// waits for Twitch's verification callback to confirm it.
    ///
    /// The callback listener must already be running, otherwise every call
    /// ends in `SubscribeError::Timeout`.
    pub async fn subscribe_stream_online(&self, broadcaster_id: &str) -> Result<String, SubscribeError> {
        let body = json!({
            "type": "stream.online",
            "version": "1",
            "condition": { "broadcaster_user_id": broadcaster_id },
            "transport": {
                "method": "webhook",
                "callback": self.callback_url,
                "secret": self.secret,
            }
        });
        debug!("subscribing stream.online for broadcaster {}", broadcaster_id);

        let resp = self
            .helix
            .http_client()
            .post(self.subscriptions_url())
            .header("Client-Id", self.helix.client_id())
            .header("Authorization", format!("Bearer {}", self.helix.bearer_token()))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubscribeError::Api(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(categorize(status, &text));
        }

        let created: SubscriptionsPage = resp
            .json()
            .await
            .map_err(|e| SubscribeError::Api(format!("create subscription parse error: {}", e)))?;
        let sub_id = created
            .data
            .first()
            .map(|s| s.id.clone())
            .ok_or_else(|| SubscribeError::Api("create subscription returned no record".into()))?;

        // Twitch may have already delivered the verification callback while
        // we were reading the response; register resolves immediately then.
        let rx = self.confirmations.register(&sub_id);

        match timeout(CONFIRMATION_DEADLINE, rx).await {
            Ok(Ok(())) => Ok(sub_id),
            Ok(Err(_)) => Err(SubscribeError::Api("confirmation channel dropped".into())),
            Err(_) => {
                self.confirmations.forget(&sub_id);
                Err(SubscribeError::Timeout)
            }
        }
    }
}

fn categorize(status: StatusCode, body: &str) -> SubscribeError {
    match status.as_u16() {
        409 => SubscribeError::Conflict,
        400 | 401 | 403 => SubscribeError::InvalidRequest,
        s if s >= 500 => SubscribeError::BackendUnavailable,
        _ => SubscribeError::Api(format!("HTTP {} => {}", status, body)),
    }
}
