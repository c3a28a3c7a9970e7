// File: notifier-core/src/services/subscription_manager.rs
//
// Startup sequence, per process run:
//   Clearing     unsubscribe everything a previous run registered, then wait
//                a short grace period for the cancellations to propagate
//   Subscribing  resolve each configured username and register one
//                stream.online subscription per broadcaster
// Broadcasters are handled independently: one failing never stops the rest.
// Failures go out through the notifier's error channel, so the webhook
// doubles as lightweight alerting.

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, error, info};

use crate::Error;
use crate::config::Settings;
use crate::platforms::twitch::client::TwitchHelixClient;
use crate::platforms::twitch::requests::users::fetch_users_by_login;
use crate::platforms::twitch_eventsub::subscriptions::{EventSubClient, SubscribeError};
use crate::services::notifier::{Channel, Notifier};

/// Grace period between unsubscribe-all and re-subscribing. Twitch may
/// reject a new subscription for a broadcaster whose old one has not fully
/// torn down yet.
pub const UNSUBSCRIBE_GRACE: Duration = Duration::from_secs(5);

pub struct SubscriptionManager {
    settings: Settings,
    helix: Arc<TwitchHelixClient>,
    eventsub: Arc<EventSubClient>,
    notifier: Arc<dyn Notifier>,
}

impl SubscriptionManager {
    pub fn new(
        settings: Settings,
        helix: Arc<TwitchHelixClient>,
        eventsub: Arc<EventSubClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            helix,
            eventsub,
            notifier,
        }
    }

    /// Clearing phase. Runs before the callback listener is up, so stale
    /// callbacks from a previous run have nowhere to land.
    pub async fn clear_stale_subscriptions(&self) -> Result<(), Error> {
        let removed = self.eventsub.unsubscribe_all().await?;
        info!("removed {} stale EventSub subscription(s)", removed);
        sleep(UNSUBSCRIBE_GRACE).await;
        Ok(())
    }

    /// Subscribing phase. The callback listener must already be running; the
    /// verification handshake lands there.
    pub async fn subscribe_all(&self) -> Result<(), Error> {
        let users = fetch_users_by_login(&self.helix, &self.settings.usernames).await?;

        for name in &self.settings.usernames {
            if !users.iter().any(|u| u.login.eq_ignore_ascii_case(name)) {
                self.notifier
                    .notify(
                        &format!(
                            "twitch-online-notifier - ERROR: no Twitch user found for '{}'; skipping.",
                            name
                        ),
                        Channel::Error,
                    )
                    .await;
            }
        }

        for user in &users {
            info!("Listening for events for '{}' ({})", user.display_name, user.id);
            match self.eventsub.subscribe_stream_online(&user.id).await {
                Ok(sub_id) => debug!("subscription {} confirmed for '{}'", sub_id, user.login),
                Err(e) => {
                    self.report_subscribe_error(&user.login, &e).await;
                    continue;
                }
            }
        }

        info!("I am now listening for events on {}", self.settings.eventsub_url);
        Ok(())
    }

    async fn report_subscribe_error(&self, login: &str, err: &SubscribeError) {
        error!("could not subscribe '{}': {}", login, err);
        self.notifier
            .notify(
                &format!(
                    "twitch-online-notifier - ERROR: could not subscribe '{}': {}",
                    login, err
                ),
                Channel::Error,
            )
            .await;
    }

    /// Graceful shutdown: drop every subscription this run registered.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let removed = self.eventsub.unsubscribe_all().await?;
        info!("shutdown: removed {} EventSub subscription(s)", removed);
        Ok(())
    }
}
