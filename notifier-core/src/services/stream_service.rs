// File: notifier-core/src/services/stream_service.rs

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::platforms::twitch_eventsub::events::StreamOnline;
use crate::platforms::twitch_eventsub::listener::StreamOnlineHandler;
use crate::services::notifier::{Channel, Notifier};

/// Turns a "stream.online" event into the announcement message and hands it
/// to the notifier. Pure transformation plus one delivery.
pub struct StreamService {
    notifier: Arc<dyn Notifier>,
}

impl StreamService {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

const UNKNOWN: &str = "Unknown";

fn or_unknown(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() { UNKNOWN } else { trimmed }
}

#[async_trait]
impl StreamOnlineHandler for StreamService {
    async fn on_stream_online(&self, event: StreamOnline) {
        // The payload shape is not under our control; never crash on it.
        let display_name = or_unknown(&event.broadcaster_user_name);
        let login = or_unknown(&event.broadcaster_user_login);

        if display_name == UNKNOWN || login == UNKNOWN {
            warn!("stream.online event with missing broadcaster fields: {:?}", event);
            self.notifier
                .notify(
                    &format!(
                        "twitch-online-notifier - ERROR: received a stream.online event with \
                         missing broadcaster fields (event id: '{}')",
                        event.id
                    ),
                    Channel::Error,
                )
                .await;
        }

        let watch_url = format!("https://twitch.tv/{}", login);
        info!("{} is live!", display_name);
        info!("\t{}", watch_url);

        self.notifier
            .notify(
                &format!("{} is live!\n{}", display_name, watch_url),
                Channel::Primary,
            )
            .await;
    }
}
