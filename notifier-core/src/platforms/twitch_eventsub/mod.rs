// File: notifier-core/src/platforms/twitch_eventsub/mod.rs

pub mod events;
pub mod listener;
pub mod subscriptions;

pub use events::StreamOnline;
pub use subscriptions::{ConfirmationRegistry, EventSubClient, SubscribeError};
