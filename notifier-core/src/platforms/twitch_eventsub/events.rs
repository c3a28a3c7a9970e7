use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Matches the "stream.online" notification payload.
///
/// Every field defaults when absent: the payload comes from an external
/// system, so deserialization must not fail on a malformed body. The handler
/// decides what to do with empty identity fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOnline {
    #[serde(default)]
    pub id: String,                       // e.g. "9001"
    #[serde(default)]
    pub broadcaster_user_id: String,      // e.g. "1337"
    #[serde(default)]
    pub broadcaster_user_login: String,   // e.g. "cool_user"
    #[serde(default)]
    pub broadcaster_user_name: String,    // e.g. "Cool_User"
    #[serde(default)]
    pub r#type: String,                   // e.g. "live"
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// The `payload` of a webhook notification delivery.
#[derive(Debug, Deserialize)]
pub struct NotificationEnvelope {
    pub subscription: SubscriptionInfo,
    #[serde(default)]
    pub event: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub sub_type: String,
}

/// Outcome of parsing a notification's event JSON. A payload of a known
/// type that does not deserialize is a distinct case from a type we simply
/// do not handle; the listener logs them differently.
#[derive(Debug)]
pub enum ParsedNotification {
    StreamOnline(StreamOnline),
    Malformed(serde_json::Error),
    Unhandled,
}

pub fn parse_notification(sub_type: &str, event_json: &serde_json::Value) -> ParsedNotification {
    match sub_type {
        "stream.online" => match serde_json::from_value::<StreamOnline>(event_json.clone()) {
            Ok(event) => ParsedNotification::StreamOnline(event),
            Err(e) => ParsedNotification::Malformed(e),
        },
        _ => ParsedNotification::Unhandled,
    }
}
