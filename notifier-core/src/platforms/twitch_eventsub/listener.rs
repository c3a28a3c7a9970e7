// File: notifier-core/src/platforms/twitch_eventsub/listener.rs
//
// Inbound HTTP endpoint Twitch delivers EventSub callbacks to: the
// verification handshake, event notifications, and revocations. The root
// path answers a trivial liveness message for the healthcheck probe.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::Error;
use crate::platforms::twitch_eventsub::events::{
    NotificationEnvelope, ParsedNotification, StreamOnline, parse_notification,
};
use crate::platforms::twitch_eventsub::subscriptions::ConfirmationRegistry;

/// Invoked by the listener, on its own task, once per delivered
/// "stream.online" notification. Invocations may overlap.
#[async_trait]
pub trait StreamOnlineHandler: Send + Sync {
    async fn on_stream_online(&self, event: StreamOnline);
}

#[derive(Clone)]
pub struct ListenerState {
    /// Per-run secret every callback is HMAC-signed with.
    pub secret: Arc<String>,
    pub confirmations: Arc<ConfirmationRegistry>,
    pub handler: Arc<dyn StreamOnlineHandler>,
}

#[derive(Debug, Deserialize)]
struct VerificationBody {
    #[serde(default)]
    challenge: String,
    subscription: VerificationSubscription,
}

#[derive(Debug, Deserialize)]
struct VerificationSubscription {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    sub_type: String,
}

pub fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/eventsub", post(receive_callback))
        .with_state(state)
}

pub async fn bind(port: u16) -> Result<tokio::net::TcpListener, Error> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("EventSub callback listener on {}", addr);
    Ok(listener)
}

pub async fn serve(listener: tokio::net::TcpListener, state: ListenerState) -> Result<(), Error> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn liveness() -> &'static str {
    "twitch-online-notifier is running\n"
}

async fn receive_callback(
    State(state): State<ListenerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !verify_signature(&state.secret, &headers, &body) {
        warn!("rejected EventSub callback with bad or missing signature");
        return StatusCode::FORBIDDEN.into_response();
    }

    match header_str(&headers, "Twitch-Eventsub-Message-Type") {
        Some("webhook_callback_verification") => handle_verification(&state, &body),
        Some("notification") => handle_notification(&state, &body),
        Some("revocation") => {
            warn!("subscription revoked - check credentials and callback URL");
            StatusCode::OK.into_response()
        }
        other => {
            debug!("unhandled message type {:?}", other);
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

fn handle_verification(state: &ListenerState, body: &[u8]) -> Response {
    let parsed: VerificationBody = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed verification body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    info!(
        "confirming subscription {} ({})",
        parsed.subscription.id, parsed.subscription.sub_type
    );
    // may land before the create-subscription response has been read; the
    // registry holds the confirmation until the subscriber catches up
    state.confirmations.confirm(&parsed.subscription.id);
    (StatusCode::OK, parsed.challenge).into_response()
}

fn handle_notification(state: &ListenerState, body: &[u8]) -> Response {
    // Twitch retries on non-2xx; a payload we cannot use still gets a 200 so
    // it is not redelivered forever.
    let envelope: NotificationEnvelope = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed notification body: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    match parse_notification(&envelope.subscription.sub_type, &envelope.event) {
        ParsedNotification::StreamOnline(event) => {
            let handler = state.handler.clone();
            tokio::spawn(async move {
                handler.on_stream_online(event).await;
            });
        }
        ParsedNotification::Malformed(e) => warn!(
            "malformed {} event payload: {}",
            envelope.subscription.sub_type, e
        ),
        ParsedNotification::Unhandled => debug!(
            "ignoring notification of type {}",
            envelope.subscription.sub_type
        ),
    }
    StatusCode::OK.into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// HMAC-SHA256 over message id + timestamp + raw body, compared against the
/// `sha256=<hex>` signature header. The comparison is constant-time.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let (Some(msg_id), Some(timestamp), Some(signature)) = (
        header_str(headers, "Twitch-Eventsub-Message-Id"),
        header_str(headers, "Twitch-Eventsub-Message-Timestamp"),
        header_str(headers, "Twitch-Eventsub-Message-Signature"),
    ) else {
        return false;
    };
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(msg_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the signature header value for a callback body. The listener's
/// own tests sign with this; it is also handy for local curl testing.
pub fn sign_payload(secret: &str, msg_id: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(msg_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
