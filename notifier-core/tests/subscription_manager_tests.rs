//! tests/subscription_manager_tests.rs
//!
//! Drives the subscribe loop against a fake Helix server: "alice" already
//! has a subscription (409), "bob" subscribes cleanly. The loop must report
//! the conflict on the error channel and still subscribe bob.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::time::{Duration, timeout};

use notifier_core::Settings;
use notifier_core::platforms::twitch::client::TwitchHelixClient;
use notifier_core::platforms::twitch_eventsub::EventSubClient;
use notifier_core::services::notifier::{Channel, Notifier};
use notifier_core::services::subscription_manager::SubscriptionManager;

// ---------- Recording notifier ----------
#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, Channel)>>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, Channel)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, channel: Channel) {
        self.sent.lock().unwrap().push((message.to_string(), channel));
    }
}

// ---------- Fake Helix ----------
#[derive(Clone, Default)]
struct FakeHelix {
    // method + path (+ interesting detail) in arrival order
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHelix {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    async fn spawn(&self) -> String {
        async fn get_users(
            State(s): State<FakeHelix>,
            Query(params): Query<Vec<(String, String)>>,
        ) -> Json<Value> {
            s.requests.lock().unwrap().push("GET /users".into());
            let data: Vec<Value> = params
                .iter()
                .filter(|(k, _)| k == "login")
                .filter_map(|(_, login)| match login.as_str() {
                    "alice" => Some(json!({"id": "1", "login": "alice", "display_name": "Alice"})),
                    "bob" => Some(json!({"id": "2", "login": "bob", "display_name": "Bob"})),
                    _ => None,
                })
                .collect();
            Json(json!({ "data": data }))
        }

        // Two pages, the way Helix cursors through longer listings.
        async fn list_subs(
            State(s): State<FakeHelix>,
            Query(params): Query<Vec<(String, String)>>,
        ) -> Json<Value> {
            let after = params
                .iter()
                .find(|(k, _)| k == "after")
                .map(|(_, v)| v.clone());
            s.requests
                .lock()
                .unwrap()
                .push(format!("GET /eventsub/subscriptions after={:?}", after));
            match after.as_deref() {
                None => Json(json!({
                    "data": [
                        { "id": "stale-1", "type": "stream.online", "status": "enabled" }
                    ],
                    "pagination": { "cursor": "page-2" }
                })),
                Some("page-2") => Json(json!({
                    "data": [
                        { "id": "stale-2", "type": "stream.online", "status": "enabled" }
                    ],
                    "pagination": {}
                })),
                Some(_) => Json(json!({ "data": [], "pagination": {} })),
            }
        }

        async fn create_sub(
            State(s): State<FakeHelix>,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            let broadcaster = body["condition"]["broadcaster_user_id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            s.requests
                .lock()
                .unwrap()
                .push(format!("POST /eventsub/subscriptions {}", broadcaster));
            match broadcaster.as_str() {
                // alice: equivalent subscription already registered
                "1" => (StatusCode::CONFLICT, Json(json!({"error": "Conflict"}))),
                _ => (
                    StatusCode::ACCEPTED,
                    Json(json!({
                        "data": [{
                            "id": format!("sub-{}", broadcaster),
                            "type": "stream.online",
                            "status": "webhook_callback_verification_pending"
                        }]
                    })),
                ),
            }
        }

        async fn delete_sub(
            State(s): State<FakeHelix>,
            Query(params): Query<Vec<(String, String)>>,
        ) -> StatusCode {
            let id = params
                .iter()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            s.requests
                .lock()
                .unwrap()
                .push(format!("DELETE /eventsub/subscriptions {}", id));
            StatusCode::NO_CONTENT
        }

        let app = Router::new()
            .route("/users", get(get_users))
            .route(
                "/eventsub/subscriptions",
                get(list_subs).post(create_sub).delete(delete_sub),
            )
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

fn settings(usernames: &[&str]) -> Settings {
    Settings {
        app_id: "app-id".into(),
        app_secret: "app-secret".into(),
        usernames: usernames.iter().map(|s| s.to_string()).collect(),
        eventsub_url: "https://callbacks.example.com".into(),
        webhook_url: "https://discord.example.com/api/webhooks/1/x".into(),
        error_webhook_url: None,
    }
}

fn manager_for(
    base: &str,
    usernames: &[&str],
    notifier: &RecordingNotifier,
) -> (SubscriptionManager, Arc<EventSubClient>) {
    let helix = Arc::new(TwitchHelixClient::new("app-token", "app-id").with_api_base(base));
    let eventsub = Arc::new(EventSubClient::new(
        helix.clone(),
        "https://callbacks.example.com",
        "test-secret".into(),
    ));
    let manager = SubscriptionManager::new(
        settings(usernames),
        helix,
        eventsub.clone(),
        Arc::new(notifier.clone()),
    );
    (manager, eventsub)
}

#[tokio::test]
async fn conflict_is_reported_and_loop_continues() {
    let helix = FakeHelix::default();
    let base = helix.spawn().await;
    let notifier = RecordingNotifier::default();
    let (manager, eventsub) = manager_for(&base, &["alice", "bob"], &notifier);

    // stands in for bob's verification callback; the registry holds it until
    // the subscribe call registers its waiter
    eventsub.confirmations().confirm("sub-2");

    timeout(Duration::from_secs(10), manager.subscribe_all())
        .await
        .expect("subscribe loop hung")
        .unwrap();

    // alice's conflict was reported on the error channel...
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    let (message, channel) = &sent[0];
    assert_eq!(*channel, Channel::Error);
    assert!(message.contains("alice"));
    assert!(message.contains("already exists"));

    // ...and bob was still subscribed afterwards.
    let requests = helix.requests();
    assert!(requests.contains(&"POST /eventsub/subscriptions 1".to_string()));
    assert!(requests.contains(&"POST /eventsub/subscriptions 2".to_string()));
}

#[tokio::test]
async fn unknown_username_is_reported_and_skipped() {
    let helix = FakeHelix::default();
    let base = helix.spawn().await;
    let notifier = RecordingNotifier::default();
    let (manager, eventsub) = manager_for(&base, &["ghost", "bob"], &notifier);

    eventsub.confirmations().confirm("sub-2");
    timeout(Duration::from_secs(10), manager.subscribe_all())
        .await
        .expect("subscribe loop hung")
        .unwrap();

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("ghost"));
    assert!(sent[0].0.contains("no Twitch user found"));

    let requests = helix.requests();
    assert!(requests.contains(&"POST /eventsub/subscriptions 2".to_string()));
    assert!(!requests.iter().any(|r| r.starts_with("POST") && r.ends_with("ghost")));
}

#[tokio::test]
async fn unsubscribe_all_walks_every_page() {
    let helix = FakeHelix::default();
    let base = helix.spawn().await;
    let notifier = RecordingNotifier::default();
    let (_manager, eventsub) = manager_for(&base, &["alice"], &notifier);

    let removed = eventsub.unsubscribe_all().await.unwrap();
    assert_eq!(removed, 2);
    let requests = helix.requests();
    assert!(requests.contains(&"DELETE /eventsub/subscriptions stale-1".to_string()));
    assert!(requests.contains(&"DELETE /eventsub/subscriptions stale-2".to_string()));
}

#[tokio::test]
async fn confirmation_arriving_before_create_response_is_not_lost() {
    // The verification callback can be delivered while the subscriber is
    // still reading the 202 from Helix. Confirm through the registry inside
    // the create handler, before the response body exists client-side.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let helix = Arc::new(TwitchHelixClient::new("app-token", "app-id").with_api_base(&base));
    let eventsub = Arc::new(EventSubClient::new(
        helix,
        "https://callbacks.example.com",
        "test-secret".into(),
    ));
    let confirmations = eventsub.confirmations();

    let app = Router::new().route(
        "/eventsub/subscriptions",
        axum::routing::post({
            let confirmations = confirmations.clone();
            move || {
                let confirmations = confirmations.clone();
                async move {
                    confirmations.confirm("sub-1337");
                    (
                        StatusCode::ACCEPTED,
                        Json(json!({
                            "data": [{
                                "id": "sub-1337",
                                "type": "stream.online",
                                "status": "webhook_callback_verification_pending"
                            }]
                        })),
                    )
                }
            }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let sub_id = timeout(Duration::from_secs(5), eventsub.subscribe_stream_online("1337"))
        .await
        .expect("subscribe must resolve well before the confirmation deadline")
        .unwrap();
    assert_eq!(sub_id, "sub-1337");
}
