// File: notifier-core/src/platforms/twitch/client.rs

use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::debug;

use crate::Error;

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const DEFAULT_API_BASE: &str = "https://api.twitch.tv/helix";

/// A small wrapper client for calling Helix endpoints with an app access
/// token (OAuth2 client-credentials flow).
pub struct TwitchHelixClient {
    http: Arc<ReqwestClient>,
    bearer_token: String,
    client_id: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct AppTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl TwitchHelixClient {
    /// Create a client from a token already in hand.
    pub fn new(bearer_token: &str, client_id: &str) -> Self {
        Self {
            http: Arc::new(ReqwestClient::new()),
            bearer_token: bearer_token.to_string(),
            client_id: client_id.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Acquire an app access token via client credentials and return a ready
    /// client. Any non-success response is an authentication failure.
    pub async fn connect(app_id: &str, app_secret: &str) -> Result<Self, Error> {
        let http = Arc::new(ReqwestClient::new());
        let resp = http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", app_id),
                ("client_secret", app_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "app token request failed: HTTP {} => {}",
                status, body
            )));
        }

        let token: AppTokenResponse = resp.json().await?;
        debug!("acquired app access token (expires in {} s)", token.expires_in);

        Ok(Self {
            http,
            bearer_token: token.access_token,
            client_id: app_id.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point Helix calls at a different base URL (test servers).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns an `Arc<ReqwestClient>` reference for advanced usage.
    pub fn http_client(&self) -> Arc<ReqwestClient> {
        self.http.clone()
    }
}
