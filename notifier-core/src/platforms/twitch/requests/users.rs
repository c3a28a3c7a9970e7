// ========================================================
// File: notifier-core/src/platforms/twitch/requests/users.rs
// ========================================================
use serde::Deserialize;
use tracing::debug;

use crate::Error;
use crate::platforms::twitch::client::TwitchHelixClient;

/// Response from "Get Users" endpoint.
#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    pub data: Vec<UserData>,
}

/// Single user record.
#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// Resolves broadcaster logins to Helix user records via "Get Users".
///
/// Logins Twitch does not know are simply absent from the result; the caller
/// decides how to report them. Helix caps one request at 100 logins, so the
/// input is chunked.
pub async fn fetch_users_by_login(
    client: &TwitchHelixClient,
    logins: &[String],
) -> Result<Vec<UserData>, Error> {
    let url = format!("{}/users", client.api_base());
    let mut users: Vec<UserData> = Vec::with_capacity(logins.len());

    for chunk in logins.chunks(100) {
        let query: Vec<(&str, &str)> = chunk.iter().map(|l| ("login", l.as_str())).collect();
        let resp = client
            .http_client()
            .get(&url)
            .query(&query)
            .header("Client-Id", client.client_id())
            .header("Authorization", format!("Bearer {}", client.bearer_token()))
            .send()
            .await
            .map_err(|e| Error::Platform(format!("fetch_users network error: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(Error::Platform(format!(
                "fetch_users: HTTP {} => {}",
                status, body_text
            )));
        }

        let body = resp.text().await?;
        let page: UsersResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Platform(format!("fetch_users parse error: {}", e)))?;
        debug!("resolved {} of {} login(s)", page.data.len(), chunk.len());
        users.extend(page.data);
    }

    Ok(users)
}
