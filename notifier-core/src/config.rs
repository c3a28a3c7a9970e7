// src/config.rs
//
// Environment-driven settings. Loaded once at startup, before any network
// interaction, so a misconfigured container fails immediately instead of
// during event handling.

use crate::Error;

/// Immutable runtime settings, read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub app_id: String,
    pub app_secret: String,
    /// Broadcaster logins to watch, in configured order.
    pub usernames: Vec<String>,
    /// Public base URL Twitch will deliver EventSub callbacks to.
    pub eventsub_url: String,
    pub webhook_url: String,
    /// Optional separate webhook for error reports.
    pub error_webhook_url: Option<String>,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary lookup function. Tests use this to
    /// avoid mutating the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = require(&get, "TWITCH_APP_ID")?;
        let app_secret = require(&get, "TWITCH_APP_SECRET")?;
        let usernames = split_usernames(&require(&get, "TWITCH_USERNAMES")?);
        if usernames.is_empty() {
            return Err(Error::Config(
                "TWITCH_USERNAMES must contain at least one username".into(),
            ));
        }
        let eventsub_url = require(&get, "EVENTSUB_URL")?;
        let webhook_url = require(&get, "WEBHOOK_URL")?;
        let error_webhook_url = get("ERROR_WEBHOOK_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Settings {
            app_id,
            app_secret,
            usernames,
            eventsub_url,
            webhook_url,
            error_webhook_url,
        })
    }

    /// Destination for error reports; falls back to the primary webhook when
    /// no dedicated error webhook is configured.
    pub fn error_webhook_url(&self) -> &str {
        self.error_webhook_url.as_deref().unwrap_or(&self.webhook_url)
    }
}

fn require<F>(get: &F, name: &str) -> Result<String, Error>
where
    F: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{name} must be set")))
}

/// Splits a comma-separated username list, trimming whitespace and dropping
/// empty entries while preserving order.
pub fn split_usernames(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
