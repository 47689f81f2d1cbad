//! Client for the hosted project: GoTrue under `/auth/v1`, PostgREST under `/rest/v1`.
//!
//! The client is shared by every visitor and holds no session. Each data
//! request carries its caller's token so row-level security applies to
//! that user.

mod auth;
mod rest;

use reqwest::{Response, header::HeaderMap};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{CarpoolError, Result};

use super::{AuthEvent, AuthSession};

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let url = url.trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CarpoolError::Config(format!(
                "service URL must start with http:// or https://, got `{url}`"
            )));
        }
        if anon_key.is_empty() {
            return Err(CarpoolError::Config("empty API key".to_owned()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            anon_key
                .parse()
                .map_err(|_| CarpoolError::Config("API key is not a valid header value".to_owned()))?,
        );
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            url: url.to_owned(),
            anon_key: anon_key.to_owned(),
            events: broadcast::channel(16).0,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// The caller's access token when signed in, otherwise the public key.
    fn bearer<'a>(&'a self, caller: Option<&'a AuthSession>) -> &'a str {
        caller.map_or(self.anon_key.as_str(), |session| session.access_token.as_str())
    }

    fn notify(&self, event: AuthEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Error bodies differ per service; take the first human-readable field.
fn error_message(body: &Value) -> Option<String> {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

async fn read_error(response: Response) -> (Option<String>, String) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    debug!(%status, body = %text, "request rejected");

    match serde_json::from_str::<Value>(&text) {
        Ok(body) => {
            let code = body.get("code").map(|code| match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            let message = error_message(&body).unwrap_or_else(|| status.to_string());
            (code, message)
        }
        Err(_) if !text.is_empty() => (None, text),
        Err(_) => (None, status.to_string()),
    }
}
