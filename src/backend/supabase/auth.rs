use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    GetField,
    backend::{AuthEvent, AuthProvider, AuthSession, AuthUser, SignUp},
    error::{CarpoolError, Result},
};

use super::{SupabaseClient, read_error};

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token.expires_at.or_else(|| {
            token
                .expires_in
                .map(|secs| OffsetDateTime::now_utc().unix_timestamp() + secs)
        });
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// Sign-up answers with a full session when email confirmation is off,
/// and with the bare user (sometimes wrapped in `user`) when it is on.
fn parse_sign_up(body: Value) -> Result<SignUp> {
    if body.get("access_token").is_some() {
        let session: AuthSession = serde_json::from_value::<TokenResponse>(body)?.into();
        return Ok(SignUp {
            user: session.user.clone(),
            session: Some(session),
        });
    }

    let user = match body.get_obj_field("user").map(Value::clone) {
        Ok(user) if user.is_object() => user,
        _ => body,
    };
    Ok(SignUp {
        user: serde_json::from_value(user)?,
        session: None,
    })
}

impl SupabaseClient {
    async fn token(&self, grant_type: &str, body: &Value) -> Result<AuthSession> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/token"))
            .query(&[("grant_type", grant_type)])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let (_, message) = read_error(response).await;
            return Err(CarpoolError::Auth(message));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/signup"))
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let (_, message) = read_error(response).await;
            return Err(CarpoolError::Auth(message));
        }

        let sign_up = parse_sign_up(response.json().await?)?;
        info!(user_id = %sign_up.user.id, "sign up successful");
        if let Some(session) = &sign_up.session {
            self.notify(AuthEvent::SignedIn(session.clone()));
        }
        Ok(sign_up)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let body = serde_json::to_value(Credentials { email, password })?;
        let session = self.token("password", &body).await?;
        info!(user_id = %session.user.id, "sign in successful");
        self.notify(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let session = self
            .token("refresh_token", &json!({ "refresh_token": refresh_token }))
            .await?;
        debug!(user_id = %session.user.id, "session refreshed");
        self.notify(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/logout"))
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let (_, message) = read_error(response).await;
            return Err(CarpoolError::Auth(message));
        }

        info!(user_id = %session.user.id, "signed out");
        self.notify(AuthEvent::SignedOut(session.user.clone()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
