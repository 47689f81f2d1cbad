//! The two external boundaries: the auth provider and the data store.
//!
//! Both gateways receive a [`Backend`] built once in `main`, so nothing in
//! the crate reaches for a global client.

mod sqlite;
mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    GetField,
    error::Result,
    model::{NewProfile, NewRideRequest, Profile, Ride, RideFilter, RideInsert, RideRequest},
};

pub use sqlite::SqliteStore;
pub use supabase::SupabaseClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// Name given at sign-up, if the provider kept it.
    pub fn full_name(&self) -> Option<String> {
        self.user_metadata
            .get_str_field("full_name")
            .ok()
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= OffsetDateTime::now_utc().unix_timestamp())
    }
}

/// Sign-in state changes, as the provider reports them for any user.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    SignedOut(AuthUser),
}

impl AuthEvent {
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => Some(session),
            AuthEvent::SignedOut(_) => None,
        }
    }

    pub fn user(&self) -> &AuthUser {
        match self {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => &session.user,
            AuthEvent::SignedOut(user) => user,
        }
    }
}

/// What sign-up hands back: a session only when the provider auto-confirms.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUp {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

/// The auth provider. It keeps no session of its own: every visitor's
/// session is handed in and out explicitly.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;
    /// Trades a refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession>;
    async fn sign_out(&self, session: &AuthSession) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Row access. `caller` is the session the request runs under; `None`
/// means the public key, so row-level security sees an anonymous visitor.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// `Ok(None)` when no row has this id.
    async fn find_profile(&self, caller: Option<&AuthSession>, id: Uuid) -> Result<Option<Profile>>;
    async fn insert_profile(&self, caller: Option<&AuthSession>, profile: NewProfile) -> Result<Profile>;
    /// Active postings matching `filter`, drivers embedded, by date then time.
    async fn list_rides(&self, caller: Option<&AuthSession>, filter: &RideFilter) -> Result<Vec<Ride>>;
    async fn insert_ride(&self, caller: Option<&AuthSession>, ride: RideInsert) -> Result<Ride>;
    async fn insert_ride_request(&self, caller: Option<&AuthSession>, request: NewRideRequest) -> Result<RideRequest>;
}

#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn DataStore>,
}

impl Backend {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn DataStore>) -> Self {
        Self { auth, store }
    }

    /// Auth and data both served by the hosted project.
    pub fn hosted(client: Arc<SupabaseClient>) -> Self {
        Self {
            auth: client.clone(),
            store: client,
        }
    }
}
