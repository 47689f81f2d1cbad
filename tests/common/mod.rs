#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use carpool::{
    CarpoolError,
    backend::{AuthEvent, AuthProvider, AuthSession, AuthUser, Backend, DataStore, SignUp, SqliteStore},
    error::Result,
    model::{NewProfile, NewRide, Profile, UNIVERSITY, today},
};
use serde_json::json;
use time::{Date, Duration, OffsetDateTime, Time};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Auth provider kept in memory, counting every call that reaches it.
pub struct MemoryAuth {
    users: Mutex<HashMap<String, (String, AuthUser)>>,
    events: broadcast::Sender<AuthEvent>,
    pub auto_confirm: bool,
    pub calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
}

impl MemoryAuth {
    pub fn new(auto_confirm: bool) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            events: broadcast::channel(16).0,
            auto_confirm,
            calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn issue(&self, user: AuthUser, generation: &str) -> AuthSession {
        AuthSession {
            access_token: format!("token-{}-{generation}", user.id),
            refresh_token: Some(format!("refresh-{}", user.id)),
            expires_at: Some((OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp()),
            user,
        }
    }

    fn open_session(&self, user: AuthUser) -> AuthSession {
        let session = self.issue(user, "signed-in");
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        session
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = {
            let mut users = self.users.lock().unwrap();
            if users.contains_key(email) {
                return Err(CarpoolError::Auth("User already registered".to_owned()));
            }
            let user = AuthUser {
                id: Uuid::now_v7(),
                email: Some(email.to_owned()),
                user_metadata: json!({ "full_name": full_name }),
            };
            users.insert(email.to_owned(), (password.to_owned(), user.clone()));
            user
        };

        let session = self.auto_confirm.then(|| self.open_session(user.clone()));
        Ok(SignUp { user, session })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = match self.users.lock().unwrap().get(email) {
            Some((stored, user)) if stored == password => user.clone(),
            _ => return Err(CarpoolError::Auth("Invalid login credentials".to_owned())),
        };
        Ok(self.open_session(user))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(CarpoolError::Auth("network down".to_owned()));
        }
        let user = self
            .users
            .lock()
            .unwrap()
            .values()
            .map(|(_, user)| user.clone())
            .find(|user| refresh_token == format!("refresh-{}", user.id));
        let Some(user) = user else {
            return Err(CarpoolError::Auth("Invalid Refresh Token".to_owned()));
        };
        let session = self.issue(user, "refreshed");
        let _ = self.events.send(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(AuthEvent::SignedOut(session.user.clone()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// The same session, already past its expiry.
pub fn expired(mut session: AuthSession) -> AuthSession {
    session.expires_at = Some(OffsetDateTime::now_utc().unix_timestamp() - 10);
    session
}

/// A signed-in session for a profile created straight in the store.
pub fn session_for(profile: &Profile) -> AuthSession {
    AuthSession {
        access_token: format!("token-{}", profile.id),
        refresh_token: None,
        expires_at: None,
        user: AuthUser {
            id: profile.id,
            email: Some(profile.email.clone()),
            user_metadata: json!({ "full_name": profile.full_name }),
        },
    }
}

pub struct Fixture {
    pub auth: Arc<MemoryAuth>,
    pub store: Arc<SqliteStore>,
    pub backend: Backend,
}

pub async fn fixture() -> Fixture {
    fixture_with(Arc::new(MemoryAuth::new(true))).await
}

pub async fn fixture_with(auth: Arc<MemoryAuth>) -> Fixture {
    let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let backend = Backend::new(auth.clone(), store.clone());
    Fixture { auth, store, backend }
}

pub async fn driver(store: &SqliteStore, name: &str) -> Profile {
    store
        .insert_profile(
            None,
            NewProfile {
                id: Uuid::now_v7(),
                full_name: name.to_owned(),
                email: format!("{}@student.iqra.edu.pk", name.to_lowercase().replace(' ', ".")),
                university: UNIVERSITY.to_owned(),
            },
        )
        .await
        .unwrap()
}

pub fn in_days(days: i64) -> Date {
    today() + Duration::days(days)
}

pub fn new_ride(from: &str, to: &str, date: Date, time: Time) -> NewRide {
    NewRide {
        from_location: from.to_owned(),
        to_location: to.to_owned(),
        departure_date: date,
        departure_time: time,
        available_seats: 2,
        total_seats: 2,
        price_per_person: 100.0,
        preferences: vec!["No Smoking".to_owned()],
        additional_notes: String::new(),
    }
}

pub async fn count(store: &SqliteStore, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(store.pool())
        .await
        .unwrap()
}
