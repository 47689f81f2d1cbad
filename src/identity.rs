//! Identity gateway: who is signed in, and their profile row.

use std::{collections::HashMap, sync::Arc};

use tokio::{
    sync::{Mutex, RwLock, broadcast::error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AuthSession, Backend, SignUp},
    error::{CarpoolError, Result},
    model::{NewProfile, Profile, UNIVERSITY, UNKNOWN_USER},
};

const ALLOWED_DOMAINS: [&str; 2] = ["iqra.edu.pk", "student.iqra.edu.pk"];

/// `^[^@]+@(iqra\.edu\.pk|student\.iqra\.edu\.pk)$`
pub fn validate_university_email(email: &str) -> Result<()> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(CarpoolError::DomainRestricted);
    };
    if local.is_empty() || !ALLOWED_DOMAINS.contains(&domain) {
        return Err(CarpoolError::DomainRestricted);
    }
    Ok(())
}

/// Identity gateway shared by every visitor. It holds no sign-in of its
/// own: each call gets the visitor's session, and profiles are cached by
/// user id once resolved.
pub struct Identity {
    backend: Backend,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    provisioning: Mutex<()>,
}

impl Identity {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            profiles: RwLock::new(HashMap::new()),
            provisioning: Mutex::new(()),
        }
    }

    /// Profile already resolved for `user_id`; never touches the store.
    pub async fn cached_profile(&self, user_id: Uuid) -> Option<Profile> {
        self.profiles.read().await.get(&user_id).cloned()
    }

    /// The visitor's session, refreshed first when it has expired. A session
    /// that cannot be refreshed, or a failing provider, reads as signed out.
    pub async fn get_session(&self, held: Option<AuthSession>) -> Option<AuthSession> {
        let session = held?;
        let session = if session.is_expired() {
            let Some(refresh_token) = session.refresh_token.as_deref() else {
                warn!(user_id = %session.user.id, "session expired without refresh token");
                return None;
            };
            match self.backend.auth.refresh(refresh_token).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(user_id = %session.user.id, "failed to refresh session: {e}");
                    return None;
                }
            }
        } else {
            session
        };

        self.ensure_profile(&session).await;
        Some(session)
    }

    /// Profile for `user_id`, provisioned from `session` if missing.
    pub async fn resolve_profile(&self, session: &AuthSession, user_id: Uuid) -> Option<Profile> {
        if session.user.id != user_id {
            error!(%user_id, "cannot get user data to resolve profile");
            return None;
        }
        self.ensure_profile(session).await
    }

    /// Looks the profile up and creates it on first sight. Safe to call
    /// repeatedly and concurrently: at most one row is inserted per user.
    /// Failures are logged and leave no profile cached.
    pub async fn ensure_profile(&self, session: &AuthSession) -> Option<Profile> {
        let user = &session.user;
        if let Some(profile) = self.cached_profile(user.id).await {
            return Some(profile);
        }

        let _guard = self.provisioning.lock().await;
        if let Some(profile) = self.cached_profile(user.id).await {
            return Some(profile);
        }

        match self.find_or_create(session).await {
            Ok(profile) => {
                self.profiles.write().await.insert(user.id, profile.clone());
                Some(profile)
            }
            Err(e) => {
                error!(user_id = %user.id, "error resolving profile: {e}");
                self.forget(user.id).await;
                None
            }
        }
    }

    async fn find_or_create(&self, session: &AuthSession) -> Result<Profile> {
        let user = &session.user;
        let store = &self.backend.store;
        debug!(user_id = %user.id, "fetching profile");
        if let Some(profile) = store.find_profile(Some(session), user.id).await? {
            return Ok(profile);
        }

        info!(user_id = %user.id, "profile not found, creating");
        let created = store
            .insert_profile(
                Some(session),
                NewProfile {
                    id: user.id,
                    full_name: user.full_name().unwrap_or_else(|| UNKNOWN_USER.to_owned()),
                    email: user.email.clone().unwrap_or_default(),
                    university: UNIVERSITY.to_owned(),
                },
            )
            .await;

        match created {
            Ok(profile) => Ok(profile),
            // another process provisioned the same user first
            Err(e) => match store.find_profile(Some(session), user.id).await {
                Ok(Some(profile)) => Ok(profile),
                _ => Err(e),
            },
        }
    }

    async fn forget(&self, user_id: Uuid) {
        self.profiles.write().await.remove(&user_id);
    }

    /// Rejects non-university emails before the provider is contacted. The
    /// session is present only when the provider auto-confirms.
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUp> {
        validate_university_email(email)?;

        let sign_up = self.backend.auth.sign_up(email, password, full_name).await?;
        if let Some(session) = &sign_up.session {
            self.ensure_profile(session).await;
        }
        Ok(sign_up)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let session = self.backend.auth.sign_in(email, password).await?;
        self.ensure_profile(&session).await;
        Ok(session)
    }

    pub async fn sign_out(&self, session: &AuthSession) -> Result<()> {
        self.backend.auth.sign_out(session).await?;
        self.forget(session.user.id).await;
        Ok(())
    }

    /// Follows the provider's auth events until the provider goes away:
    /// sign-ins and refreshes resolve the user's profile, sign-outs drop it.
    pub fn watch(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.backend.auth.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(user_id = %event.user().id, ?event, "auth event");
                        match event.session() {
                            Some(session) => {
                                self.ensure_profile(session).await;
                            }
                            None => self.forget(event.user().id).await,
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
