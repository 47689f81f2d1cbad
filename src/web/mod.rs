//! Pages and form posts. Everything here collects input and hands it to
//! the identity gateway or the ride directory.

mod auth;
mod browse;
mod create;
mod landing;

use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use pulldown_cmark_escape::escape_html;
use tower_sessions::Session;
use tracing::warn;

use crate::{
    AppResult, AppState, Identity,
    backend::AuthSession,
    include_res, res,
    session::{ALERT, AUTH},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(landing::landing))
        .route("/style.css", get(res::stylesheet))
        .route("/rides", get(browse::browse))
        .route("/rides/new", get(create::new_ride_page).post(create::new_ride))
        .route("/rides/{id}/request", post(browse::request_ride))
        .route("/auth", get(auth::auth_page))
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/logout", post(auth::logout))
}

pub(crate) const SIGN_IN_URL: &str = "/auth?mode=login";

pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    // writing into a String cannot fail
    match escape_html(&mut out, s) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}

/// The visitor's sign-in, refreshed when it has expired and written back
/// to their session. Anything unreadable counts as signed out.
pub(crate) async fn visitor(identity: &Identity, session: &Session) -> AppResult<Option<AuthSession>> {
    let held: Option<AuthSession> = session.get(AUTH).await.unwrap_or_else(|e| {
        warn!("discarding unreadable auth session: {e}");
        None
    });
    let current = identity.get_session(held.clone()).await;
    if current != held {
        remember(session, current.as_ref()).await?;
    }
    Ok(current)
}

/// Stores or clears the visitor's sign-in.
pub(crate) async fn remember(session: &Session, auth: Option<&AuthSession>) -> AppResult<()> {
    match auth {
        Some(auth) => session.insert(AUTH, auth).await?,
        None => {
            session.remove::<AuthSession>(AUTH).await?;
        }
    }
    Ok(())
}

/// Queue a message for the next page, like a blocking alert.
pub(crate) async fn flash(session: &Session, message: impl Into<String>) -> AppResult<()> {
    session.insert(ALERT, message.into()).await?;
    Ok(())
}

/// Wraps `content` in the shared layout, consuming any queued alert.
pub(crate) async fn page(
    identity: &Identity,
    session: &Session,
    auth: Option<&AuthSession>,
    title: &str,
    content: &str,
) -> AppResult<Html<String>> {
    let account = match auth {
        Some(auth) => {
            let name = match identity.cached_profile(auth.user.id).await {
                Some(profile) => profile.full_name,
                None => auth.user.email.clone().unwrap_or_default(),
            };
            include_res!(str, "/pages/account.html").replace("{name}", &escape(&name))
        }
        None => format!(r#"<a href="{SIGN_IN_URL}">Sign In</a>"#),
    };

    let alert = match session.remove::<String>(ALERT).await? {
        Some(message) => format!(r#"<div class="alert" role="alert">{}</div>"#, escape(&message)),
        None => String::new(),
    };

    Ok(Html(
        include_res!(str, "/pages/layout.html")
            .replace("{title}", &escape(title))
            .replace("{account}", &account)
            .replace("{alert}", &alert)
            .replace("{content}", content),
    ))
}
