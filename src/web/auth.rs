use std::sync::Arc;

use axum::{
    Form, debug_handler,
    extract::{Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::error;

use crate::{AppResult, AppState, Identity, backend::AuthSession, include_res, session::AUTH};

use super::{SIGN_IN_URL, flash, page, remember, visitor};

const REGISTER_URL: &str = "/auth?mode=register";

#[derive(Deserialize)]
pub(crate) struct AuthQuery {
    mode: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub(crate) struct RegisterForm {
    name: String,
    email: String,
    password: String,
}

/// Fresh session id on every sign-in.
async fn start(session: &Session, auth: &AuthSession) -> AppResult<Redirect> {
    session.cycle_id().await?;
    remember(session, Some(auth)).await?;
    Ok(Redirect::to("/rides"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn auth_page(
    State(identity): State<Arc<Identity>>,
    Query(AuthQuery { mode }): Query<AuthQuery>,
    session: Session,
) -> AppResult<Html<String>> {
    let auth = visitor(&identity, &session).await?;
    let (title, content) = match mode.as_deref() {
        Some("register") => ("Sign Up", include_res!(str, "/pages/register.html")),
        _ => ("Sign In", include_res!(str, "/pages/login.html")),
    };
    page(&identity, &session, auth.as_ref(), title, content).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(identity): State<Arc<Identity>>,
    session: Session,
    Form(LoginForm { email, password }): Form<LoginForm>,
) -> AppResult<Redirect> {
    match identity.sign_in(&email, &password).await {
        Ok(auth) => start(&session, &auth).await,
        Err(e) => {
            flash(&session, e.to_string()).await?;
            Ok(Redirect::to(SIGN_IN_URL))
        }
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(identity): State<Arc<Identity>>,
    session: Session,
    Form(RegisterForm { name, email, password }): Form<RegisterForm>,
) -> AppResult<Redirect> {
    match identity.sign_up(&email, &password, &name).await {
        Ok(sign_up) => match sign_up.session {
            Some(auth) => start(&session, &auth).await,
            // confirmation pending: the visitor signs in once confirmed
            None => Ok(Redirect::to(SIGN_IN_URL)),
        },
        Err(e) => {
            flash(&session, e.to_string()).await?;
            Ok(Redirect::to(REGISTER_URL))
        }
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    State(identity): State<Arc<Identity>>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(auth) = session.remove::<AuthSession>(AUTH).await? {
        if let Err(e) = identity.sign_out(&auth).await {
            error!(user_id = %auth.user.id, "error signing out: {e}");
        }
    }
    Ok(Redirect::to("/"))
}
