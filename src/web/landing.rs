use std::sync::Arc;

use axum::{debug_handler, extract::State, response::Html};
use pulldown_cmark::{Options, Parser};
use tower_sessions::Session;

use crate::{AppResult, AppState, Identity, include_res};

use super::{page, visitor};

pub(crate) fn markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output
}

#[debug_handler(state = AppState)]
pub(crate) async fn landing(
    State(identity): State<Arc<Identity>>,
    session: Session,
) -> AppResult<Html<String>> {
    let auth = visitor(&identity, &session).await?;
    let content = format!(
        r#"<section class="hero">{}</section>"#,
        markdown(include_res!(str, "/pages/landing.md"))
    );
    page(&identity, &session, auth.as_ref(), "Home", &content).await
}
