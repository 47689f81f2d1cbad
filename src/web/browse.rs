use std::sync::Arc;

use axum::{
    Form, debug_handler,
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::warn;
use uuid::Uuid;

use crate::{
    AppResult, AppState, CarpoolError, Identity, RideDirectory, include_res,
    model::{Ride, format_date, parse_date},
};

use super::{SIGN_IN_URL, escape, flash, page, visitor};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchQuery {
    from: Option<String>,
    to: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JoinForm {
    #[serde(default)]
    message: String,
}

fn ride_card(ride: &Ride) -> String {
    let posting = &ride.posting;
    let (driver_name, university) = match &ride.driver {
        Some(driver) => (driver.full_name.as_str(), driver.university.as_str()),
        None => ("Unknown Driver", crate::model::UNIVERSITY),
    };
    let preferences: String = posting
        .preferences
        .iter()
        .map(|pref| format!(r#"<span class="tag">{}</span>"#, escape(pref)))
        .collect();
    let time = posting.departure_time;

    include_res!(str, "/pages/ride_card.html")
        .replace("{driver_name}", &escape(driver_name))
        .replace("{university}", &escape(university))
        .replace("{price}", &posting.price_per_person.to_string())
        .replace("{from}", &escape(&posting.from_location))
        .replace("{to}", &escape(&posting.to_location))
        .replace("{date}", &format_date(posting.departure_date))
        .replace("{time}", &format!("{:02}:{:02}", time.hour(), time.minute()))
        .replace("{available_seats}", &posting.available_seats.to_string())
        .replace("{total_seats}", &posting.total_seats.to_string())
        .replace("{preferences}", &preferences)
        .replace("{notes}", &escape(posting.additional_notes.as_deref().unwrap_or_default()))
        .replace("{id}", &posting.id.to_string())
}

#[debug_handler(state = AppState)]
pub(crate) async fn browse(
    State(identity): State<Arc<Identity>>,
    State(rides): State<Arc<RideDirectory>>,
    session: Session,
    Query(SearchQuery { from, to, date }): Query<SearchQuery>,
) -> AppResult<Html<String>> {
    let auth = visitor(&identity, &session).await?;
    let parsed_date = match date.as_deref().filter(|d| !d.is_empty()) {
        Some(raw) => match parse_date(raw) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(date = raw, "ignoring search date: {e}");
                None
            }
        },
        None => None,
    };

    let found = rides.search(auth.as_ref(), from.as_deref(), to.as_deref(), parsed_date).await;
    let ride_cards = if found.is_empty() {
        r#"<p class="empty">No rides found. Try a different search or check back later.</p>"#.to_owned()
    } else {
        found.iter().map(ride_card).collect()
    };

    let content = include_res!(str, "/pages/rides.html")
        .replace("{from}", &escape(from.as_deref().unwrap_or_default()))
        .replace("{to}", &escape(to.as_deref().unwrap_or_default()))
        .replace("{date}", &escape(date.as_deref().unwrap_or_default()))
        .replace("{ride_cards}", &ride_cards);

    page(&identity, &session, auth.as_ref(), "Find Rides", &content).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn request_ride(
    State(identity): State<Arc<Identity>>,
    State(rides): State<Arc<RideDirectory>>,
    session: Session,
    Path(ride_id): Path<Uuid>,
    Form(JoinForm { message }): Form<JoinForm>,
) -> AppResult<Redirect> {
    let passenger = match visitor(&identity, &session).await?.ok_or(CarpoolError::NotSignedIn) {
        Ok(passenger) => passenger,
        Err(e) => {
            flash(&session, e.to_string()).await?;
            return Ok(Redirect::to(SIGN_IN_URL));
        }
    };

    match rides.request_to_join(&passenger, ride_id, &message).await {
        Ok(_) => flash(&session, "Ride request sent successfully!").await?,
        Err(e) => flash(&session, format!("Error sending ride request: {e}")).await?,
    }
    Ok(Redirect::to("/rides"))
}
