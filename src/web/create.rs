use std::sync::Arc;

use axum::{
    Form, debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::{
    AppResult, AppState, CarpoolError, Identity, RideDirectory, include_res,
    model::{NewRide, PREFERENCE_SUGGESTIONS, format_date, parse_date, parse_time, today},
};

use super::{SIGN_IN_URL, escape, flash, page, visitor};

fn field<'a>(fields: &'a [(String, String)], key: &str) -> &'a str {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

/// Builds a posting from the submitted form. Total seats mirror the
/// available seats; an empty price means free.
pub(crate) fn parse_new_ride(fields: &[(String, String)]) -> Result<NewRide, String> {
    let available_seats: i32 = field(fields, "available_seats")
        .parse()
        .map_err(|_| "choose how many seats are available".to_owned())?;
    let price = field(fields, "price_per_person");
    let price_per_person = if price.is_empty() {
        0.0
    } else {
        price.parse().map_err(|_| format!("invalid price `{price}`"))?
    };

    Ok(NewRide {
        from_location: field(fields, "from_location").to_owned(),
        to_location: field(fields, "to_location").to_owned(),
        departure_date: parse_date(field(fields, "departure_date"))
            .map_err(|_| "choose a departure date".to_owned())?,
        departure_time: parse_time(field(fields, "departure_time"))
            .map_err(|_| "choose a departure time".to_owned())?,
        available_seats,
        total_seats: available_seats,
        price_per_person,
        preferences: fields
            .iter()
            .filter(|(k, _)| k == "preferences")
            .map(|(_, v)| v.clone())
            .collect(),
        additional_notes: field(fields, "additional_notes").to_owned(),
    })
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_ride_page(
    State(identity): State<Arc<Identity>>,
    session: Session,
) -> AppResult<Response> {
    let Some(auth) = visitor(&identity, &session).await? else {
        return Ok(Redirect::to(SIGN_IN_URL).into_response());
    };

    let preference_options: String = PREFERENCE_SUGGESTIONS
        .iter()
        .map(|pref| {
            format!(
                r#"<label><input type="checkbox" name="preferences" value="{0}"> {0}</label>"#,
                escape(pref)
            )
        })
        .collect();

    let content = include_res!(str, "/pages/new_ride.html")
        .replace("{today}", &format_date(today()))
        .replace("{preference_options}", &preference_options);

    Ok(page(&identity, &session, Some(&auth), "Offer a Ride", &content).await?.into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_ride(
    State(identity): State<Arc<Identity>>,
    State(rides): State<Arc<RideDirectory>>,
    session: Session,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Redirect> {
    let driver = match visitor(&identity, &session).await?.ok_or(CarpoolError::NotSignedIn) {
        Ok(driver) => driver,
        Err(e) => {
            flash(&session, e.to_string()).await?;
            return Ok(Redirect::to(SIGN_IN_URL));
        }
    };

    let ride = match parse_new_ride(&fields) {
        Ok(ride) => ride,
        Err(e) => {
            flash(&session, format!("Error creating ride: {e}")).await?;
            return Ok(Redirect::to("/rides/new"));
        }
    };

    match rides.create_posting(&driver, ride).await {
        Ok(_) => {
            flash(&session, "Ride created successfully!").await?;
            Ok(Redirect::to("/rides"))
        }
        Err(e) => {
            flash(&session, format!("Error creating ride: {e}")).await?;
            Ok(Redirect::to("/rides/new"))
        }
    }
}
