use async_trait::async_trait;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use uuid::Uuid;

use crate::{
    backend::{AuthSession, DataStore},
    error::{CarpoolError, Result},
    model::{
        NewProfile, NewRideRequest, Profile, Ride, RideFilter, RideInsert, RideRequest, RideStatus,
        format_date,
    },
};

use super::{SupabaseClient, read_error};

const RIDE_SELECT: &str = "*,driver:profiles(*)";
const RIDE_ORDER: &str = "departure_date.asc,departure_time.asc";

/// Backslash-escape LIKE metacharacters so place filters match literally.
fn like_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// PostgREST query pairs; repeated keys combine with AND.
pub(crate) fn ride_query(filter: &RideFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", RIDE_SELECT.to_owned()),
        ("status", format!("eq.{}", RideStatus::Active)),
        ("departure_date", format!("gte.{}", format_date(filter.on_or_after))),
    ];
    if let Some(from) = &filter.from {
        query.push(("from_location", format!("ilike.*{}*", like_literal(from))));
    }
    if let Some(to) = &filter.to {
        query.push(("to_location", format!("ilike.*{}*", like_literal(to))));
    }
    if let Some(date) = filter.date {
        query.push(("departure_date", format!("eq.{}", format_date(date))));
    }
    query.push(("order", RIDE_ORDER.to_owned()));
    query
}

impl SupabaseClient {
    fn table(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(&format!("/rest/v1/{table}")))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        caller: Option<&AuthSession>,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        debug!(table, ?query, "select");
        let response = self
            .table(Method::GET, table)
            .bearer_auth(self.bearer(caller))
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let (code, message) = read_error(response).await;
            return Err(CarpoolError::Store { code, message });
        }
        Ok(response.json().await?)
    }

    /// Insert one row and read it back through `select`.
    async fn insert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        caller: Option<&AuthSession>,
        table: &str,
        select: &str,
        row: &B,
    ) -> Result<T> {
        debug!(table, "insert");
        let response = self
            .table(Method::POST, table)
            .bearer_auth(self.bearer(caller))
            .header("Prefer", "return=representation")
            .query(&[("select", select)])
            .json(&[row])
            .send()
            .await?;

        if !response.status().is_success() {
            let (code, message) = read_error(response).await;
            return Err(CarpoolError::Store { code, message });
        }

        let rows: Vec<T> = response.json().await?;
        rows.into_iter().next().ok_or_else(|| CarpoolError::Store {
            code: None,
            message: format!("insert into {table} returned no row"),
        })
    }
}

#[async_trait]
impl DataStore for SupabaseClient {
    async fn find_profile(&self, caller: Option<&AuthSession>, id: Uuid) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self
            .select(caller, "profiles", &[("select", "*".to_owned()), ("id", format!("eq.{id}"))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_profile(&self, caller: Option<&AuthSession>, profile: NewProfile) -> Result<Profile> {
        self.insert(caller, "profiles", "*", &profile).await
    }

    async fn list_rides(&self, caller: Option<&AuthSession>, filter: &RideFilter) -> Result<Vec<Ride>> {
        self.select(caller, "rides", &ride_query(filter)).await
    }

    async fn insert_ride(&self, caller: Option<&AuthSession>, ride: RideInsert) -> Result<Ride> {
        self.insert(caller, "rides", RIDE_SELECT, &ride).await
    }

    async fn insert_ride_request(&self, caller: Option<&AuthSession>, request: NewRideRequest) -> Result<RideRequest> {
        self.insert(caller, "ride_requests", "*", &request).await
    }
}
