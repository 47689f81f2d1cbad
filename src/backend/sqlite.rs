//! Local store with the hosted project's table contracts, for development
//! without a project and for tests. There is no row-level security here, so
//! the caller's session is not consulted.

use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, sqlite::SqlitePoolOptions};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    backend::{AuthSession, DataStore},
    error::{CarpoolError, Result},
    model::{
        NewProfile, NewRideRequest, Profile, Ride, RideFilter, RideInsert, RidePosting, RideRequest,
        RideStatus, format_date, format_time, parse_date, parse_time,
    },
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL,
    university TEXT NOT NULL DEFAULT 'Iqra University',
    phone TEXT,
    rating REAL NOT NULL DEFAULT 0,
    total_rides INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rides (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL REFERENCES profiles(id),
    from_location TEXT NOT NULL,
    to_location TEXT NOT NULL,
    departure_date TEXT NOT NULL,
    departure_time TEXT NOT NULL,
    available_seats INTEGER NOT NULL,
    total_seats INTEGER NOT NULL,
    price_per_person REAL NOT NULL DEFAULT 0,
    preferences TEXT NOT NULL DEFAULT '[]',
    additional_notes TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'cancelled')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS rides_departure ON rides (status, departure_date, departure_time);

CREATE TABLE IF NOT EXISTS ride_requests (
    id TEXT PRIMARY KEY,
    ride_id TEXT NOT NULL REFERENCES rides(id),
    passenger_id TEXT NOT NULL REFERENCES profiles(id),
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted', 'rejected')),
    message TEXT,
    created_at TEXT NOT NULL
);
"#;

const RIDE_COLUMNS: &str = "SELECT r.id, r.driver_id, r.from_location, r.to_location, \
    r.departure_date, r.departure_time, r.available_seats, r.total_seats, r.price_per_person, \
    r.preferences, r.additional_notes, r.status, r.created_at, r.updated_at, \
    p.id AS d_id, p.full_name AS d_full_name, p.email AS d_email, p.university AS d_university, \
    p.phone AS d_phone, p.rating AS d_rating, p.total_rides AS d_total_rides, \
    p.created_at AS d_created_at, p.updated_at AS d_updated_at \
    FROM rides r LEFT JOIN profiles p ON p.id = r.driver_id";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Constraint violations come back as store errors, like the hosted service's.
fn store_err(err: sqlx::Error) -> CarpoolError {
    match err {
        sqlx::Error::Database(db) => CarpoolError::Store {
            code: db.code().map(|code| code.into_owned()),
            message: db.message().to_owned(),
        },
        other => CarpoolError::Database(other),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| CarpoolError::Parse(format!("bad id `{s}`: {e}")))
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| CarpoolError::Parse(format!("bad timestamp `{s}`: {e}")))
}

fn now() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| CarpoolError::Parse(e.to_string()))
}

#[derive(FromRow)]
struct ProfileRow {
    id: String,
    full_name: String,
    email: String,
    university: String,
    phone: Option<String>,
    rating: f64,
    total_rides: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = CarpoolError;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            id: parse_uuid(&row.id)?,
            full_name: row.full_name,
            email: row.email,
            university: row.university,
            phone: row.phone,
            rating: row.rating,
            total_rides: row.total_rides,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct RideRow {
    id: String,
    driver_id: String,
    from_location: String,
    to_location: String,
    departure_date: String,
    departure_time: String,
    available_seats: i32,
    total_seats: i32,
    price_per_person: f64,
    preferences: String,
    additional_notes: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,

    d_id: Option<String>,
    d_full_name: Option<String>,
    d_email: Option<String>,
    d_university: Option<String>,
    d_phone: Option<String>,
    d_rating: Option<f64>,
    d_total_rides: Option<i64>,
    d_created_at: Option<String>,
    d_updated_at: Option<String>,
}

impl TryFrom<RideRow> for Ride {
    type Error = CarpoolError;

    fn try_from(row: RideRow) -> Result<Self> {
        let driver = match row.d_id {
            Some(id) => Some(Profile::try_from(ProfileRow {
                id,
                full_name: row.d_full_name.unwrap_or_default(),
                email: row.d_email.unwrap_or_default(),
                university: row.d_university.unwrap_or_default(),
                phone: row.d_phone,
                rating: row.d_rating.unwrap_or_default(),
                total_rides: row.d_total_rides.unwrap_or_default(),
                created_at: row.d_created_at.unwrap_or_default(),
                updated_at: row.d_updated_at.unwrap_or_default(),
            })?),
            None => None,
        };

        let posting = RidePosting {
            id: parse_uuid(&row.id)?,
            driver_id: parse_uuid(&row.driver_id)?,
            from_location: row.from_location,
            to_location: row.to_location,
            departure_date: parse_date(&row.departure_date).map_err(|e| CarpoolError::Parse(e.to_string()))?,
            departure_time: parse_time(&row.departure_time).map_err(|e| CarpoolError::Parse(e.to_string()))?,
            available_seats: row.available_seats,
            total_seats: row.total_seats,
            price_per_person: row.price_per_person,
            preferences: serde_json::from_str(&row.preferences)?,
            additional_notes: row.additional_notes,
            status: row.status.parse::<RideStatus>().map_err(CarpoolError::Parse)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        };

        Ok(Ride { posting, driver })
    }
}

#[derive(FromRow)]
struct RequestRow {
    id: String,
    ride_id: String,
    passenger_id: String,
    status: String,
    message: Option<String>,
    created_at: String,
}

impl TryFrom<RequestRow> for RideRequest {
    type Error = CarpoolError;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(RideRequest {
            id: parse_uuid(&row.id)?,
            ride_id: parse_uuid(&row.ride_id)?,
            passenger_id: parse_uuid(&row.passenger_id)?,
            status: row.status.parse().map_err(CarpoolError::Parse)?,
            message: row.message,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl SqliteStore {
    /// Opens the database and creates the tables if needed.
    ///
    /// An in-memory database lives only as long as its connection, so it
    /// gets a single connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(16)
                .connect(url)
                .await?
        };

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!(url, "local store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_ride(&self, id: &str) -> Result<Ride> {
        let row: RideRow = sqlx::query_as(&format!("{RIDE_COLUMNS} WHERE r.id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        row.try_into()
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn find_profile(&self, _caller: Option<&AuthSession>, id: Uuid) -> Result<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as("SELECT * FROM profiles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(Profile::try_from).transpose()
    }

    async fn insert_profile(&self, _caller: Option<&AuthSession>, profile: NewProfile) -> Result<Profile> {
        let now = now()?;
        let row: ProfileRow = sqlx::query_as(
            "INSERT INTO profiles (id,full_name,email,university,created_at,updated_at) \
             VALUES (?,?,?,?,?,?) RETURNING *",
        )
        .bind(profile.id.to_string())
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(&profile.university)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        row.try_into()
    }

    /// Status and dates are filtered in SQL. Place names are matched
    /// afterwards with Unicode case folding: SQLite's `lower()` and `LIKE`
    /// only fold ASCII and would treat `%` and `_` in the input as wildcards.
    async fn list_rides(&self, _caller: Option<&AuthSession>, filter: &RideFilter) -> Result<Vec<Ride>> {
        let mut query = QueryBuilder::<Sqlite>::new(RIDE_COLUMNS);
        query
            .push(" WHERE r.status = ")
            .push_bind(RideStatus::Active.as_str())
            .push(" AND r.departure_date >= ")
            .push_bind(format_date(filter.on_or_after));
        if let Some(date) = filter.date {
            query
                .push(" AND r.departure_date = ")
                .push_bind(format_date(date));
        }
        query.push(" ORDER BY r.departure_date ASC, r.departure_time ASC");

        debug!(sql = query.sql(), "list rides");
        let rows: Vec<RideRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut rides = Vec::with_capacity(rows.len());
        for row in rows {
            let ride = Ride::try_from(row)?;
            if filter.matches_places(&ride.posting) {
                rides.push(ride);
            }
        }
        Ok(rides)
    }

    async fn insert_ride(&self, _caller: Option<&AuthSession>, insert: RideInsert) -> Result<Ride> {
        let id = Uuid::now_v7().to_string();
        let now = now()?;
        let ride = insert.ride;
        sqlx::query(
            "INSERT INTO rides (id,driver_id,from_location,to_location,departure_date,departure_time,\
             available_seats,total_seats,price_per_person,preferences,additional_notes,created_at,updated_at) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&id)
        .bind(insert.driver_id.to_string())
        .bind(&ride.from_location)
        .bind(&ride.to_location)
        .bind(format_date(ride.departure_date))
        .bind(format_time(ride.departure_time))
        .bind(ride.available_seats)
        .bind(ride.total_seats)
        .bind(ride.price_per_person)
        .bind(serde_json::to_string(&ride.preferences)?)
        .bind(&ride.additional_notes)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        self.fetch_ride(&id).await
    }

    async fn insert_ride_request(&self, _caller: Option<&AuthSession>, request: NewRideRequest) -> Result<RideRequest> {
        let row: RequestRow = sqlx::query_as(
            "INSERT INTO ride_requests (id,ride_id,passenger_id,message,created_at) \
             VALUES (?,?,?,?,?) RETURNING *",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(request.ride_id.to_string())
        .bind(request.passenger_id.to_string())
        .bind(&request.message)
        .bind(now()?)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        row.try_into()
    }
}
