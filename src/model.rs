use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Time, format_description::BorrowedFormatItem, macros::format_description};
use uuid::Uuid;

pub const UNIVERSITY: &str = "Iqra University";
pub const UNKNOWN_USER: &str = "Unknown User";

/// Offered by the create form. Postings may carry any tag.
pub const PREFERENCE_SUGGESTIONS: [&str; 6] = [
    "No Smoking",
    "Music OK",
    "Quiet Ride",
    "Pets OK",
    "Conversation Welcome",
    "No Pets",
];

pub const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
pub const TIME_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[hour]:[minute]:[second]");
const SHORT_TIME_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[hour]:[minute]");

pub fn parse_date(s: &str) -> Result<Date, time::error::Parse> {
    Date::parse(s, DATE_FORMAT)
}

/// Accepts `HH:MM:SS` from the store and `HH:MM` from time inputs.
pub fn parse_time(s: &str) -> Result<Time, time::error::Parse> {
    Time::parse(s, TIME_FORMAT).or_else(|_| Time::parse(s, SHORT_TIME_FORMAT))
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_default()
}

pub fn format_time(time: Time) -> String {
    time.format(TIME_FORMAT).unwrap_or_default()
}

pub(crate) mod serde_date {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).map_err(D::Error::custom)
    }
}

pub(crate) mod serde_time {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use time::Time;

    pub fn serialize<S: Serializer>(time: &Time, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Time, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub university: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_rides: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Row written the first time an authenticated user has no profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub university: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

macro_rules! status_str {
    ($T:ty { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $T {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $T {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(format!("unknown {} `{s}`", stringify!($T))),
                }
            }
        }
    };
}

status_str!(RideStatus { Active => "active", Completed => "completed", Cancelled => "cancelled" });
status_str!(RequestStatus { Pending => "pending", Accepted => "accepted", Rejected => "rejected" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidePosting {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub from_location: String,
    pub to_location: String,
    #[serde(with = "serde_date")]
    pub departure_date: Date,
    #[serde(with = "serde_time")]
    pub departure_time: Time,
    pub available_seats: i32,
    pub total_seats: i32,
    pub price_per_person: f64,
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    pub status: RideStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A posting as listed: the row plus its driver's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    #[serde(flatten)]
    pub posting: RidePosting,
    #[serde(default)]
    pub driver: Option<Profile>,
}

impl Ride {
    pub fn departs(&self) -> (Date, Time) {
        (self.posting.departure_date, self.posting.departure_time)
    }
}

/// Fields a driver fills in. Seats and price are not re-validated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRide {
    pub from_location: String,
    pub to_location: String,
    #[serde(with = "serde_date")]
    pub departure_date: Date,
    #[serde(with = "serde_time")]
    pub departure_time: Time,
    pub available_seats: i32,
    pub total_seats: i32,
    pub price_per_person: f64,
    pub preferences: Vec<String>,
    pub additional_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideInsert {
    #[serde(flatten)]
    pub ride: NewRide,
    pub driver_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub status: RequestStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRideRequest {
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub message: String,
}

/// Query over active postings departing on or after `on_or_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct RideFilter {
    pub on_or_after: Date,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<Date>,
}

impl RideFilter {
    pub fn upcoming(today: Date) -> Self {
        Self {
            on_or_after: today,
            from: None,
            to: None,
            date: None,
        }
    }

    /// Empty strings count as omitted.
    pub fn with_from(mut self, from: Option<&str>) -> Self {
        self.from = from.filter(|s| !s.is_empty()).map(str::to_owned);
        self
    }

    pub fn with_to(mut self, to: Option<&str>) -> Self {
        self.to = to.filter(|s| !s.is_empty()).map(str::to_owned);
        self
    }

    pub fn with_date(mut self, date: Option<Date>) -> Self {
        self.date = date;
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.date.is_none()
    }

    /// Case-insensitive substring match on origin and destination, the way
    /// `ilike '*x*'` matches. Characters in the needle are taken literally.
    pub fn matches_places(&self, posting: &RidePosting) -> bool {
        contains_folded(&posting.from_location, self.from.as_deref())
            && contains_folded(&posting.to_location, self.to.as_deref())
    }
}

fn contains_folded(haystack: &str, needle: Option<&str>) -> bool {
    needle.is_none_or(|needle| haystack.to_lowercase().contains(&needle.to_lowercase()))
}

/// UTC calendar date, the cutoff for "upcoming".
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}
