//! Ride directory against a SQLite store.

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use carpool::{
    CarpoolError, RideDirectory,
    backend::{AuthSession, Backend, DataStore, SqliteStore},
    error::Result,
    model::{
        NewProfile, NewRideRequest, Profile, RequestStatus, Ride, RideFilter, RideInsert, RideRequest,
        format_date, today,
    },
};
use common::{count, driver, fixture, in_days, new_ride, session_for};
use time::macros::time;
use uuid::Uuid;

fn is_sorted(rides: &[Ride]) -> bool {
    rides.windows(2).all(|pair| pair[0].departs() <= pair[1].departs())
}

#[tokio::test]
async fn lists_only_active_upcoming_in_departure_order() {
    let fx = common::fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());
    let ali = driver(&fx.store, "Ali Raza").await;

    let later = rides
        .create_posting(&session_for(&ali), new_ride("Gulshan", "Main Campus", in_days(3), time!(9:00)))
        .await
        .unwrap();
    let evening = rides
        .create_posting(&session_for(&ali), new_ride("Clifton", "Main Campus", in_days(1), time!(18:30)))
        .await
        .unwrap();
    let morning = rides
        .create_posting(&session_for(&ali), new_ride("DHA", "Main Campus", in_days(1), time!(7:15)))
        .await
        .unwrap();
    let today_ride = rides
        .create_posting(&session_for(&ali), new_ride("Saddar", "Main Campus", today(), time!(23:59)))
        .await
        .unwrap();
    let past = rides
        .create_posting(&session_for(&ali), new_ride("Korangi", "Main Campus", in_days(-1), time!(8:00)))
        .await
        .unwrap();
    let cancelled = rides
        .create_posting(&session_for(&ali), new_ride("Malir", "Main Campus", in_days(2), time!(8:00)))
        .await
        .unwrap();
    sqlx::query("UPDATE rides SET status = 'cancelled' WHERE id = ?")
        .bind(cancelled.posting.id.to_string())
        .execute(fx.store.pool())
        .await
        .unwrap();

    let listed = rides.list_active_upcoming(None).await;
    let ids: Vec<_> = listed.iter().map(|r| r.posting.id).collect();
    assert_eq!(
        ids,
        [today_ride.posting.id, morning.posting.id, evening.posting.id, later.posting.id]
    );
    assert!(!ids.contains(&past.posting.id));
    assert!(is_sorted(&listed));
    assert_eq!(rides.rides().await, listed);
}

#[tokio::test]
async fn created_posting_is_listed_once_with_driver() {
    let fx = fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());
    let ayesha = driver(&fx.store, "Ayesha Khan").await;

    let mut ride = new_ride("North Campus", "Clifton", in_days(2), time!(7:45));
    ride.available_seats = 2;
    ride.total_seats = 2;
    ride.price_per_person = 100.0;
    let created = rides.create_posting(&session_for(&ayesha), ride).await.unwrap();
    assert_eq!(created.driver.as_ref(), Some(&ayesha));
    assert_eq!(created.posting.preferences, ["No Smoking"]);

    let listed = rides.list_active_upcoming(None).await;
    let matching: Vec<_> = listed.iter().filter(|r| r.posting.id == created.posting.id).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].driver.as_ref().map(|d| d.id), Some(ayesha.id));
    assert_eq!(matching[0].posting.available_seats, 2);
    assert_eq!(matching[0].posting.price_per_person, 100.0);
}

#[tokio::test]
async fn search_matches_substrings_ignoring_case() {
    let fx = fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());
    let ali = driver(&fx.store, "Ali").await;

    for (from, to) in [
        ("North Campus", "Clifton"),
        ("campside", "Saddar"),
        ("CAMPUS Road", "Clifton Block 5"),
        ("Gulshan", "Main Campus"),
    ] {
        rides
            .create_posting(&session_for(&ali), new_ride(from, to, in_days(1), time!(8:00)))
            .await
            .unwrap();
    }

    let found = rides.search(None, Some("camp"), None, None).await;
    let mut origins: Vec<_> = found.iter().map(|r| r.posting.from_location.as_str()).collect();
    origins.sort();
    assert_eq!(origins, ["CAMPUS Road", "North Campus", "campside"]);

    let found = rides.search(None, Some("camp"), Some("clifton"), None).await;
    assert_eq!(found.len(), 2);

    let found = rides.search(None, None, Some("saddar"), None).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].posting.from_location, "campside");
}

#[tokio::test]
async fn search_text_is_literal_and_folds_unicode() {
    let fx = fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());
    let ali = driver(&fx.store, "Ali").await;

    for from in ["100% Chowk", "1 Block C", "ÇAMLICA Gate_2", "Gatex2"] {
        rides
            .create_posting(&session_for(&ali), new_ride(from, "Main Campus", in_days(1), time!(8:00)))
            .await
            .unwrap();
    }
    let origins = |found: Vec<Ride>| -> Vec<String> {
        found.into_iter().map(|r| r.posting.from_location).collect()
    };

    assert_eq!(origins(rides.search(None, Some("100%"), None, None).await), ["100% Chowk"]);
    assert!(rides.search(None, Some("1%c"), None, None).await.is_empty());
    assert_eq!(origins(rides.search(None, Some("gate_2"), None, None).await), ["ÇAMLICA Gate_2"]);
    assert_eq!(origins(rides.search(None, Some("çamlica"), None, None).await), ["ÇAMLICA Gate_2"]);
}

#[tokio::test]
async fn search_by_exact_date_and_empty_filters() {
    let fx = fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());
    let ali = driver(&fx.store, "Ali").await;

    for days in [1, 2, 2, 5] {
        rides
            .create_posting(&session_for(&ali), new_ride("A", "B", in_days(days), time!(8:00)))
            .await
            .unwrap();
    }

    let found = rides.search(None, None, None, Some(in_days(2))).await;
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|r| r.posting.departure_date == in_days(2)));

    // a past date can never match the upcoming cutoff
    assert!(rides.search(None, None, None, Some(in_days(-3))).await.is_empty());

    let everything = rides.search(None, Some(""), Some(""), None).await;
    assert_eq!(everything, rides.list_active_upcoming(None).await);
    assert_eq!(everything.len(), 4);
    assert!(is_sorted(&everything));
}

#[tokio::test]
async fn concurrent_requests_for_last_seat_both_succeed() {
    let fx = fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());
    let ali = driver(&fx.store, "Ali").await;
    let sara = driver(&fx.store, "Sara").await;
    let zain = driver(&fx.store, "Zain").await;

    let mut ride = new_ride("A", "B", in_days(1), time!(8:00));
    ride.available_seats = 1;
    ride.total_seats = 1;
    let ride = rides.create_posting(&session_for(&ali), ride).await.unwrap();

    let sara_session = session_for(&sara);
    let zain_session = session_for(&zain);
    let (a, b) = tokio::join!(
        rides.request_to_join(&sara_session, ride.posting.id, "Can I join?"),
        rides.request_to_join(&zain_session, ride.posting.id, ""),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id, b.id);
    assert_eq!(a.status, RequestStatus::Pending);
    assert_eq!(a.message.as_deref(), Some("Can I join?"));

    // same passenger again is not deduplicated either
    rides.request_to_join(&session_for(&sara), ride.posting.id, "").await.unwrap();
    assert_eq!(count(&fx.store, "ride_requests").await, 3);

    // seats are untouched
    let listed = rides.list_active_upcoming(None).await;
    assert_eq!(listed[0].posting.available_seats, 1);
}

#[tokio::test]
async fn write_failures_surface_store_errors() {
    let fx = fixture().await;
    let rides = RideDirectory::new(fx.backend.clone());

    let stranger = session_for(&Profile {
        id: Uuid::now_v7(),
        ..driver(&fx.store, "Nobody").await
    });
    let err = rides
        .create_posting(&stranger, new_ride("A", "B", in_days(1), time!(8:00)))
        .await
        .unwrap_err();
    assert!(matches!(err, CarpoolError::Store { .. }), "{err:?}");

    let err = rides
        .request_to_join(&stranger, Uuid::now_v7(), "")
        .await
        .unwrap_err();
    assert!(matches!(err, CarpoolError::Store { .. }), "{err:?}");
}

/// Store that can be switched to fail every read.
struct FlakyStore {
    inner: SqliteStore,
    down: AtomicBool,
}

#[async_trait]
impl DataStore for FlakyStore {
    async fn find_profile(&self, caller: Option<&AuthSession>, id: Uuid) -> Result<Option<Profile>> {
        self.inner.find_profile(caller, id).await
    }

    async fn insert_profile(&self, caller: Option<&AuthSession>, profile: NewProfile) -> Result<Profile> {
        self.inner.insert_profile(caller, profile).await
    }

    async fn list_rides(&self, caller: Option<&AuthSession>, filter: &RideFilter) -> Result<Vec<Ride>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CarpoolError::Store {
                code: None,
                message: format!("unavailable for {}", format_date(filter.on_or_after)),
            });
        }
        self.inner.list_rides(caller, filter).await
    }

    async fn insert_ride(&self, caller: Option<&AuthSession>, ride: RideInsert) -> Result<Ride> {
        self.inner.insert_ride(caller, ride).await
    }

    async fn insert_ride_request(
        &self,
        caller: Option<&AuthSession>,
        request: NewRideRequest,
    ) -> Result<RideRequest> {
        self.inner.insert_ride_request(caller, request).await
    }
}

#[tokio::test]
async fn read_failures_keep_previous_list() {
    let fx = fixture().await;
    let store = Arc::new(FlakyStore {
        inner: (*fx.store).clone(),
        down: AtomicBool::new(false),
    });
    let rides = RideDirectory::new(Backend::new(fx.auth.clone(), store.clone()));
    let ali = driver(&fx.store, "Ali").await;

    rides
        .create_posting(&session_for(&ali), new_ride("A", "B", in_days(1), time!(8:00)))
        .await
        .unwrap();
    let before = rides.list_active_upcoming(None).await;
    assert_eq!(before.len(), 1);

    store.down.store(true, Ordering::SeqCst);
    assert_eq!(rides.list_active_upcoming(None).await, before);
    assert_eq!(rides.search(None, Some("zzz"), None, None).await, before);
    assert_eq!(rides.rides().await, before);
}
