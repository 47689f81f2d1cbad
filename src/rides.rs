//! Ride directory: listing, searching, posting and joining rides.

use time::Date;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    backend::{AuthSession, Backend},
    error::Result,
    model::{NewRide, NewRideRequest, Ride, RideFilter, RideInsert, RideRequest, today},
};

pub struct RideDirectory {
    backend: Backend,
    rides: RwLock<Vec<Ride>>,
}

/// Earliest departure first; ties keep the store's order.
pub fn sort_by_departure(rides: &mut [Ride]) {
    rides.sort_by_key(Ride::departs);
}

impl RideDirectory {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            rides: RwLock::new(Vec::new()),
        }
    }

    /// The list as of the last successful fetch.
    pub async fn rides(&self) -> Vec<Ride> {
        self.rides.read().await.clone()
    }

    pub async fn list_active_upcoming(&self, caller: Option<&AuthSession>) -> Vec<Ride> {
        self.refresh(caller, RideFilter::upcoming(today())).await
    }

    /// Substring filters ignore case; an empty string is no filter.
    pub async fn search(
        &self,
        caller: Option<&AuthSession>,
        from: Option<&str>,
        to: Option<&str>,
        date: Option<Date>,
    ) -> Vec<Ride> {
        let filter = RideFilter::upcoming(today())
            .with_from(from)
            .with_to(to)
            .with_date(date);
        if filter.is_unfiltered() {
            debug!("search without filters lists everything upcoming");
        }
        self.refresh(caller, filter).await
    }

    /// Read path: on failure the previous list stays.
    async fn refresh(&self, caller: Option<&AuthSession>, filter: RideFilter) -> Vec<Ride> {
        debug!(?filter, "fetching rides");
        match self.backend.store.list_rides(caller, &filter).await {
            Ok(mut rides) => {
                sort_by_departure(&mut rides);
                *self.rides.write().await = rides.clone();
                rides
            }
            Err(e) => {
                error!("error fetching rides: {e}");
                self.rides().await
            }
        }
    }

    /// Posts a ride owned by the signed-in `driver`.
    pub async fn create_posting(&self, driver: &AuthSession, ride: NewRide) -> Result<Ride> {
        let driver_id = driver.user.id;
        debug!(%driver_id, ?ride, "creating ride");
        let created = self
            .backend
            .store
            .insert_ride(Some(driver), RideInsert { ride, driver_id })
            .await?;
        info!(ride_id = %created.posting.id, %driver_id, "ride created");

        self.list_active_upcoming(Some(driver)).await;
        Ok(created)
    }

    /// Asks to join as the signed-in `passenger`. Seats are not checked or
    /// reserved, and repeat requests are not deduplicated.
    pub async fn request_to_join(&self, passenger: &AuthSession, posting_id: Uuid, message: &str) -> Result<RideRequest> {
        let passenger_id = passenger.user.id;
        let request = self
            .backend
            .store
            .insert_ride_request(
                Some(passenger),
                NewRideRequest {
                    ride_id: posting_id,
                    passenger_id,
                    message: message.to_owned(),
                },
            )
            .await?;
        info!(request_id = %request.id, ride_id = %posting_id, %passenger_id, "ride requested");
        Ok(request)
    }
}
