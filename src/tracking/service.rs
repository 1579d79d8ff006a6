use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::tracking::{RenewalTracker, RenewalTracking, TrackingStore};
use crate::vehicle::VehicleStore;

#[derive(Debug, Clone)]
pub struct TrackingStarted {
    pub tracking_id: Uuid,
    pub vehicle_id: Uuid,
    /// An active search already existed; its id is returned unchanged.
    pub already_active: bool,
}

/// Operational surface: start tracking a plate, query its status.
#[derive(Clone)]
pub struct TrackingService {
    vehicles: Arc<dyn VehicleStore>,
    trackings: Arc<dyn TrackingStore>,
    tracker: Arc<RenewalTracker>,
}

impl TrackingService {
    pub fn new(
        vehicles: Arc<dyn VehicleStore>,
        trackings: Arc<dyn TrackingStore>,
        tracker: Arc<RenewalTracker>,
    ) -> Self {
        Self {
            vehicles,
            trackings,
            tracker,
        }
    }

    /// Create the vehicle if absent, open a tracking in phase Initial and
    /// enqueue the first check for "today". Returns the existing tracking
    /// when one is still active for the vehicle.
    pub async fn start_tracking(
        &self,
        plate: &str,
        phone: Option<&str>,
    ) -> anyhow::Result<TrackingStarted> {
        let vehicle = match self.vehicles.find_by_plate(plate).await? {
            Some(v) => v,
            None => {
                let v = self.vehicles.create(plate, phone).await?;
                info!(plate, vehicle = %v.id, "created vehicle");
                v
            }
        };

        if let Some(existing) = self.trackings.find_active_for_vehicle(vehicle.id).await? {
            warn!(plate, tracking = %existing.id, "active tracking already exists");
            return Ok(TrackingStarted {
                tracking_id: existing.id,
                vehicle_id: vehicle.id,
                already_active: true,
            });
        }

        let tracking = self.trackings.create(vehicle.id).await?;
        self.tracker
            .schedule_check(tracking.id, plate, Utc::now())
            .await?;

        info!(plate, tracking = %tracking.id, "started renewal tracking");
        Ok(TrackingStarted {
            tracking_id: tracking.id,
            vehicle_id: vehicle.id,
            already_active: false,
        })
    }

    /// Most recent tracking for a plate, if the vehicle is known.
    pub async fn tracking_status(&self, plate: &str) -> anyhow::Result<Option<RenewalTracking>> {
        let Some(vehicle) = self.vehicles.find_by_plate(plate).await? else {
            return Ok(None);
        };
        self.trackings.latest_for_vehicle(vehicle.id).await
    }
}
