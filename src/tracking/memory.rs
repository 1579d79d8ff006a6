use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::tracking::{Phase, RenewalTracking, TrackingStore};

pub struct InMemoryTrackingStore {
    trackings: Mutex<HashMap<Uuid, RenewalTracking>>,
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self {
            trackings: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn create(&self, vehicle_id: Uuid) -> anyhow::Result<RenewalTracking> {
        let mut trackings = self.trackings.lock().await;

        if trackings
            .values()
            .any(|t| t.vehicle_id == vehicle_id && !t.is_completed())
        {
            anyhow::bail!("active tracking already exists for vehicle {vehicle_id}");
        }

        let tracking = RenewalTracking {
            id: Uuid::new_v4(),
            vehicle_id,
            phase: Phase::Initial.as_str().to_string(),
            next_check_date: Some(Utc::now()),
            checks_performed: 0,
            estimated_day: None,
            estimated_month: None,
            window_start: None,
            window_end: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        trackings.insert(tracking.id, tracking.clone());
        Ok(tracking)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<RenewalTracking>> {
        Ok(self.trackings.lock().await.get(&id).cloned())
    }

    async fn find_active_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> anyhow::Result<Option<RenewalTracking>> {
        Ok(self
            .trackings
            .lock()
            .await
            .values()
            .find(|t| t.vehicle_id == vehicle_id && !t.is_completed())
            .cloned())
    }

    async fn latest_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> anyhow::Result<Option<RenewalTracking>> {
        Ok(self
            .trackings
            .lock()
            .await
            .values()
            .filter(|t| t.vehicle_id == vehicle_id)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn update(&self, tracking: &RenewalTracking) -> anyhow::Result<()> {
        let mut trackings = self.trackings.lock().await;
        if !trackings.contains_key(&tracking.id) {
            anyhow::bail!("unknown tracking {}", tracking.id);
        }
        trackings.insert(tracking.id, tracking.clone());
        Ok(())
    }

    async fn in_phase(&self, phase: Phase) -> anyhow::Result<Vec<RenewalTracking>> {
        Ok(self
            .trackings
            .lock()
            .await
            .values()
            .filter(|t| t.phase() == Some(phase))
            .cloned()
            .collect())
    }
}
