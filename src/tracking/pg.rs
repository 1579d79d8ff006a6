use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::tracking::{Phase, RenewalTracking, TrackingStore};

#[derive(Clone)]
pub struct PgTrackingStore {
    pool: PgPool,
}

impl PgTrackingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingStore for PgTrackingStore {
    async fn create(&self, vehicle_id: Uuid) -> anyhow::Result<RenewalTracking> {
        // The partial unique index on (vehicle_id) WHERE phase <> 'completed'
        // is the backstop against a second active tracking racing in here.
        let tracking = sqlx::query_as::<_, RenewalTracking>(
            r#"
            INSERT INTO renewal_trackings (vehicle_id, phase, next_check_date)
            VALUES ($1, $2, now())
            RETURNING *
            "#,
        )
        .bind(vehicle_id)
        .bind(Phase::Initial.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(tracking)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<RenewalTracking>> {
        let tracking =
            sqlx::query_as::<_, RenewalTracking>("SELECT * FROM renewal_trackings WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tracking)
    }

    async fn find_active_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> anyhow::Result<Option<RenewalTracking>> {
        let tracking = sqlx::query_as::<_, RenewalTracking>(
            r#"
            SELECT *
            FROM renewal_trackings
            WHERE vehicle_id = $1
              AND phase <> 'completed'
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tracking)
    }

    async fn latest_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> anyhow::Result<Option<RenewalTracking>> {
        let tracking = sqlx::query_as::<_, RenewalTracking>(
            r#"
            SELECT *
            FROM renewal_trackings
            WHERE vehicle_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tracking)
    }

    async fn update(&self, tracking: &RenewalTracking) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE renewal_trackings
            SET phase = $2,
                next_check_date = $3,
                checks_performed = $4,
                estimated_day = $5,
                estimated_month = $6,
                window_start = $7,
                window_end = $8,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(tracking.id)
        .bind(&tracking.phase)
        .bind(tracking.next_check_date)
        .bind(tracking.checks_performed)
        .bind(tracking.estimated_day)
        .bind(tracking.estimated_month)
        .bind(tracking.window_start)
        .bind(tracking.window_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn in_phase(&self, phase: Phase) -> anyhow::Result<Vec<RenewalTracking>> {
        let trackings = sqlx::query_as::<_, RenewalTracking>(
            "SELECT * FROM renewal_trackings WHERE phase = $1",
        )
        .bind(phase.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(trackings)
    }
}
