//! Vehicle identity records: the anchor a tracking and its leads point at.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub plate_number: String,
    pub phone_number: Option<String>,
    pub estimated_renewal_day: Option<i32>,
    pub estimated_renewal_month: Option<i32>,
    pub last_confirmed_renewal: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn find_by_plate(&self, plate: &str) -> anyhow::Result<Option<Vehicle>>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vehicle>>;

    async fn create(&self, plate: &str, phone: Option<&str>) -> anyhow::Result<Vehicle>;

    /// Record the converged renewal estimate.
    async fn record_estimate(
        &self,
        id: Uuid,
        day: u32,
        month: u32,
        confirmed: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgVehicleStore {
    pool: PgPool,
}

impl PgVehicleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VehicleStore for PgVehicleStore {
    async fn find_by_plate(&self, plate: &str) -> anyhow::Result<Option<Vehicle>> {
        let vehicle =
            sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE plate_number = $1")
                .bind(plate)
                .fetch_optional(&self.pool)
                .await?;
        Ok(vehicle)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vehicle>> {
        let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(vehicle)
    }

    async fn create(&self, plate: &str, phone: Option<&str>) -> anyhow::Result<Vehicle> {
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            INSERT INTO vehicles (plate_number, phone_number)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(plate)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(vehicle)
    }

    async fn record_estimate(
        &self,
        id: Uuid,
        day: u32,
        month: u32,
        confirmed: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE vehicles
            SET estimated_renewal_day = $2,
                estimated_renewal_month = $3,
                last_confirmed_renewal = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(day as i32)
        .bind(month as i32)
        .bind(confirmed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct InMemoryVehicleStore {
    vehicles: Mutex<HashMap<Uuid, Vehicle>>,
}

impl InMemoryVehicleStore {
    pub fn new() -> Self {
        Self {
            vehicles: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVehicleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VehicleStore for InMemoryVehicleStore {
    async fn find_by_plate(&self, plate: &str) -> anyhow::Result<Option<Vehicle>> {
        Ok(self
            .vehicles
            .lock()
            .await
            .values()
            .find(|v| v.plate_number == plate)
            .cloned())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vehicle>> {
        Ok(self.vehicles.lock().await.get(&id).cloned())
    }

    async fn create(&self, plate: &str, phone: Option<&str>) -> anyhow::Result<Vehicle> {
        let mut vehicles = self.vehicles.lock().await;
        if vehicles.values().any(|v| v.plate_number == plate) {
            anyhow::bail!("vehicle already exists for plate {plate}");
        }

        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            plate_number: plate.to_string(),
            phone_number: phone.map(str::to_string),
            estimated_renewal_day: None,
            estimated_renewal_month: None,
            last_confirmed_renewal: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        vehicles.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    async fn record_estimate(
        &self,
        id: Uuid,
        day: u32,
        month: u32,
        confirmed: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut vehicles = self.vehicles.lock().await;
        let vehicle = vehicles
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown vehicle {id}"))?;

        vehicle.estimated_renewal_day = Some(day as i32);
        vehicle.estimated_renewal_month = Some(month as i32);
        vehicle.last_confirmed_renewal = Some(confirmed);
        vehicle.updated_at = Some(Utc::now());
        Ok(())
    }
}
