//! Qualifying events emitted when a search converges or finds no coverage,
//! and the hand-off to the external notification pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadReason {
    /// First check found no active coverage at all.
    NoCoverage,
    /// The renewal window was bracketed tightly enough to report.
    RenewalWindow,
}

impl LeadReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadReason::NoCoverage => "no_coverage",
            LeadReason::RenewalWindow => "renewal_window",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub plate_number: String,
    pub reason: String,
    pub note: Option<String>,
    pub converted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub vehicle_id: Uuid,
    pub plate_number: String,
    pub reason: LeadReason,
    pub note: String,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn create(&self, lead: NewLead) -> anyhow::Result<Uuid>;

    async fn for_vehicle(&self, vehicle_id: Uuid) -> anyhow::Result<Vec<Lead>>;

    async fn mark_converted(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Outbound notification collaborator. Fire-and-forget from the core's
/// perspective; delivery retries and the approval workflow live behind it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, reason: LeadReason, vehicle_id: Uuid, note: &str) -> anyhow::Result<()>;
}

/// Default sender when no delivery pipeline is wired: logs the hand-off.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, reason: LeadReason, vehicle_id: Uuid, note: &str) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "reason": reason.as_str(),
            "vehicle_id": vehicle_id,
            "note": note,
        });
        info!(payload = %payload, "lead notification");
        Ok(())
    }
}

/// Writes the immutable qualifying record, then hands off to the notifier
/// exactly once. Duplicate emission per tracking cannot occur because the
/// phase sequence is monotonic.
#[derive(Clone)]
pub struct LeadEmitter {
    leads: Arc<dyn LeadStore>,
    notifier: Arc<dyn Notifier>,
}

impl LeadEmitter {
    pub fn new(leads: Arc<dyn LeadStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { leads, notifier }
    }

    pub async fn emit(
        &self,
        vehicle_id: Uuid,
        plate: &str,
        reason: LeadReason,
        note: &str,
    ) -> anyhow::Result<Uuid> {
        let id = self
            .leads
            .create(NewLead {
                vehicle_id,
                plate_number: plate.to_string(),
                reason,
                note: note.to_string(),
            })
            .await?;

        info!(lead = %id, plate, reason = reason.as_str(), "lead recorded");

        // Delivery failures are the collaborator's problem; the lead row is
        // already durable.
        if let Err(e) = self.notifier.notify(reason, vehicle_id, note).await {
            warn!(lead = %id, error = %e, "lead notification failed");
        }

        Ok(id)
    }
}

#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn create(&self, lead: NewLead) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO leads (vehicle_id, plate_number, reason, note)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(lead.vehicle_id)
        .bind(&lead.plate_number)
        .bind(lead.reason.as_str())
        .bind(&lead.note)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn for_vehicle(&self, vehicle_id: Uuid) -> anyhow::Result<Vec<Lead>> {
        let leads = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE vehicle_id = $1 ORDER BY created_at DESC",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(leads)
    }

    async fn mark_converted(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE leads SET converted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct InMemoryLeadStore {
    leads: Mutex<HashMap<Uuid, Lead>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self {
            leads: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn create(&self, lead: NewLead) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let row = Lead {
            id,
            vehicle_id: lead.vehicle_id,
            plate_number: lead.plate_number,
            reason: lead.reason.as_str().to_string(),
            note: Some(lead.note),
            converted: false,
            created_at: Utc::now(),
        };
        self.leads.lock().await.insert(id, row);
        Ok(id)
    }

    async fn for_vehicle(&self, vehicle_id: Uuid) -> anyhow::Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .lock()
            .await
            .values()
            .filter(|l| l.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        leads.sort_by_key(|l| std::cmp::Reverse(l.created_at));
        Ok(leads)
    }

    async fn mark_converted(&self, id: Uuid) -> anyhow::Result<()> {
        let mut leads = self.leads.lock().await;
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown lead {id}"))?;
        lead.converted = true;
        Ok(())
    }
}
