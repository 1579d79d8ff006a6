//! Point-in-time insurance checks: the queue payload, the registry port and
//! the consumer loop that drives claimed items through the external lookup.

pub mod memory;
pub mod pg;
pub mod runner;
pub mod sim;

pub use memory::InMemoryCheckJobStore;
pub use pg::PgCheckJobStore;
pub use runner::{CheckRunner, RunnerConfig};
pub use sim::SimulatedRegistry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Queue kind used for insurance checks.
pub const INSURANCE_CHECK_KIND: &str = "insurance-check";

/// One "check plate X as of date Y" payload, linked 1:1 to a work item.
/// Result fields are written once when the lookup resolves and never cleared;
/// the append-only history is what the renewal search bisects over.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct CheckJob {
    pub id: Uuid,
    pub work_item_id: Uuid,
    pub tracking_id: Option<Uuid>,
    pub plate_number: String,
    pub target_date: DateTime<Utc>,
    pub has_coverage: Option<bool>,
    pub company: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub raw_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CheckJob {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Coverage presence; an unresolved or "no data" result counts as none.
    pub fn coverage(&self) -> bool {
        self.has_coverage.unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct NewCheckJob {
    pub work_item_id: Uuid,
    /// Back-reference to the owning tracking; none for standalone checks.
    pub tracking_id: Option<Uuid>,
    pub plate_number: String,
    pub target_date: DateTime<Utc>,
}

/// A resolved registry lookup. "No data found" is a valid resolution with
/// `has_coverage == false` and empty detail fields.
#[derive(Debug, Clone)]
pub struct ResolvedCheck {
    pub has_coverage: bool,
    pub company: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub raw_text: String,
}

impl ResolvedCheck {
    pub fn not_found(raw_text: impl Into<String>) -> Self {
        Self {
            has_coverage: false,
            company: None,
            vehicle_brand: None,
            vehicle_model: None,
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Resolved(ResolvedCheck),
    /// The registry refused the query for today; retry tomorrow, off-peak.
    RateLimited,
}

/// External registry collaborator. How the result is produced (browser
/// automation, API) is invisible here; transport and parse failures surface
/// as `Err` and are treated as transient by the consumer loop.
#[async_trait]
pub trait InsuranceCheck: Send + Sync {
    async fn check(&self, plate: &str, target_date: DateTime<Utc>)
        -> anyhow::Result<CheckOutcome>;
}

#[async_trait]
pub trait CheckJobStore: Send + Sync {
    async fn create(&self, job: NewCheckJob) -> anyhow::Result<Uuid>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<CheckJob>>;

    async fn find_by_work_item(&self, work_item_id: Uuid) -> anyhow::Result<Option<CheckJob>>;

    /// Write the result fields and stamp `resolved_at`. Append-once.
    async fn record_result(&self, id: Uuid, result: &ResolvedCheck) -> anyhow::Result<()>;

    /// Resolved jobs for a tracking, ordered by target date ascending.
    async fn resolved_for_tracking(&self, tracking_id: Uuid) -> anyhow::Result<Vec<CheckJob>>;

    /// Check jobs created for a plate on the given (UTC) day, for the
    /// daily-quota guard.
    async fn count_created_on(&self, plate: &str, day: NaiveDate) -> anyhow::Result<i64>;
}
