//! Renewal-date discovery: per-vehicle tracking records and the multi-phase
//! search that drives which check to request next.

pub mod change;
pub mod memory;
pub mod pg;
pub mod service;
pub mod tracker;

pub use memory::InMemoryTrackingStore;
pub use pg::PgTrackingStore;
pub use service::{TrackingService, TrackingStarted};
pub use tracker::{RenewalTracker, TrackerConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Search phases, in order. A tracking only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Initial,
    YearSearch,
    MonthSearch,
    FinalCheck,
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initial => "initial",
            Phase::YearSearch => "year-search",
            Phase::MonthSearch => "month-search",
            Phase::FinalCheck => "final-check",
            Phase::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "initial" => Some(Phase::Initial),
            "year-search" => Some(Phase::YearSearch),
            "month-search" => Some(Phase::MonthSearch),
            "final-check" => Some(Phase::FinalCheck),
            "completed" => Some(Phase::Completed),
            _ => None,
        }
    }
}

/// One active or completed renewal-date search for a vehicle. At most one
/// non-completed tracking exists per vehicle (partial unique index backs
/// this in Postgres).
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct RenewalTracking {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub phase: String,
    pub next_check_date: Option<DateTime<Utc>>,
    pub checks_performed: i32,
    pub estimated_day: Option<i32>,
    pub estimated_month: Option<i32>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RenewalTracking {
    pub fn phase(&self) -> Option<Phase> {
        Phase::parse(&self.phase)
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == Some(Phase::Completed)
    }
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Insert a new tracking in phase Initial with the first check due now.
    async fn create(&self, vehicle_id: Uuid) -> anyhow::Result<RenewalTracking>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<RenewalTracking>>;

    async fn find_active_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> anyhow::Result<Option<RenewalTracking>>;

    /// Most recent tracking for the vehicle, active or completed.
    async fn latest_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> anyhow::Result<Option<RenewalTracking>>;

    async fn update(&self, tracking: &RenewalTracking) -> anyhow::Result<()>;

    async fn in_phase(&self, phase: Phase) -> anyhow::Result<Vec<RenewalTracking>>;
}
