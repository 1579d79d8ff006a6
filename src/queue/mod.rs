//! Persistent, typed work queue with deferred execution and bounded retries.
//!
//! `WorkQueue` is the port every component talks to; the mechanism behind
//! `claim_next` (locking read, compare-and-swap) is an implementation detail
//! of the backend, the contract is not: no two callers ever receive the same
//! item, and a pending item deferred into the future is never claimable.

pub mod memory;
pub mod pg;

pub use memory::InMemoryWorkQueue;
pub use pg::PgWorkQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Processing => "processing",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct WorkItem {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub priority: i32,
    pub not_before: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub kind: String,
    pub priority: i32,
    pub not_before: Option<DateTime<Utc>>,
}

impl NewWorkItem {
    pub fn now(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            priority: 0,
            not_before: None,
        }
    }

    pub fn deferred(kind: &str, not_before: DateTime<Utc>) -> Self {
        Self {
            kind: kind.to_string(),
            priority: 0,
            not_before: Some(not_before),
        }
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Durable insert with status `pending`.
    async fn enqueue(&self, item: NewWorkItem) -> anyhow::Result<Uuid>;

    /// Atomically claim the oldest eligible `pending` item of `kind`
    /// (priority ascending, then creation time) and flip it to `processing`.
    /// An empty queue is a normal outcome, not an error.
    async fn claim_next(&self, kind: &str) -> anyhow::Result<Option<WorkItem>>;

    /// Terminal success. A repeat call on an already completed item is a
    /// logged no-op.
    async fn complete(&self, id: Uuid) -> anyhow::Result<()>;

    /// Terminal failure: records the error, bumps the retry counter.
    async fn fail(&self, id: Uuid, error: &str) -> anyhow::Result<()>;

    /// Return the item to `pending` with a new `not_before`. Used for known
    /// recoverable conditions instead of `fail`; bumps the retry counter and
    /// records the reason, payload untouched.
    async fn reschedule(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        reason: &str,
    ) -> anyhow::Result<()>;

    /// Return items stuck in `processing` longer than `stuck_after` to
    /// `pending`. Covers workers that died mid-claim; returns the count.
    async fn reclaim_stuck(&self, stuck_after: chrono::Duration) -> anyhow::Result<u64>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<WorkItem>>;
}
