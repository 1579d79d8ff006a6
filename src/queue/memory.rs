use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::queue::{NewWorkItem, WorkItem, WorkQueue, WorkStatus};

/// In-memory queue backend. One mutex over the whole map gives the same
/// claim exclusivity the Postgres locking read provides; used by tests and
/// embeddable runs.
pub struct InMemoryWorkQueue {
    items: Mutex<HashMap<Uuid, WorkItem>>,
    claim_tolerance: Duration,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            claim_tolerance: Duration::zero(),
        }
    }

    pub fn with_claim_tolerance(mut self, tolerance: Duration) -> Self {
        self.claim_tolerance = tolerance;
        self
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, item: NewWorkItem) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let row = WorkItem {
            id,
            kind: item.kind,
            status: WorkStatus::Pending.as_str().to_string(),
            priority: item.priority,
            not_before: item.not_before,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.items.lock().await.insert(id, row);
        Ok(id)
    }

    async fn claim_next(&self, kind: &str) -> anyhow::Result<Option<WorkItem>> {
        let horizon = Utc::now() + self.claim_tolerance;
        let mut items = self.items.lock().await;

        let next = items
            .values()
            .filter(|i| {
                i.kind == kind
                    && i.status == WorkStatus::Pending.as_str()
                    && i.not_before.map_or(true, |nb| nb <= horizon)
            })
            .min_by_key(|i| (i.priority, i.created_at))
            .map(|i| i.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let item = items
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("claimed item vanished"))?;
        item.status = WorkStatus::Processing.as_str().to_string();
        item.started_at = Some(Utc::now());

        Ok(Some(item.clone()))
    }

    async fn complete(&self, id: Uuid) -> anyhow::Result<()> {
        let mut items = self.items.lock().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown work item {id}"))?;

        if item.status == WorkStatus::Completed.as_str() {
            debug!(work_item = %id, "complete on already completed item, ignoring");
            return Ok(());
        }

        item.status = WorkStatus::Completed.as_str().to_string();
        item.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> anyhow::Result<()> {
        let mut items = self.items.lock().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown work item {id}"))?;

        item.status = WorkStatus::Failed.as_str().to_string();
        item.retry_count += 1;
        item.last_error = Some(error.to_string());
        item.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        reason: &str,
    ) -> anyhow::Result<()> {
        let mut items = self.items.lock().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown work item {id}"))?;

        item.status = WorkStatus::Pending.as_str().to_string();
        item.not_before = Some(not_before);
        item.retry_count += 1;
        item.last_error = Some(reason.to_string());
        item.started_at = None;
        Ok(())
    }

    async fn reclaim_stuck(&self, stuck_after: Duration) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - stuck_after;
        let mut items = self.items.lock().await;

        let mut reclaimed = 0;
        for item in items.values_mut() {
            if item.status == WorkStatus::Processing.as_str()
                && item.started_at.map_or(false, |s| s < cutoff)
            {
                item.status = WorkStatus::Pending.as_str().to_string();
                item.retry_count += 1;
                item.last_error = Some("reclaimed after worker stall".to_string());
                item.started_at = None;
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<WorkItem>> {
        Ok(self.items.lock().await.get(&id).cloned())
    }
}
