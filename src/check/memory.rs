use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::check::{CheckJob, CheckJobStore, NewCheckJob, ResolvedCheck};

pub struct InMemoryCheckJobStore {
    jobs: Mutex<HashMap<Uuid, CheckJob>>,
}

impl InMemoryCheckJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCheckJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckJobStore for InMemoryCheckJobStore {
    async fn create(&self, job: NewCheckJob) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        let row = CheckJob {
            id,
            work_item_id: job.work_item_id,
            tracking_id: job.tracking_id,
            plate_number: job.plate_number,
            target_date: job.target_date,
            has_coverage: None,
            company: None,
            vehicle_brand: None,
            vehicle_model: None,
            raw_text: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.jobs.lock().await.insert(id, row);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<CheckJob>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn find_by_work_item(&self, work_item_id: Uuid) -> anyhow::Result<Option<CheckJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .find(|j| j.work_item_id == work_item_id)
            .cloned())
    }

    async fn record_result(&self, id: Uuid, result: &ResolvedCheck) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown check job {id}"))?;

        job.has_coverage = Some(result.has_coverage);
        job.company = result.company.clone();
        job.vehicle_brand = result.vehicle_brand.clone();
        job.vehicle_model = result.vehicle_model.clone();
        job.raw_text = Some(result.raw_text.clone());
        job.resolved_at = Some(Utc::now());
        Ok(())
    }

    async fn resolved_for_tracking(&self, tracking_id: Uuid) -> anyhow::Result<Vec<CheckJob>> {
        let mut jobs: Vec<CheckJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.tracking_id == Some(tracking_id) && j.is_resolved())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.target_date);
        Ok(jobs)
    }

    async fn count_created_on(&self, plate: &str, day: NaiveDate) -> anyhow::Result<i64> {
        let count = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|j| j.plate_number == plate && j.created_at.date_naive() == day)
            .count();
        Ok(count as i64)
    }
}
