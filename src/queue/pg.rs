use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::queue::{NewWorkItem, WorkItem, WorkQueue, WorkStatus};

/// Postgres-backed queue. Claims ride on `FOR UPDATE SKIP LOCKED` so
/// concurrent workers on the same kind never race for one row.
#[derive(Clone)]
pub struct PgWorkQueue {
    pool: PgPool,
    claim_tolerance: Duration,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_tolerance: Duration::hours(3),
        }
    }

    /// Forward-looking slack on `not_before`, absorbing clock skew between
    /// worker and store.
    pub fn with_claim_tolerance(mut self, tolerance: Duration) -> Self {
        self.claim_tolerance = tolerance;
        self
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, item: NewWorkItem) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO work_items (kind, status, priority, not_before)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&item.kind)
        .bind(WorkStatus::Pending.as_str())
        .bind(item.priority)
        .bind(item.not_before)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim_next(&self, kind: &str) -> anyhow::Result<Option<WorkItem>> {
        let horizon = Utc::now() + self.claim_tolerance;

        let mut tx = self.pool.begin().await?;

        // Lock the candidate row and skip rows a concurrent claimer holds,
        // so two workers racing for the same kind never see the same item.
        let candidate = sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT *
            FROM work_items
            WHERE kind = $1
              AND status = 'pending'
              AND (not_before IS NULL OR not_before <= $2)
            ORDER BY priority ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(kind)
        .bind(horizon)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let claimed = sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET status = 'processing',
                started_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(item.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(claimed))
    }

    async fn complete(&self, id: Uuid) -> anyhow::Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'completed',
                completed_at = now()
            WHERE id = $1
              AND status <> 'completed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT status FROM work_items WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            match exists {
                Some(_) => debug!(work_item = %id, "complete on already completed item, ignoring"),
                None => anyhow::bail!("unknown work item {id}"),
            }
        }

        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'failed',
                retry_count = retry_count + 1,
                last_error = $2,
                completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        reason: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending',
                not_before = $2,
                retry_count = retry_count + 1,
                last_error = $3,
                started_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(not_before)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reclaim_stuck(&self, stuck_after: Duration) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - stuck_after;

        let reclaimed = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending',
                retry_count = retry_count + 1,
                last_error = 'reclaimed after worker stall',
                started_at = NULL
            WHERE status = 'processing'
              AND started_at IS NOT NULL
              AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(reclaimed)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<WorkItem>> {
        let item = sqlx::query_as::<_, WorkItem>("SELECT * FROM work_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }
}
