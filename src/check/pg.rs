use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::check::{CheckJob, CheckJobStore, NewCheckJob, ResolvedCheck};

#[derive(Clone)]
pub struct PgCheckJobStore {
    pool: PgPool,
}

impl PgCheckJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckJobStore for PgCheckJobStore {
    async fn create(&self, job: NewCheckJob) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO check_jobs (work_item_id, tracking_id, plate_number, target_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(job.work_item_id)
        .bind(job.tracking_id)
        .bind(&job.plate_number)
        .bind(job.target_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<CheckJob>> {
        let job = sqlx::query_as::<_, CheckJob>("SELECT * FROM check_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn find_by_work_item(&self, work_item_id: Uuid) -> anyhow::Result<Option<CheckJob>> {
        let job = sqlx::query_as::<_, CheckJob>("SELECT * FROM check_jobs WHERE work_item_id = $1")
            .bind(work_item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn record_result(&self, id: Uuid, result: &ResolvedCheck) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE check_jobs
            SET has_coverage = $2,
                company = $3,
                vehicle_brand = $4,
                vehicle_model = $5,
                raw_text = $6,
                resolved_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result.has_coverage)
        .bind(&result.company)
        .bind(&result.vehicle_brand)
        .bind(&result.vehicle_model)
        .bind(&result.raw_text)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resolved_for_tracking(&self, tracking_id: Uuid) -> anyhow::Result<Vec<CheckJob>> {
        let jobs = sqlx::query_as::<_, CheckJob>(
            r#"
            SELECT *
            FROM check_jobs
            WHERE tracking_id = $1
              AND resolved_at IS NOT NULL
            ORDER BY target_date ASC
            "#,
        )
        .bind(tracking_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn count_created_on(&self, plate: &str, day: NaiveDate) -> anyhow::Result<i64> {
        let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        let end = start + chrono::Duration::days(1);

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM check_jobs
            WHERE plate_number = $1
              AND created_at >= $2
              AND created_at < $3
            "#,
        )
        .bind(plate)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
