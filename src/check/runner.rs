use std::sync::Arc;

use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::check::{CheckJobStore, CheckOutcome, InsuranceCheck, INSURANCE_CHECK_KIND};
use crate::dates::tomorrow_at;
use crate::queue::{WorkItem, WorkQueue};
use crate::tracking::RenewalTracker;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Queue kind this runner drains.
    pub kind: String,
    /// Attempts before a transiently failing item is failed for good.
    pub max_attempts: i32,
    /// Base delay for transient-error retries; grows exponentially per
    /// attempt with +/-20% jitter, capped at one hour.
    pub retry_base: chrono::Duration,
    /// Hour of the next day at which a rate-limited check resumes.
    pub rate_limit_resume_hour: u32,
    /// Politeness delay between two claimed items.
    pub item_delay: std::time::Duration,
    /// Outer poll cadence.
    pub poll_interval: std::time::Duration,
    /// Processing items older than this are reclaimed each cycle.
    pub stuck_after: chrono::Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            kind: INSURANCE_CHECK_KIND.to_string(),
            max_attempts: 3,
            retry_base: chrono::Duration::minutes(5),
            rate_limit_resume_hour: 6,
            item_delay: std::time::Duration::from_secs(1),
            poll_interval: std::time::Duration::from_secs(60),
            stuck_after: chrono::Duration::minutes(30),
        }
    }
}

/// The consumer loop: claims ready check items, delegates to the registry,
/// persists the outcome and hands resolved checks to the tracker.
///
/// No per-item failure escapes the loop; the poller keeps running across
/// lookup errors, storage errors and tracker errors.
pub struct CheckRunner {
    queue: Arc<dyn WorkQueue>,
    checks: Arc<dyn CheckJobStore>,
    registry: Arc<dyn InsuranceCheck>,
    tracker: Arc<RenewalTracker>,
    cfg: RunnerConfig,
}

impl CheckRunner {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        checks: Arc<dyn CheckJobStore>,
        registry: Arc<dyn InsuranceCheck>,
        tracker: Arc<RenewalTracker>,
        cfg: RunnerConfig,
    ) -> Self {
        Self {
            queue,
            checks,
            registry,
            tracker,
            cfg,
        }
    }

    /// Poll forever: drain ready items, reclaim stalled ones, sweep
    /// FinalCheck trackings, sleep.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(kind = %self.cfg.kind, "check runner started");
        loop {
            match self.queue.reclaim_stuck(self.cfg.stuck_after).await {
                Ok(0) => {}
                Ok(n) => warn!(reclaimed = n, "returned stalled items to pending"),
                Err(e) => warn!(error = %e, "reclaim of stalled items failed"),
            }

            let processed = self.drain().await;
            if processed > 0 {
                info!(processed, "drained ready check items");
            }

            if let Err(e) = self.tracker.complete_final_checks().await {
                warn!(error = %e, "final-check sweep failed");
            }

            tokio::time::sleep(self.cfg.poll_interval).await;
        }
    }

    /// Process ready items until the queue is empty; returns the count.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while let Some(item_id) = self.step().await {
            processed += 1;
            debug!(work_item = %item_id, "processed");
            if !self.cfg.item_delay.is_zero() {
                tokio::time::sleep(self.cfg.item_delay).await;
            }
        }
        processed
    }

    /// Claim and process one item. Returns the processed item id, or `None`
    /// when nothing was eligible. Claim-time storage errors are logged and
    /// treated as "nothing to do" so one bad cycle never kills the poller.
    pub async fn step(&self) -> Option<Uuid> {
        let item = match self.queue.claim_next(&self.cfg.kind).await {
            Ok(Some(item)) => item,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "claim failed, skipping cycle");
                return None;
            }
        };

        if let Err(e) = self.process_item(&item).await {
            warn!(work_item = %item.id, error = %e, "item processing error");
        }
        Some(item.id)
    }

    async fn process_item(&self, item: &WorkItem) -> anyhow::Result<()> {
        let Some(job) = self.checks.find_by_work_item(item.id).await? else {
            // Data-consistency guard: a work item with no payload is
            // unprocessable, fail it rather than spin on it.
            warn!(work_item = %item.id, "no check job linked to work item");
            self.queue.fail(item.id, "payload missing").await?;
            return Ok(());
        };

        match self
            .registry
            .check(&job.plate_number, job.target_date)
            .await
        {
            Ok(CheckOutcome::RateLimited) => {
                // Known recoverable condition, not an error: leave the
                // payload untouched and come back tomorrow, off-peak.
                let resume = tomorrow_at(Utc::now(), self.cfg.rate_limit_resume_hour);
                info!(
                    work_item = %item.id,
                    plate = %job.plate_number,
                    resume = %resume,
                    "registry rate limited, rescheduling"
                );
                self.queue
                    .reschedule(item.id, resume, "registry rate limit")
                    .await?;
            }
            Ok(CheckOutcome::Resolved(result)) => {
                // The result must be durable before the item flips to
                // completed, so a crash in between never yields a completed
                // item with an unresolved payload.
                self.checks.record_result(job.id, &result).await?;
                self.queue.complete(item.id).await?;

                debug!(
                    work_item = %item.id,
                    plate = %job.plate_number,
                    target = %job.target_date,
                    has_coverage = result.has_coverage,
                    "check resolved"
                );

                if job.tracking_id.is_some() {
                    if let Some(resolved) = self.checks.get(job.id).await? {
                        // Tracker failures must not take down the poller; the
                        // resolved job stays in history and the tracker is
                        // re-enterable from it.
                        if let Err(e) = self.tracker.on_check_resolved(&resolved).await {
                            warn!(check_job = %job.id, error = %e, "tracker advance failed");
                        }
                    }
                }
            }
            Err(e) => {
                let attempt_no = item.retry_count + 1;
                if attempt_no >= self.cfg.max_attempts {
                    warn!(
                        work_item = %item.id,
                        attempts = attempt_no,
                        error = %e,
                        "retry budget exhausted, failing item"
                    );
                    self.queue.fail(item.id, &format!("{e:#}")).await?;
                } else {
                    let mut rng = StdRng::from_entropy();
                    let delay = retry_delay(attempt_no, self.cfg.retry_base, &mut rng);
                    warn!(
                        work_item = %item.id,
                        attempt = attempt_no,
                        delay_secs = delay.num_seconds(),
                        error = %e,
                        "lookup error, rescheduling"
                    );
                    self.queue
                        .reschedule(item.id, Utc::now() + delay, &format!("{e:#}"))
                        .await?;
                }
            }
        }

        Ok(())
    }
}

/// Exponential backoff with +/-20% jitter, capped at one hour. Short delays
/// (minutes) by design: a transient lookup error is not a rate limit.
fn retry_delay(attempt_no: i32, base: chrono::Duration, rng: &mut impl Rng) -> chrono::Duration {
    let exp = attempt_no.max(1).saturating_sub(1).min(6) as u32;
    let base_secs = base.num_seconds().max(0);
    let capped = base_secs.saturating_mul(1 << exp).min(3_600);

    if capped == 0 {
        return chrono::Duration::zero();
    }

    let jitter_range = (capped as f64) * 0.20;
    let jitter = rng.gen_range(-jitter_range..=jitter_range);
    let jittered = ((capped as f64) + jitter).round() as i64;

    chrono::Duration::seconds(jittered.clamp(0, 3_600))
}
