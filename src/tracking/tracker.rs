use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::check::{CheckJob, CheckJobStore, NewCheckJob, INSURANCE_CHECK_KIND};
use crate::dates::{mid_date, one_year_earlier, tomorrow_at};
use crate::lead::{LeadEmitter, LeadReason};
use crate::queue::{NewWorkItem, WorkQueue};
use crate::tracking::{change, Phase, RenewalTracking, TrackingStore};
use crate::vehicle::VehicleStore;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Bracket width at which the search stops and reports, in days.
    pub convergence_window_days: i64,
    /// Registry queries allowed per plate per day before deferral.
    pub daily_check_cap: i64,
    /// Morning hour a quota-deferred check is pushed to.
    pub deferred_check_hour: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            convergence_window_days: 14,
            daily_check_cap: 3,
            deferred_check_hour: 8,
        }
    }
}

/// Phase state machine. Consumes resolved check jobs, decides the next probe
/// date, and terminates the search with a lead on convergence or on "no
/// coverage at all".
///
/// Every decision is derived from the persisted history of resolved checks,
/// never from an assumed "last" job, so out-of-order resolutions (retries,
/// reclaimed items) and re-entry after a crash are handled by construction.
pub struct RenewalTracker {
    trackings: Arc<dyn TrackingStore>,
    checks: Arc<dyn CheckJobStore>,
    queue: Arc<dyn WorkQueue>,
    vehicles: Arc<dyn VehicleStore>,
    leads: LeadEmitter,
    cfg: TrackerConfig,
}

impl RenewalTracker {
    pub fn new(
        trackings: Arc<dyn TrackingStore>,
        checks: Arc<dyn CheckJobStore>,
        queue: Arc<dyn WorkQueue>,
        vehicles: Arc<dyn VehicleStore>,
        leads: LeadEmitter,
        cfg: TrackerConfig,
    ) -> Self {
        Self {
            trackings,
            checks,
            queue,
            vehicles,
            leads,
            cfg,
        }
    }

    /// Advance the owning tracking after a check job resolved.
    pub async fn on_check_resolved(&self, job: &CheckJob) -> anyhow::Result<()> {
        let Some(tracking_id) = job.tracking_id else {
            // Standalone "check now" request, nothing to advance.
            return Ok(());
        };

        let Some(mut tracking) = self.trackings.get(tracking_id).await? else {
            warn!(check_job = %job.id, tracking = %tracking_id, "tracking not found for resolved check");
            return Ok(());
        };

        let Some(phase) = tracking.phase() else {
            warn!(tracking = %tracking.id, phase = %tracking.phase, "unknown phase");
            return Ok(());
        };

        debug!(
            tracking = %tracking.id,
            phase = phase.as_str(),
            plate = %job.plate_number,
            target = %job.target_date,
            "processing resolved check"
        );

        match phase {
            Phase::Initial => self.advance_initial(&mut tracking, job).await?,
            Phase::YearSearch => self.advance_year_search(&mut tracking, job).await?,
            Phase::MonthSearch => self.advance_month_search(&mut tracking, job).await?,
            Phase::FinalCheck => {
                // Any further resolution is taken as confirmation.
                tracking.phase = Phase::Completed.as_str().to_string();
                tracking.next_check_date = None;
                info!(tracking = %tracking.id, "final check confirmed, tracking completed");
            }
            Phase::Completed => {
                debug!(tracking = %tracking.id, "late result for completed tracking, ignoring");
                return Ok(());
            }
        }

        tracking.checks_performed += 1;
        tracking.updated_at = Some(Utc::now());
        self.trackings.update(&tracking).await?;

        Ok(())
    }

    /// Enqueue the next point-in-time check for a tracking, applying the
    /// per-plate daily quota: at the cap, the item is deferred to tomorrow
    /// morning instead of "now".
    pub async fn schedule_check(
        &self,
        tracking_id: Uuid,
        plate: &str,
        target_date: chrono::DateTime<Utc>,
    ) -> anyhow::Result<Uuid> {
        let now = Utc::now();
        let created_today = self.checks.count_created_on(plate, now.date_naive()).await?;

        let item = if created_today >= self.cfg.daily_check_cap {
            let resume = tomorrow_at(now, self.cfg.deferred_check_hour);
            info!(
                plate,
                created_today,
                resume = %resume,
                "daily check quota reached, deferring to tomorrow"
            );
            NewWorkItem::deferred(INSURANCE_CHECK_KIND, resume)
        } else {
            NewWorkItem::now(INSURANCE_CHECK_KIND)
        };

        let work_item_id = self.queue.enqueue(item).await?;
        self.checks
            .create(NewCheckJob {
                work_item_id,
                tracking_id: Some(tracking_id),
                plate_number: plate.to_string(),
                target_date,
            })
            .await?;

        Ok(work_item_id)
    }

    /// Sweep trackings sitting in FinalCheck into Completed. FinalCheck
    /// requests no further checks, so the sweep is what terminates them.
    pub async fn complete_final_checks(&self) -> anyhow::Result<usize> {
        let pending = self.trackings.in_phase(Phase::FinalCheck).await?;
        let count = pending.len();

        for mut tracking in pending {
            tracking.phase = Phase::Completed.as_str().to_string();
            tracking.next_check_date = None;
            tracking.updated_at = Some(Utc::now());
            self.trackings.update(&tracking).await?;
            info!(
                tracking = %tracking.id,
                estimated_day = ?tracking.estimated_day,
                estimated_month = ?tracking.estimated_month,
                "tracking completed"
            );
        }

        Ok(count)
    }

    async fn advance_initial(
        &self,
        tracking: &mut RenewalTracking,
        job: &CheckJob,
    ) -> anyhow::Result<()> {
        if !job.coverage() {
            tracking.phase = Phase::Completed.as_str().to_string();
            tracking.next_check_date = None;

            let note = format!(
                "no active coverage for {} as of {}",
                job.plate_number,
                job.target_date.format("%Y-%m-%d")
            );
            self.leads
                .emit(
                    tracking.vehicle_id,
                    &job.plate_number,
                    LeadReason::NoCoverage,
                    &note,
                )
                .await?;

            info!(tracking = %tracking.id, plate = %job.plate_number, "no coverage on first check");
            return Ok(());
        }

        let next = one_year_earlier(job.target_date);
        tracking.phase = Phase::YearSearch.as_str().to_string();
        tracking.next_check_date = Some(next);
        self.schedule_check(tracking.id, &job.plate_number, next)
            .await?;

        info!(tracking = %tracking.id, next = %next, "coverage confirmed, entering year search");
        Ok(())
    }

    async fn advance_year_search(
        &self,
        tracking: &mut RenewalTracking,
        job: &CheckJob,
    ) -> anyhow::Result<()> {
        let history = self.checks.resolved_for_tracking(tracking.id).await?;

        // Nearest resolved check chronologically after this probe.
        let later = history
            .iter()
            .filter(|j| j.id != job.id && j.target_date > job.target_date)
            .min_by_key(|j| j.target_date);

        if let Some(later) = later {
            if change::differs(job, later) {
                let mid = mid_date(job.target_date, later.target_date);
                tracking.phase = Phase::MonthSearch.as_str().to_string();
                tracking.next_check_date = Some(mid);
                self.schedule_check(tracking.id, &job.plate_number, mid)
                    .await?;

                info!(
                    tracking = %tracking.id,
                    earlier = %job.target_date,
                    later = %later.target_date,
                    mid = %mid,
                    "coverage changed between probes, entering month search"
                );
                return Ok(());
            }
        }

        // Nothing changed (or nothing to compare against yet): step back
        // another year.
        let next = one_year_earlier(job.target_date);
        tracking.next_check_date = Some(next);
        self.schedule_check(tracking.id, &job.plate_number, next)
            .await?;

        info!(tracking = %tracking.id, next = %next, "no change found, continuing year search");
        Ok(())
    }

    async fn advance_month_search(
        &self,
        tracking: &mut RenewalTracking,
        job: &CheckJob,
    ) -> anyhow::Result<()> {
        let history = self.checks.resolved_for_tracking(tracking.id).await?;

        // The bracket partner is the nearest resolved check in the opposite
        // coverage state. When coverage never flips in the history, the
        // nearest different-company check stands in; that fallback is a
        // heuristic and may over-estimate the bracket.
        let opposite = history
            .iter()
            .filter(|j| j.id != job.id && j.coverage() != job.coverage())
            .min_by_key(|j| (j.target_date - job.target_date).num_seconds().abs())
            .or_else(|| {
                history
                    .iter()
                    .filter(|j| j.id != job.id && company_of(j) != company_of(job))
                    .min_by_key(|j| (j.target_date - job.target_date).num_seconds().abs())
            });

        let Some(other) = opposite else {
            warn!(tracking = %tracking.id, "no opposite-state check in history, cannot bracket");
            return Ok(());
        };

        let (start, end) = if other.target_date < job.target_date {
            (other.target_date, job.target_date)
        } else {
            (job.target_date, other.target_date)
        };
        let width = end - start;

        if width <= chrono::Duration::days(self.cfg.convergence_window_days) {
            let mid = mid_date(start, end);

            tracking.phase = Phase::FinalCheck.as_str().to_string();
            tracking.next_check_date = None;
            tracking.window_start = Some(start);
            tracking.window_end = Some(end);
            tracking.estimated_day = Some(mid.day() as i32);
            tracking.estimated_month = Some(mid.month() as i32);

            self.vehicles
                .record_estimate(tracking.vehicle_id, mid.day(), mid.month(), mid)
                .await?;

            let note = format!(
                "renewal window {}..{} (estimated {:02}.{:02})",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d"),
                mid.day(),
                mid.month()
            );
            self.leads
                .emit(
                    tracking.vehicle_id,
                    &job.plate_number,
                    LeadReason::RenewalWindow,
                    &note,
                )
                .await?;

            info!(
                tracking = %tracking.id,
                window_start = %start,
                window_end = %end,
                "renewal window bracketed, entering final check"
            );
            return Ok(());
        }

        let mid = mid_date(start, end);
        tracking.next_check_date = Some(mid);
        self.schedule_check(tracking.id, &job.plate_number, mid)
            .await?;

        info!(
            tracking = %tracking.id,
            width_days = width.num_days(),
            mid = %mid,
            "bracket still wide, continuing month search"
        );
        Ok(())
    }
}

fn company_of(job: &CheckJob) -> Option<&str> {
    job.company.as_deref().filter(|s| !s.is_empty())
}
