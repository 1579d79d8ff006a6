use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use renewalwatch::check::{
    CheckRunner, InsuranceCheck, PgCheckJobStore, RunnerConfig, SimulatedRegistry,
};
use renewalwatch::lead::{LeadEmitter, LogNotifier, Notifier, PgLeadStore};
use renewalwatch::queue::PgWorkQueue;
use renewalwatch::tracking::{PgTrackingStore, RenewalTracker, TrackerConfig, TrackingService};
use renewalwatch::vehicle::PgVehicleStore;
use renewalwatch::{db, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        worker_id = %cfg.worker_id,
        kind = %cfg.check_kind,
        poll_interval_secs = cfg.poll_interval_secs,
        claim_tolerance_hours = cfg.claim_tolerance_hours,
        daily_check_cap = cfg.daily_check_cap,
        simulated_registry = cfg.use_simulated_registry,
        "renewalwatchd starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let queue = Arc::new(
        PgWorkQueue::new(pool.clone())
            .with_claim_tolerance(chrono::Duration::hours(cfg.claim_tolerance_hours)),
    );
    let checks = Arc::new(PgCheckJobStore::new(pool.clone()));
    let trackings = Arc::new(PgTrackingStore::new(pool.clone()));
    let vehicles = Arc::new(PgVehicleStore::new(pool.clone()));
    let leads = Arc::new(PgLeadStore::new(pool.clone()));

    let registry: Arc<dyn InsuranceCheck> = if cfg.use_simulated_registry {
        Arc::new(SimulatedRegistry::new())
    } else {
        // The live registry client is an external collaborator wired by the
        // deployment, not part of this core.
        anyhow::bail!(
            "no live registry client configured; set RENEWAL_USE_SIMULATED_REGISTRY=1 to run \
             against the simulation"
        );
    };

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let emitter = LeadEmitter::new(leads, notifier);

    let tracker = Arc::new(RenewalTracker::new(
        trackings.clone(),
        checks.clone(),
        queue.clone(),
        vehicles.clone(),
        emitter,
        TrackerConfig {
            convergence_window_days: cfg.convergence_window_days,
            daily_check_cap: cfg.daily_check_cap,
            deferred_check_hour: cfg.deferred_check_hour,
        },
    ));

    let service = TrackingService::new(vehicles, trackings, tracker.clone());
    for plate in &cfg.track_plates {
        match service.start_tracking(plate, None).await {
            Ok(started) if started.already_active => {
                info!(plate, tracking = %started.tracking_id, "tracking already active")
            }
            Ok(started) => info!(plate, tracking = %started.tracking_id, "tracking started"),
            Err(e) => warn!(plate, error = %e, "failed to start tracking"),
        }
    }

    let runner = CheckRunner::new(
        queue,
        checks,
        registry,
        tracker,
        RunnerConfig {
            kind: cfg.check_kind.clone(),
            max_attempts: cfg.max_check_attempts,
            retry_base: chrono::Duration::seconds(cfg.retry_base_secs),
            rate_limit_resume_hour: cfg.rate_limit_resume_hour,
            item_delay: std::time::Duration::from_millis(cfg.item_delay_ms),
            poll_interval: std::time::Duration::from_secs(cfg.poll_interval_secs),
            stuck_after: chrono::Duration::minutes(cfg.stuck_reclaim_minutes),
        },
    );

    runner.run().await
}
