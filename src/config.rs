/// Runtime configuration for the worker, loaded from environment variables.
/// Every knob has a `RENEWAL_`-prefixed name with an unprefixed fallback.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,

    /// Queue kind this worker drains.
    pub check_kind: String,
    /// Outer poll cadence of the consumer loop.
    pub poll_interval_secs: u64,
    /// Politeness delay between two claimed items.
    pub item_delay_ms: u64,
    /// Forward-looking tolerance applied to `not_before` when claiming,
    /// absorbing clock skew between worker and store.
    pub claim_tolerance_hours: i64,

    /// Attempts before a transiently failing item is failed for good.
    pub max_check_attempts: i32,
    /// Base delay for transient-error retries (exponential, jittered).
    pub retry_base_secs: i64,
    /// Hour of the next day at which a rate-limited check resumes.
    pub rate_limit_resume_hour: u32,
    /// Items stuck in `processing` longer than this are returned to `pending`.
    pub stuck_reclaim_minutes: i64,

    /// Per-plate registry queries allowed per day before deferral.
    pub daily_check_cap: i64,
    /// Morning hour used when the daily cap defers a check to tomorrow.
    pub deferred_check_hour: u32,
    /// Bracket width (days) at which the renewal search converges.
    pub convergence_window_days: i64,

    pub migrate_on_startup: bool,
    pub use_simulated_registry: bool,
    /// Plates to start tracking at boot, comma separated.
    pub track_plates: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = env_or_fallback("RENEWAL_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let check_kind = env_or_fallback("RENEWAL_CHECK_KIND", "CHECK_KIND")
            .unwrap_or_else(|| "insurance-check".to_string());

        let poll_interval_secs = parsed_env("RENEWAL_POLL_INTERVAL_SECS", 60);
        let item_delay_ms = parsed_env("RENEWAL_ITEM_DELAY_MS", 1_000);
        let claim_tolerance_hours = parsed_env("RENEWAL_CLAIM_TOLERANCE_HOURS", 3);

        let max_check_attempts = parsed_env("RENEWAL_MAX_CHECK_ATTEMPTS", 3);
        let retry_base_secs = parsed_env("RENEWAL_RETRY_BASE_SECS", 300);
        let rate_limit_resume_hour = parsed_env("RENEWAL_RATE_LIMIT_RESUME_HOUR", 6);
        let stuck_reclaim_minutes = parsed_env("RENEWAL_STUCK_RECLAIM_MINUTES", 30);

        let daily_check_cap = parsed_env("RENEWAL_DAILY_CHECK_CAP", 3);
        let deferred_check_hour = parsed_env("RENEWAL_DEFERRED_CHECK_HOUR", 8);
        let convergence_window_days = parsed_env("RENEWAL_CONVERGENCE_WINDOW_DAYS", 14);

        let migrate_on_startup = env_bool("RENEWAL_MIGRATE_ON_STARTUP").unwrap_or(false);
        let use_simulated_registry = env_bool("RENEWAL_USE_SIMULATED_REGISTRY").unwrap_or(true);

        let track_plates = env_or_fallback("RENEWAL_TRACK_PLATES", "TRACK_PLATES")
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            worker_id,
            check_kind,
            poll_interval_secs,
            item_delay_ms,
            claim_tolerance_hours,
            max_check_attempts,
            retry_base_secs,
            rate_limit_resume_hour,
            stuck_reclaim_minutes,
            daily_check_cap,
            deferred_check_hour,
            convergence_window_days,
            migrate_on_startup,
            use_simulated_registry,
            track_plates,
        })
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
