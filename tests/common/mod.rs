#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use renewalwatch::check::{
    CheckOutcome, CheckRunner, InMemoryCheckJobStore, InsuranceCheck, ResolvedCheck, RunnerConfig,
};
use renewalwatch::lead::{InMemoryLeadStore, LeadEmitter, LeadReason, Notifier};
use renewalwatch::queue::InMemoryWorkQueue;
use renewalwatch::tracking::{
    InMemoryTrackingStore, RenewalTracker, TrackerConfig, TrackingService,
};
use renewalwatch::vehicle::InMemoryVehicleStore;

pub struct TestEnv {
    pub queue: Arc<InMemoryWorkQueue>,
    pub checks: Arc<InMemoryCheckJobStore>,
    pub trackings: Arc<InMemoryTrackingStore>,
    pub vehicles: Arc<InMemoryVehicleStore>,
    pub leads: Arc<InMemoryLeadStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub tracker: Arc<RenewalTracker>,
    pub service: TrackingService,
}

pub fn test_env() -> TestEnv {
    test_env_with(TrackerConfig::default())
}

pub fn test_env_with(cfg: TrackerConfig) -> TestEnv {
    let queue = Arc::new(InMemoryWorkQueue::new());
    let checks = Arc::new(InMemoryCheckJobStore::new());
    let trackings = Arc::new(InMemoryTrackingStore::new());
    let vehicles = Arc::new(InMemoryVehicleStore::new());
    let leads = Arc::new(InMemoryLeadStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let emitter = LeadEmitter::new(leads.clone(), notifier.clone());
    let tracker = Arc::new(RenewalTracker::new(
        trackings.clone(),
        checks.clone(),
        queue.clone(),
        vehicles.clone(),
        emitter,
        cfg,
    ));
    let service = TrackingService::new(vehicles.clone(), trackings.clone(), tracker.clone());

    TestEnv {
        queue,
        checks,
        trackings,
        vehicles,
        leads,
        notifier,
        tracker,
        service,
    }
}

/// Runner wired for tests: no politeness delay, immediate retries.
pub fn test_runner(env: &TestEnv, registry: Arc<dyn InsuranceCheck>) -> CheckRunner {
    CheckRunner::new(
        env.queue.clone(),
        env.checks.clone(),
        registry,
        env.tracker.clone(),
        RunnerConfig {
            retry_base: chrono::Duration::zero(),
            item_delay: std::time::Duration::ZERO,
            ..RunnerConfig::default()
        },
    )
}

pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(LeadReason, Uuid, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, reason: LeadReason, vehicle_id: Uuid, note: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .push((reason, vehicle_id, note.to_string()));
        Ok(())
    }
}

pub enum Scripted {
    Resolved(ResolvedCheck),
    RateLimited,
    Error(String),
}

/// Registry that replays a fixed sequence of responses, one per call.
pub struct ScriptedRegistry {
    responses: Mutex<VecDeque<Scripted>>,
}

impl ScriptedRegistry {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl InsuranceCheck for ScriptedRegistry {
    async fn check(&self, _plate: &str, _target: DateTime<Utc>) -> anyhow::Result<CheckOutcome> {
        match self.responses.lock().await.pop_front() {
            Some(Scripted::Resolved(r)) => Ok(CheckOutcome::Resolved(r)),
            Some(Scripted::RateLimited) => Ok(CheckOutcome::RateLimited),
            Some(Scripted::Error(msg)) => Err(anyhow::anyhow!(msg)),
            None => Err(anyhow::anyhow!("scripted registry exhausted")),
        }
    }
}

/// Registry with a hard coverage boundary: insured on or after `boundary`,
/// nothing on record before it.
pub struct BoundaryRegistry {
    pub boundary: DateTime<Utc>,
}

#[async_trait]
impl InsuranceCheck for BoundaryRegistry {
    async fn check(&self, plate: &str, target: DateTime<Utc>) -> anyhow::Result<CheckOutcome> {
        if target >= self.boundary {
            Ok(CheckOutcome::Resolved(covered("Qala Sigorta")))
        } else {
            Ok(CheckOutcome::Resolved(ResolvedCheck::not_found(format!(
                "no insurer record for {plate}"
            ))))
        }
    }
}

pub fn covered(company: &str) -> ResolvedCheck {
    ResolvedCheck {
        has_coverage: true,
        company: Some(company.to_string()),
        vehicle_brand: Some("BMW".to_string()),
        vehicle_model: Some("520".to_string()),
        raw_text: format!("company={company} vehicle=BMW 520 status=active"),
    }
}
