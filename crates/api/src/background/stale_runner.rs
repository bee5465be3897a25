//! Fails running jobs whose runner went silent.
//!
//! A runner that crashes after claiming never sends a terminal report, so its
//! job would stay `running` forever. Every sweep fails running jobs whose last
//! report (or claim) is older than the configured threshold. Jobs are failed
//! rather than requeued because the claiming runner stays bound to the job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shipyard_core::job_events::EVENT_BUILD_FAILED;
use shipyard_db::JobStore;
use shipyard_events::{EventBus, PlatformEvent};
use tokio_util::sync::CancellationToken;

/// Error recorded on reaped jobs.
pub const STALE_RUNNER_ERROR: &str = "runner stopped reporting";

/// Sweep interval upper bound; short thresholds sweep more often.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One sweep: fail every job silent for longer than `stale_after`. Returns
/// how many jobs were failed.
pub async fn sweep(store: &dyn JobStore, event_bus: &EventBus, stale_after: Duration) -> usize {
    let now = Utc::now();
    let Ok(window) = chrono::Duration::from_std(stale_after) else {
        return 0;
    };
    let cutoff = now - window;

    let reaped = match store.fail_stale(cutoff, now, STALE_RUNNER_ERROR).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "Stale runner sweep failed");
            return 0;
        }
    };

    for job in &reaped {
        tracing::warn!(
            job_id = %job.id,
            runner_id = job.runner_id.as_deref().unwrap_or_default(),
            "Failed build whose runner stopped reporting",
        );
        event_bus.publish(
            PlatformEvent::build(EVENT_BUILD_FAILED, job.id).with_payload(serde_json::json!({
                "runner_id": job.runner_id,
                "error": STALE_RUNNER_ERROR,
            })),
        );
    }

    reaped.len()
}

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn JobStore>,
    event_bus: Arc<EventBus>,
    stale_after: Duration,
    cancel: CancellationToken,
) {
    let every = (stale_after / 4).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
    tracing::info!(
        stale_after_secs = stale_after.as_secs(),
        interval_secs = every.as_secs(),
        "Stale runner reaper started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale runner reaper stopping");
                break;
            }
            _ = interval.tick() => {
                let failed = sweep(store.as_ref(), &event_bus, stale_after).await;
                if failed == 0 {
                    tracing::debug!("Stale runner reaper: nothing to fail");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::build_job::{BuildJobStatus, BuildRequest};
    use shipyard_db::InMemoryJobStore;

    fn request() -> BuildRequest {
        BuildRequest {
            project_id: "p".into(),
            project_name: "P".into(),
            bundle_id: "com.example.p".into(),
            files: None,
            team_id: None,
            auto_fix: false,
            attempt: 1,
            max_attempts: 3,
            parent_job_id: None,
            output_type: Default::default(),
        }
    }

    #[tokio::test]
    async fn sweep_fails_silent_running_jobs_and_publishes() {
        let store = InMemoryJobStore::new();
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let running = store.create(request()).await.unwrap();
        let queued = store.create(request()).await.unwrap();
        store.claim("runner-1").await.unwrap().unwrap();

        // A zero window makes every running job stale.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(sweep(&store, &bus, Duration::ZERO).await, 1);

        let job = store.get(running.id).await.unwrap().unwrap();
        assert_eq!(job.status, BuildJobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(STALE_RUNNER_ERROR));
        assert!(job.finished_at.is_some());

        let queued = store.get(queued.id).await.unwrap().unwrap();
        assert_eq!(queued.status, BuildJobStatus::Queued);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_BUILD_FAILED);
        assert_eq!(event.source_entity_id, Some(running.id));
    }

    #[tokio::test]
    async fn sweep_leaves_recently_active_jobs_alone() {
        let store = InMemoryJobStore::new();
        let bus = EventBus::default();
        store.create(request()).await.unwrap();
        store.claim("runner-1").await.unwrap().unwrap();

        assert_eq!(sweep(&store, &bus, Duration::from_secs(900)).await, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(EventBus::default()),
            Duration::from_secs(900),
            cancel.clone(),
        ));
        cancel.cancel();
        handle.await.unwrap();
    }
}
