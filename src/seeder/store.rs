use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::models::{Job, JobStatus};
use crate::errors::SetupError;

/// In-memory job registry shared by the HTTP handlers and the orchestrator.
///
/// Cloning yields another handle to the same map. The lock is never held
/// across an `.await`, so every mutation is atomic with respect to other
/// tasks.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        // A panic mid-mutation leaves at worst one half-updated job; keep serving.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self, job: Job) -> Result<Job, SetupError> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&job.id) {
            return Err(SetupError::DuplicateJob(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs().get(&id).cloned()
    }

    /// The `limit` most recently created jobs, newest first.
    pub fn list(&self, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    /// Apply `f` to the job in place. Returns `None` if the job is gone.
    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.jobs().get_mut(&id).map(f)
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    pub fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_at(Utc::now(), max_age)
    }

    /// Remove failed jobs created before `now - max_age`. Jobs in any other
    /// state are kept regardless of age.
    pub fn sweep_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status == JobStatus::Failed && job.created_at < cutoff));
        before - jobs.len()
    }

    /// Run `sweep` every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        &self,
        tracker: &TaskTracker,
        interval: Duration,
        max_age: Duration,
        shutdown: CancellationToken,
    ) {
        let store = self.clone();
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; nothing can be stale yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep(max_age);
                        if removed > 0 {
                            tracing::info!(removed, remaining = store.len(), "Swept stale failed jobs");
                        }
                    }
                }
            }
        });
    }
}
