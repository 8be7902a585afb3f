use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::DispatchError;
use super::dispatcher::{DispatchJob, DispatchPlan, JobStatus, run_dispatch};
use crate::gateway::WhatsAppGateway;

/// In-memory registry of dispatch jobs.
///
/// At most one job runs per (user, instance). Finished jobs stay queryable
/// until the retention window passes; they are pruned when a new job starts.
#[derive(Clone, Debug)]
pub struct DispatchManager {
    jobs: Arc<DashMap<Uuid, Arc<DispatchJob>>>,
    running: Arc<DashMap<(i32, String), Uuid>>,
    retention: Duration,
}

impl DispatchManager {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            running: Arc::new(DashMap::new()),
            retention,
        }
    }

    /// Registers the job and runs it on a background task.
    pub async fn start(
        &self,
        user_id: i32,
        gateway: Arc<dyn WhatsAppGateway>,
        plan: DispatchPlan,
    ) -> Result<Arc<DispatchJob>, DispatchError> {
        self.prune_finished().await;

        let (job, cancel_rx) = DispatchJob::new(user_id, &plan.instance, plan.contacts.len());
        let job = Arc::new(job);

        match self.running.entry((user_id, plan.instance.clone())) {
            Entry::Occupied(_) => return Err(DispatchError::AlreadyRunning(plan.instance)),
            Entry::Vacant(slot) => {
                slot.insert(job.id);
            }
        }
        self.jobs.insert(job.id, job.clone());

        let running = self.running.clone();
        let task_job = job.clone();
        tokio::spawn(async move {
            let status = run_dispatch(gateway.as_ref(), &plan, &task_job, cancel_rx).await;
            running.remove(&(task_job.user_id, task_job.instance.clone()));
            debug!(job_id = %task_job.id, ?status, "Dispatch task finished.");
        });

        Ok(job)
    }

    /// Owner-scoped lookup. Foreign jobs look like missing ones.
    pub fn get(&self, user_id: i32, job_id: Uuid) -> Result<Arc<DispatchJob>, DispatchError> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .filter(|job| job.user_id == user_id)
            .ok_or(DispatchError::NotFound(job_id))
    }

    pub async fn cancel(&self, user_id: i32, job_id: Uuid) -> Result<Arc<DispatchJob>, DispatchError> {
        let job = self.get(user_id, job_id)?;
        if !job.cancel().await {
            return Err(DispatchError::NotRunning(job_id));
        }
        info!(job_id = %job_id, user_id, "Dispatch cancellation requested.");
        Ok(job)
    }

    pub fn is_running(&self, user_id: i32, instance: &str) -> bool {
        self.running.contains_key(&(user_id, instance.to_owned()))
    }

    /// Drops finished jobs older than the retention window.
    pub async fn prune_finished(&self) {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(3650));
        let cutoff = Utc::now() - retention;

        // Snapshot first so no map guard is held across an await.
        let jobs: Vec<Arc<DispatchJob>> = self.jobs.iter().map(|e| e.value().clone()).collect();
        for job in jobs {
            if job.status().await == JobStatus::Running {
                continue;
            }
            if job.finished_at().await.is_some_and(|at| at < cutoff) {
                self.jobs.remove(&job.id);
                debug!(job_id = %job.id, "Pruned finished dispatch job.");
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.jobs.len()
    }
}
