use std::sync::Arc;
use std::time::Duration;

use stackforge_core::{Job, JobPatch, JobStatus};
use tokio::sync::Mutex;

use super::{is_steps_key, job_key, JOB_KEY_PREFIX};
use crate::error::Result;
use crate::store::KeyValueStore;

/// Outcome of [`JobRepository::claim`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    Claimed(Job),
    NotFound,
    /// The job had already left `queued`; carries the status it was found in.
    AlreadyClaimed(JobStatus),
}

#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn KeyValueStore>,
    ttl: Option<Duration>,
    write_lock: Arc<Mutex<()>>,
}

impl JobRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn create(&self, job: &Job) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        self.save(job).await?;
        Ok(job.clone())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        match self.store.get(&job_key(job_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// All live jobs, oldest first.
    pub async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for key in self.store.keys(JOB_KEY_PREFIX).await? {
            if is_steps_key(&key) {
                continue;
            }
            // The entry may expire between the scan and the read.
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable job entry"),
            }
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    /// Merge `patch` into the stored job. Returns `None` for an unknown id.
    pub async fn update(&self, job_id: &str, patch: &JobPatch) -> Result<Option<Job>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut job) = self.get(job_id).await? else {
            return Ok(None);
        };

        if !job.apply(patch) {
            tracing::warn!(
                job_id,
                from = %job.status,
                to = ?patch.status,
                "Ignoring invalid job status transition"
            );
        }
        self.save(&job).await?;
        Ok(Some(job))
    }

    /// Move the job to `to` only when that is a legal change from its current
    /// status. `None` for an unknown id or a refused transition.
    pub async fn transition(&self, job_id: &str, to: JobStatus) -> Result<Option<Job>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut job) = self.get(job_id).await? else {
            return Ok(None);
        };
        if !job.status.can_transition(to) {
            tracing::debug!(job_id, from = %job.status, to = %to, "Job status unchanged");
            return Ok(None);
        }

        job.apply(&JobPatch::status(to));
        self.save(&job).await?;
        Ok(Some(job))
    }

    /// Compare-and-set `queued -> running`.
    pub async fn claim(&self, job_id: &str) -> Result<ClaimResult> {
        let _guard = self.write_lock.lock().await;
        let Some(mut job) = self.get(job_id).await? else {
            return Ok(ClaimResult::NotFound);
        };
        if job.status != JobStatus::Queued {
            return Ok(ClaimResult::AlreadyClaimed(job.status));
        }

        job.apply(&JobPatch::status(JobStatus::Running));
        self.save(&job).await?;
        Ok(ClaimResult::Claimed(job))
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let raw = serde_json::to_string(job)?;
        self.store.set(&job_key(&job.id), &raw, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};

    fn memory_repo() -> JobRepository {
        JobRepository::new(Arc::new(MemoryStore::new()), None)
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let repo = memory_repo();
        let job = Job::new("Build a CRM");

        repo.create(&job).await.unwrap();

        let found = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(repo.get("job_0_0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_creation_and_skips_steps() {
        let repo = memory_repo();
        let first = Job::new("first");
        let second = Job::new("second");
        repo.create(&second).await.unwrap();
        repo.create(&first).await.unwrap();
        repo.store
            .set(&super::super::steps_key(&first.id), "[]", None)
            .await
            .unwrap();

        let jobs = repo.list().await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[tokio::test]
    async fn test_update_merges_and_refreshes() {
        let repo = memory_repo();
        let job = Job::new("x");
        repo.create(&job).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        let updated = repo
            .update(&job.id, &JobPatch::status(JobStatus::Running))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, JobStatus::Running);
        assert_eq!(updated.description, "x");
        assert!(updated.updated_at > job.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_job_is_none() {
        let repo = memory_repo();
        let result = repo
            .update("job_missing", &JobPatch::status(JobStatus::Failed))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let repo = memory_repo();
        let job = Job::new("x");
        repo.create(&job).await.unwrap();
        repo.update(&job.id, &JobPatch::status(JobStatus::Running)).await.unwrap();
        repo.update(&job.id, &JobPatch::status(JobStatus::Completed)).await.unwrap();

        let after = repo
            .update(&job.id, &JobPatch::status(JobStatus::Failed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_transition_reports_only_real_changes() {
        let repo = memory_repo();
        let job = Job::new("x");
        repo.create(&job).await.unwrap();

        assert!(repo.transition(&job.id, JobStatus::Completed).await.unwrap().is_none());
        let running = repo.transition(&job.id, JobStatus::Running).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);
        let done = repo.transition(&job.id, JobStatus::Completed).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);

        assert!(repo.transition(&job.id, JobStatus::Completed).await.unwrap().is_none());
        assert!(repo.transition(&job.id, JobStatus::Failed).await.unwrap().is_none());
        assert!(repo.transition("job_0_0", JobStatus::Failed).await.unwrap().is_none());
        assert_eq!(
            repo.get(&job.id).await.unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = memory_repo();
        let job = Job::new("x");
        repo.create(&job).await.unwrap();

        let (a, b) = tokio::join!(repo.claim(&job.id), repo.claim(&job.id));
        let results = [a.unwrap(), b.unwrap()];

        let claimed = results
            .iter()
            .filter(|r| matches!(r, ClaimResult::Claimed(_)))
            .count();
        assert_eq!(claimed, 1);
        assert!(results
            .iter()
            .any(|r| *r == ClaimResult::AlreadyClaimed(JobStatus::Running)));
        assert_eq!(repo.claim("job_missing").await.unwrap(), ClaimResult::NotFound);
    }

    #[tokio::test]
    async fn test_sqlite_backed_repository() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let repo = JobRepository::new(Arc::new(store), Some(Duration::from_secs(86_400)));
        let job = Job::new("durable");
        repo.create(&job).await.unwrap();

        let claimed = repo.claim(&job.id).await.unwrap();
        assert!(matches!(claimed, ClaimResult::Claimed(ref j) if j.status == JobStatus::Running));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
