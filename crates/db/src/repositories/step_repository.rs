use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use stackforge_core::{Step, StepId};
use tokio::sync::Mutex;

use super::steps_key;
use crate::error::Result;
use crate::store::KeyValueStore;

/// Per-job step list, always stored sorted by id without duplicates.
#[derive(Clone)]
pub struct StepRepository {
    store: Arc<dyn KeyValueStore>,
    ttl: Option<Duration>,
    write_lock: Arc<Mutex<()>>,
}

impl StepRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, job_id: &str) -> Result<Vec<Step>> {
        match self.store.get(&steps_key(job_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the whole list. Later duplicates of an id are dropped.
    pub async fn initialize(&self, job_id: &str, steps: &[Step]) -> Result<Vec<Step>> {
        let _guard = self.write_lock.lock().await;
        let mut seen = HashSet::new();
        let mut list: Vec<Step> = steps
            .iter()
            .filter(|step| seen.insert(step.id))
            .cloned()
            .collect();
        list.sort_by_key(|step| step.id);
        self.save(job_id, &list).await?;
        Ok(list)
    }

    /// Replace the step with the same id, or insert it.
    pub async fn upsert(&self, job_id: &str, step: &Step) -> Result<Vec<Step>> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.get(job_id).await?;
        match list.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => *existing = step.clone(),
            None => list.push(step.clone()),
        }
        list.sort_by_key(|step| step.id);
        self.save(job_id, &list).await?;
        Ok(list)
    }

    /// Add steps whose id is not yet present. Returns the steps actually added.
    pub async fn append(&self, job_id: &str, steps: &[Step]) -> Result<Vec<Step>> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.get(job_id).await?;
        let mut present: HashSet<StepId> = list.iter().map(|s| s.id).collect();

        let added: Vec<Step> = steps
            .iter()
            .filter(|step| present.insert(step.id))
            .cloned()
            .collect();
        if added.is_empty() {
            return Ok(added);
        }

        list.extend(added.iter().cloned());
        list.sort_by_key(|step| step.id);
        self.save(job_id, &list).await?;
        Ok(added)
    }

    async fn save(&self, job_id: &str, steps: &[Step]) -> Result<()> {
        let raw = serde_json::to_string(steps)?;
        self.store.set(&steps_key(job_id), &raw, self.ttl).await
    }
}
