//! Registry of code-generation requests that have not become build jobs yet.

use std::collections::HashMap;

use chrono::Utc;
use shipyard_core::generation::{ActiveGeneration, GenerationPhase};
use shipyard_core::types::JobId;
use tokio::sync::RwLock;

/// In-flight generations keyed by id.
#[derive(Default)]
pub struct GenerationTracker {
    entries: RwLock<HashMap<JobId, ActiveGeneration>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generation in the `starting` phase.
    pub async fn start(&self, project_id: String, project_name: String) -> ActiveGeneration {
        let generation =
            ActiveGeneration::new(uuid::Uuid::new_v4(), project_id, project_name, Utc::now());
        self.entries
            .write()
            .await
            .insert(generation.id, generation.clone());
        generation
    }

    pub async fn get(&self, id: JobId) -> Option<ActiveGeneration> {
        self.entries.read().await.get(&id).cloned()
    }

    /// Move a generation to `phase`. `None` if it is not tracked.
    pub async fn set_phase(&self, id: JobId, phase: GenerationPhase) -> Option<ActiveGeneration> {
        let mut entries = self.entries.write().await;
        let generation = entries.get_mut(&id)?;
        generation.phase = phase;
        Some(generation.clone())
    }

    /// Associate a generation with the build job created from it.
    pub async fn link(&self, id: JobId, build_job_id: JobId) -> Option<ActiveGeneration> {
        let mut entries = self.entries.write().await;
        let generation = entries.get_mut(&id)?;
        generation.build_job_id = Some(build_job_id);
        Some(generation.clone())
    }

    pub async fn remove(&self, id: JobId) -> Option<ActiveGeneration> {
        self.entries.write().await.remove(&id)
    }

    /// Every tracked generation, finished ones included.
    pub async fn list(&self) -> Vec<ActiveGeneration> {
        self.entries.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_of_a_generation() {
        let tracker = GenerationTracker::new();
        let g = tracker.start("proj-1".into(), "Recipes".into()).await;
        assert_eq!(g.phase, GenerationPhase::Starting);
        assert!(g.build_job_id.is_none());

        let g = tracker
            .set_phase(g.id, GenerationPhase::Validating)
            .await
            .unwrap();
        assert_eq!(g.phase, GenerationPhase::Validating);

        let job_id = uuid::Uuid::new_v4();
        let g = tracker.link(g.id, job_id).await.unwrap();
        assert_eq!(g.build_job_id, Some(job_id));

        assert!(tracker.remove(g.id).await.is_some());
        assert!(tracker.list().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_return_none() {
        let tracker = GenerationTracker::new();
        let id = uuid::Uuid::new_v4();
        assert!(tracker.set_phase(id, GenerationPhase::Done).await.is_none());
        assert!(tracker.link(id, uuid::Uuid::new_v4()).await.is_none());
        assert!(tracker.remove(id).await.is_none());
    }
}
